//! Markdown formatting for sessions, objectives, subtasks and tools.
//!
//! Domain models implement [`std::fmt::Display`] directly (see [`models`]).
//! Collections and composite views are newtype wrappers, so the same data
//! can be shown as a list in one place and as a full report in another. The
//! CLI renderer and the MCP server both print these, which keeps terminal
//! and tool output identical.
//!
//! ```text
//! ┌─────────────────┐    ┌─────────────────┐    ┌─────────────────┐
//! │  Domain Models  │    │    Wrappers     │    │    Markdown     │
//! │ (Session, ...)  │───▶│ (SessionReport) │───▶│ (Terminal/MCP)  │
//! └─────────────────┘    └─────────────────┘    └─────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`collections`]: `SessionSummaries`, `SessionReport`, `ToolCatalog`
//! - [`status`]: confirmation messages (`OperationStatus`) and run outcomes
//! - [`datetime`]: local-time formatting of timestamps
//! - [`models`]: `Display` for the domain models
//!
//! ```rust
//! use lantern_core::display::OperationStatus;
//!
//! let stopped = OperationStatus::success("Stop requested for session s1".to_string());
//! assert!(stopped.to_string().starts_with("Success:"));
//! ```

pub mod collections;
pub mod datetime;
pub mod models;
pub mod status;

pub use collections::{SessionReport, SessionSummaries, ToolCatalog};
pub use datetime::LocalDateTime;
pub use status::{OperationStatus, RunResult};
