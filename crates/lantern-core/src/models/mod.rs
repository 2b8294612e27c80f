//! Data models for sessions, objectives, subtasks and messages.
//!
//! Display implementations for these models live in
//! [`crate::display::models`], keeping presentation apart from the data
//! structures.
//!
//! # Ownership
//!
//! A [`Session`] exclusively owns its [`Objective`]s and [`Message`]s. An
//! objective keeps a nullable lookup link to its [`SubtaskGroup`]; the group
//! points back at the objective and is the owner of its [`SubtaskEntry`]s.
//!
//! # Lifecycles
//!
//! ```text
//! Objective:     pending ──▶ running ──▶ done | failed
//! SubtaskEntry:  pending ──▶ running ──▶ done | skipped
//!                              └──▶ running (second retry pass)
//! ```

pub mod message;
pub mod objective;
pub mod project;
pub mod session;
pub mod status;
pub mod subtask;
pub mod summary;

#[cfg(test)]
mod tests;

pub use message::Message;
pub use objective::Objective;
pub use project::{ProjectSummary, SummarySource};
pub use session::{ObjectiveSnapshot, Session, SessionSnapshot};
pub use status::{MessageKind, MessageRole, ObjectiveStatus, SubtaskStatus};
pub use subtask::{SubtaskDraft, SubtaskEntry, SubtaskGroup};
pub use summary::SessionSummary;
