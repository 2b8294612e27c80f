//! Parameter structures shared by the CLI, the observer server and the MCP
//! server.
//!
//! These stay free of framework derives. Interface layers wrap them
//! (`#[serde(transparent)]` for MCP, clap `Args` for the CLI) and convert
//! into the core types. JSON schema generation is opt-in through the
//! `schema` feature.

use std::{fmt, str::FromStr};

#[cfg(feature = "schema")]
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Parameters for operations requiring just a session ID.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
pub struct SessionId {
    /// The ID of the session to operate on
    pub session: String,
}

/// Execution strategy for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Plan upfront, decompose each objective, run the subtasks
    #[default]
    Plan,
    /// Propose one tool call at a time until done
    Agent,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Plan => "plan",
            RunMode::Agent => "agent",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "plan" => Ok(RunMode::Plan),
            "agent" => Ok(RunMode::Agent),
            _ => Err(EngineError::invalid_input("mode")
                .with_reason(format!("'{s}' is not one of: plan, agent"))),
        }
    }
}

/// Parameters for starting a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
pub struct StartRun {
    /// Free-form natural-language request
    pub request: String,
    /// Project root the tools operate in. Relative paths are resolved
    /// against the current working directory.
    pub project: String,
    /// Existing session to continue; a new one is created when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    #[serde(default)]
    pub mode: RunMode,
}

impl StartRun {
    /// Rejects requests that cannot produce a run.
    ///
    /// # Errors
    ///
    /// * `EngineError::InvalidInput` - When the request or project is blank
    pub fn validate(&self) -> crate::Result<()> {
        if self.request.trim().is_empty() {
            return Err(EngineError::invalid_input("request").with_reason("must not be empty"));
        }
        if self.project.trim().is_empty() {
            return Err(EngineError::invalid_input("project").with_reason("must not be empty"));
        }
        if let Some(session) = &self.session {
            if session.trim().is_empty() {
                return Err(
                    EngineError::invalid_input("session").with_reason("must not be empty")
                );
            }
        }
        Ok(())
    }
}
