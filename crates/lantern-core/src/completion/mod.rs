//! Contract with the external completion service.
//!
//! The engine never talks to a model directly. It sends a
//! [`CompletionRequest`] (system instructions plus the conversation so far)
//! to a [`CompletionService`] and receives free text expected to contain
//! one JSON payload, which [`extract_payload`] digs out.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{error::Result, models::MessageRole};

pub mod command;
pub mod extract;
#[cfg(any(test, feature = "test-support"))]
pub mod scripted;

pub use command::CommandCompletion;
pub use extract::extract_payload;
#[cfg(any(test, feature = "test-support"))]
pub use scripted::ScriptedCompletion;

/// Purpose of a completion call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompletionTask {
    /// Classify a project from its file digest
    Classify,
    /// Produce the objective list for a request
    Plan,
    /// Expand one objective into tool-backed subtasks
    Decompose,
    /// Propose the single next action of the agent loop
    NextAction,
    /// Summarize a finished run
    Summarize,
}

impl CompletionTask {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionTask::Classify => "classify",
            CompletionTask::Plan => "plan",
            CompletionTask::Decompose => "decompose",
            CompletionTask::NextAction => "next-action",
            CompletionTask::Summarize => "summarize",
        }
    }
}

impl fmt::Display for CompletionTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One turn of the conversation sent to the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Request sent to the completion service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub task: CompletionTask,
    pub system: String,
    pub messages: Vec<ChatMessage>,
}

impl CompletionRequest {
    pub fn new(task: CompletionTask, system: impl Into<String>) -> Self {
        Self {
            task,
            system: system.into(),
            messages: Vec::new(),
        }
    }

    /// Appends a user turn.
    pub fn user(mut self, content: impl Into<String>) -> Self {
        self.messages.push(ChatMessage::user(content));
        self
    }

    pub fn with_messages(mut self, messages: Vec<ChatMessage>) -> Self {
        self.messages = messages;
        self
    }
}

/// The language-model collaborator.
///
/// An `Err` means the service could not answer at all (unreachable, crashed,
/// timed out); the engine treats that as a terminal run error. A reply that
/// merely fails to parse is returned as `Ok` and recovered by the caller.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        let request = CompletionRequest::new(CompletionTask::NextAction, "Pick one tool")
            .user("add a contact form");
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["task"], "next-action");
        assert_eq!(json["system"], "Pick one tool");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "add a contact form");
    }
}
