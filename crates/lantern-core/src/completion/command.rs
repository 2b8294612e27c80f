//! Completion backend that shells out to a user-configured command.

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::{CompletionRequest, CompletionService};
use crate::{
    error::{EngineError, Result},
    process::run_with_timeout,
};

/// Environment variable carrying the task name to the command.
pub const TASK_ENV: &str = "LANTERN_COMPLETION_TASK";

/// Runs `sh -c <command>` per request. The JSON-serialized request is
/// written to stdin and stdout is taken as the response text.
#[derive(Debug, Clone)]
pub struct CommandCompletion {
    command: String,
    timeout: Duration,
}

impl CommandCompletion {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

#[async_trait]
impl CompletionService for CommandCompletion {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let input = serde_json::to_vec(request)?;

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&self.command)
            .env(TASK_ENV, request.task.as_str());

        log::debug!("Completion `{}` for task {}", self.command, request.task);
        let output = run_with_timeout(cmd, Some(input), self.timeout)
            .await
            .map_err(|e| EngineError::completion(format!("failed to run `{}`: {e}", self.command)))?;

        if output.timed_out {
            return Err(EngineError::completion(format!(
                "`{}` did not answer within {}s",
                self.command,
                self.timeout.as_secs()
            )));
        }
        if !output.success {
            return Err(EngineError::completion(format!(
                "`{}` exited with {}: {}",
                self.command,
                output
                    .exit_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "a signal".to_string()),
                output.tail(5)
            )));
        }

        Ok(output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::CompletionTask;

    #[tokio::test]
    async fn test_request_is_piped_and_task_exported() {
        let backend = CommandCompletion::new(
            r#"printf '%s|' "$LANTERN_COMPLETION_TASK"; cat"#,
            Duration::from_secs(5),
        );
        let request = CompletionRequest::new(CompletionTask::Plan, "sys").user("hi");

        let reply = backend.complete(&request).await.unwrap();
        let (task, body) = reply.split_once('|').unwrap();
        assert_eq!(task, "plan");
        let echoed: CompletionRequest = serde_json::from_str(body).unwrap();
        assert_eq!(echoed, request);
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_a_completion_error() {
        let backend = CommandCompletion::new("echo offline >&2; exit 1", Duration::from_secs(5));
        let request = CompletionRequest::new(CompletionTask::Plan, "sys");

        let err = backend.complete(&request).await.unwrap_err();
        assert!(matches!(err, EngineError::Completion { .. }));
        assert!(err.to_string().contains("offline"));
    }
}
