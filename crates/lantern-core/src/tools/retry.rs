//! Bounded retries with exponential backoff around a dispatch call.

use std::{sync::Arc, time::Duration};

use serde_json::{Map, Value};

use super::{ToolDispatcher, ToolResult};
use crate::config::EngineConfig;

/// Error categories that never succeed on a retry.
const TERMINAL_CATEGORIES: &[&str] = &[
    "unknown tool",
    "not found",
    "permission denied",
    "invalid parameters",
    "syntax error",
];

/// Whether a failed dispatch is worth attempting again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Retryable,
    Terminal,
}

/// Classifies an error message by its category, the text before the first
/// `:`. The detail after it may quote commands or stderr and is ignored.
pub fn classify(message: &str) -> ErrorClass {
    let category = message
        .split_once(':')
        .map_or(message, |(category, _)| category)
        .trim()
        .to_lowercase();
    if TERMINAL_CATEGORIES.contains(&category.as_str()) {
        ErrorClass::Terminal
    } else {
        ErrorClass::Retryable
    }
}

/// Attempt cap and backoff base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for RetryPolicy {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff_base: config.backoff_base,
        }
    }
}

impl RetryPolicy {
    /// Delay after the `attempt`-th failure (1-based): `base * 2^attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(1 << attempt.min(16))
    }
}

/// Emitted between attempts, before the backoff sleep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryNotice {
    /// The attempt that just failed (1-based)
    pub attempt: u32,
    pub max_attempts: u32,
    pub error: String,
}

/// Final result of one controller pass.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOutcome {
    pub result: ToolResult,
    /// Dispatch attempts made during this pass
    pub attempts: u32,
}

/// Wraps dispatch calls with bounded attempts.
#[derive(Debug, Clone)]
pub struct RetryController {
    dispatcher: Arc<ToolDispatcher>,
    policy: RetryPolicy,
}

impl RetryController {
    pub fn new(dispatcher: Arc<ToolDispatcher>, policy: RetryPolicy) -> Self {
        Self { dispatcher, policy }
    }

    pub fn dispatcher(&self) -> &ToolDispatcher {
        &self.dispatcher
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Runs one pass: dispatches until success, a terminal error, or the
    /// attempt cap. `on_retry` is called before every backoff sleep.
    pub async fn run<F>(
        &self,
        tool: &str,
        params: &Map<String, Value>,
        mut on_retry: F,
    ) -> RetryOutcome
    where
        F: FnMut(&RetryNotice),
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self.dispatcher.dispatch(tool, params).await;
            if result.success {
                return RetryOutcome {
                    result,
                    attempts: attempt,
                };
            }

            if classify(result.error_text()) == ErrorClass::Terminal {
                log::info!("{tool} failed with a terminal error: {}", result.error_text());
                return RetryOutcome {
                    result,
                    attempts: attempt,
                };
            }
            if attempt >= self.policy.max_attempts {
                log::info!("{tool} failed after {attempt} attempts");
                return RetryOutcome {
                    result,
                    attempts: attempt,
                };
            }

            let notice = RetryNotice {
                attempt,
                max_attempts: self.policy.max_attempts,
                error: result.error_text().to_string(),
            };
            let delay = self.policy.backoff(attempt);
            log::debug!(
                "{tool} attempt {attempt}/{} failed, retrying in {delay:?}: {}",
                self.policy.max_attempts,
                notice.error
            );
            on_retry(&notice);
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::tools::{ToolContext, ToolError, ToolHandler, ToolParams, ToolRegistry, ToolSpec};

    /// Fails with `error` for the first `failures` calls, then succeeds.
    struct Flaky {
        spec: ToolSpec,
        failures: u32,
        error: ToolError,
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl ToolHandler for Flaky {
        fn spec(&self) -> &ToolSpec {
            &self.spec
        }

        async fn call(&self, _: &ToolContext, _: ToolParams<'_>) -> Result<Value, ToolError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.failures {
                Err(self.error.clone())
            } else {
                Ok(json!({"call": n}))
            }
        }
    }

    fn controller(failures: u32, error: ToolError) -> (RetryController, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Flaky {
            spec: ToolSpec::new("flaky", "test tool"),
            failures,
            error,
            calls: calls.clone(),
        }));
        let dispatcher = ToolDispatcher::new(
            Arc::new(registry),
            ToolContext::new("/tmp", Duration::from_secs(1)),
        );
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff_base: Duration::ZERO,
        };
        (RetryController::new(Arc::new(dispatcher), policy), calls)
    }

    #[test]
    fn test_classification() {
        assert_eq!(classify("Permission denied: /etc/passwd"), ErrorClass::Terminal);
        assert_eq!(classify("Unknown tool: teleport_file"), ErrorClass::Terminal);
        assert_eq!(classify("Not found: src/app.js"), ErrorClass::Terminal);
        assert_eq!(classify("Timed out: `npm test` exceeded 120s"), ErrorClass::Retryable);
        assert_eq!(classify("I/O error: disk busy"), ErrorClass::Retryable);
    }

    #[test]
    fn test_classification_ignores_quoted_detail() {
        assert_eq!(
            classify("Timed out: `grep -rn 'not found' logs` exceeded 120s"),
            ErrorClass::Retryable
        );
        assert_eq!(
            classify("Command failed: exit 1, stderr: permission denied on cache"),
            ErrorClass::Retryable
        );
        assert_eq!(classify("syntax error"), ErrorClass::Terminal);
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
        };
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        assert_eq!(policy.backoff(3), Duration::from_secs(8));
    }

    #[tokio::test]
    async fn test_permission_denied_is_attempted_once() {
        let (controller, calls) =
            controller(10, ToolError::PermissionDenied("/etc/passwd".to_string()));
        let mut notices = Vec::new();

        let outcome = controller
            .run("flaky", &Map::new(), |n| notices.push(n.clone()))
            .await;

        assert!(!outcome.result.success);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(notices.is_empty());
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried_until_success() {
        let (controller, calls) = controller(2, ToolError::TimedOut("slow".to_string()));
        let mut notices = Vec::new();

        let outcome = controller
            .run("flaky", &Map::new(), |n| notices.push(n.clone()))
            .await;

        assert!(outcome.result.success);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            notices.iter().map(|n| n.attempt).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert_eq!(notices[0].error, "Timed out: slow");
    }

    #[tokio::test]
    async fn test_attempt_cap_is_respected() {
        let (controller, calls) = controller(10, ToolError::Io("flaky disk".to_string()));
        let outcome = controller.run("flaky", &Map::new(), |_| {}).await;

        assert!(!outcome.result.success);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
