//! Single-loop agent: one tool call per iteration, no upfront plan.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;

use crate::{
    completion::{
        extract_payload, ChatMessage, CompletionRequest, CompletionService, CompletionTask,
    },
    config::EngineConfig,
    error::Result,
    events::{Broadcaster, RunEvent},
    models::{MessageKind, MessageRole, ProjectSummary},
    store::StateStore,
    tools::RetryController,
};

const AGENT_INSTRUCTIONS: &str = "You complete software tasks one tool call at a time inside the \
project root. Reply with exactly one JSON object per turn, either \
{\"action\": \"tool\", \"tool\": string, \"parameters\": object, \"thought\": string} or \
{\"action\": \"complete\", \"summary\": string}. Only declare completion after at least one tool \
call has succeeded.";

const PARSE_CORRECTION: &str = "Your reply did not contain a valid action. Answer with one JSON \
object: {\"action\": \"tool\", ...} or {\"action\": \"complete\", \"summary\": ...}.";

const PREMATURE_CORRECTION: &str = "You cannot complete yet: no tool has run successfully in this \
session. Use a tool first.";

/// Tool results fed back to the model are cut to this many characters.
const MAX_RESULT_CHARS: usize = 4000;

/// One proposed next step.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentAction {
    Tool {
        tool: String,
        parameters: Map<String, Value>,
        thought: Option<String>,
    },
    Complete {
        summary: String,
    },
}

/// Reads an action from a reply payload.
///
/// `{"action": "tool" | "complete", ..}` is the canonical form. Without an
/// `action` key a `tool` name means a tool call, and `done: true` or a
/// `complete` key means completion.
pub fn parse_action(payload: &Value) -> Option<AgentAction> {
    let map = payload.as_object()?;
    let action = map
        .get("action")
        .and_then(Value::as_str)
        .map(|a| a.trim().to_lowercase());

    let is_complete = match action.as_deref() {
        Some("complete" | "done" | "finish") => true,
        Some("tool" | "call" | "use_tool") => false,
        Some(_) => return None,
        None => {
            map.get("done").and_then(Value::as_bool) == Some(true) || map.contains_key("complete")
        }
    };

    if is_complete {
        let summary = map
            .get("summary")
            .or_else(|| map.get("complete"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("Task complete")
            .to_string();
        return Some(AgentAction::Complete { summary });
    }

    let tool = map
        .get("tool")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())?;
    let parameters = match ["parameters", "args", "params"]
        .iter()
        .find_map(|key| map.get(*key))
    {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(parameters)) => parameters.clone(),
        Some(_) => return None,
    };
    let thought = map
        .get("thought")
        .and_then(Value::as_str)
        .map(str::to_string);

    Some(AgentAction::Tool {
        tool: tool.to_string(),
        parameters,
        thought,
    })
}

/// Per-run inputs of the agent.
#[derive(Debug, Clone)]
pub struct AgentContext {
    pub session_id: String,
    pub request: String,
    pub summary: ProjectSummary,
    pub cancel: CancellationToken,
}

/// How an agent run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentOutcome {
    pub success: bool,
    pub summary: String,
    /// Iterations consumed
    pub iterations: u32,
    pub tool_calls: u32,
    pub successful_tool_calls: u32,
    pub reached_limit: bool,
    pub cancelled: bool,
}

/// Asks for one action at a time until an honored completion or the cap.
#[derive(Clone)]
pub struct SingleLoopAgent {
    store: StateStore,
    broadcaster: Broadcaster,
    completion: Arc<dyn CompletionService>,
    controller: RetryController,
    max_iterations: u32,
    max_parse_retries: u32,
}

impl SingleLoopAgent {
    pub fn new(
        store: StateStore,
        broadcaster: Broadcaster,
        completion: Arc<dyn CompletionService>,
        controller: RetryController,
        config: &EngineConfig,
    ) -> Self {
        Self {
            store,
            broadcaster,
            completion,
            controller,
            max_iterations: config.max_iterations.max(1),
            max_parse_retries: config.max_parse_retries.max(1),
        }
    }

    /// Successful tool calls recorded on the session by earlier runs.
    async fn earlier_successes(&self, session_id: &str) -> Result<usize> {
        let messages = self.store.get_messages(session_id).await?;
        Ok(messages
            .iter()
            .filter(|m| m.kind == MessageKind::Step)
            .filter(|m| m.payload["result"]["success"].as_bool() == Some(true))
            .count())
    }

    /// Runs the loop and emits `run-complete` as its last event.
    ///
    /// Unparseable replies are answered with a corrective instruction and
    /// retried without consuming the iteration, up to `max_parse_retries`
    /// in a row. A completion signal before any successful tool call in the
    /// session (this run or an earlier one) is rejected and consumes the
    /// iteration. Reaching the iteration cap ends
    /// the run as a soft success.
    pub async fn run(&self, ctx: &AgentContext) -> Result<AgentOutcome> {
        let mut transcript = vec![ChatMessage::user(format!(
            "{}\nAvailable tools:\n{}\nTask: {}",
            ctx.summary.to_prompt_context(),
            self.controller.dispatcher().registry().catalogue(),
            ctx.request
        ))];

        let mut iterations = 0;
        let mut parse_failures = 0;
        let mut tool_calls = 0;
        let mut successful = 0;
        let earlier_successes = self.earlier_successes(&ctx.session_id).await?;
        let mut finished: Option<String> = None;
        let mut cancelled = false;

        while iterations < self.max_iterations {
            if ctx.cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let request = CompletionRequest::new(CompletionTask::NextAction, AGENT_INSTRUCTIONS)
                .with_messages(transcript.clone());
            let reply = self.completion.complete(&request).await?;
            let action = extract_payload(&reply).and_then(|payload| parse_action(&payload));
            transcript.push(ChatMessage::assistant(reply));

            let Some(action) = action else {
                parse_failures += 1;
                log::warn!(
                    "Unparseable agent reply ({parse_failures}/{}) in session {}",
                    self.max_parse_retries,
                    ctx.session_id
                );
                transcript.push(ChatMessage::user(PARSE_CORRECTION));
                if parse_failures >= self.max_parse_retries {
                    parse_failures = 0;
                    iterations += 1;
                }
                continue;
            };
            parse_failures = 0;
            iterations += 1;

            match action {
                AgentAction::Complete { summary } => {
                    if successful == 0 && earlier_successes == 0 {
                        log::info!(
                            "Rejected completion at iteration {iterations}: no successful tool call yet"
                        );
                        transcript.push(ChatMessage::user(PREMATURE_CORRECTION));
                        continue;
                    }
                    finished = Some(summary);
                    break;
                }
                AgentAction::Tool {
                    tool,
                    parameters,
                    thought,
                } => {
                    tool_calls += 1;
                    let outcome = self
                        .controller
                        .run(&tool, &parameters, |notice| {
                            self.broadcaster.publish(RunEvent::ToolRetry {
                                session_id: ctx.session_id.clone(),
                                subtask_id: None,
                                tool: tool.clone(),
                                attempt: notice.attempt,
                                max_attempts: notice.max_attempts,
                                error: notice.error.clone(),
                            });
                        })
                        .await;
                    let result = outcome.result;
                    if result.success {
                        successful += 1;
                    }

                    self.store
                        .add_message(
                            &ctx.session_id,
                            MessageRole::Assistant,
                            MessageKind::Step,
                            json!({
                                "iteration": iterations,
                                "tool": tool,
                                "parameters": parameters,
                                "thought": thought,
                                "attempts": outcome.attempts,
                                "result": result,
                            }),
                        )
                        .await?;
                    self.broadcaster.publish(RunEvent::AgentStep {
                        session_id: ctx.session_id.clone(),
                        iteration: iterations,
                        tool: tool.clone(),
                        success: result.success,
                        error: result.error.clone(),
                    });

                    let rendered = serde_json::to_string(&result)?;
                    transcript.push(ChatMessage::user(format!(
                        "Result of {tool}: {}",
                        truncate(&rendered, MAX_RESULT_CHARS)
                    )));
                }
            }
        }

        let reached_limit = finished.is_none() && !cancelled;
        let (success, summary) = match finished {
            Some(summary) => (true, summary),
            None if cancelled => (
                false,
                format!("Stopped after {iterations} iterations and {tool_calls} tool calls."),
            ),
            None => (
                true,
                format!(
                    "Max iterations reached ({}); {successful} of {tool_calls} tool calls succeeded.",
                    self.max_iterations
                ),
            ),
        };

        self.store
            .add_message(
                &ctx.session_id,
                MessageRole::Assistant,
                MessageKind::Summary,
                json!({
                    "success": success,
                    "cancelled": cancelled,
                    "summary": summary,
                    "iterations": iterations,
                }),
            )
            .await?;
        self.store.touch_session(&ctx.session_id).await?;

        log::info!(
            "Agent run for session {} finished after {iterations} iterations",
            ctx.session_id
        );
        self.broadcaster.publish(RunEvent::RunComplete {
            session_id: ctx.session_id.clone(),
            success,
            summary: summary.clone(),
        });

        Ok(AgentOutcome {
            success,
            summary,
            iterations,
            tool_calls,
            successful_tool_calls: successful,
            reached_limit,
            cancelled,
        })
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}... (truncated)", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_actions() {
        let tool = parse_action(&json!({
            "action": "tool",
            "tool": "read_file",
            "parameters": {"path": "index.html"},
            "thought": "look first"
        }))
        .unwrap();
        assert_eq!(
            tool,
            AgentAction::Tool {
                tool: "read_file".to_string(),
                parameters: json!({"path": "index.html"}).as_object().unwrap().clone(),
                thought: Some("look first".to_string()),
            }
        );

        assert_eq!(
            parse_action(&json!({"action": "complete", "summary": "Form added"})),
            Some(AgentAction::Complete {
                summary: "Form added".to_string()
            })
        );
    }

    #[test]
    fn test_implicit_actions() {
        assert!(matches!(
            parse_action(&json!({"tool": "list_directory"})),
            Some(AgentAction::Tool { .. })
        ));
        assert!(matches!(
            parse_action(&json!({"done": true})),
            Some(AgentAction::Complete { .. })
        ));
        assert_eq!(
            parse_action(&json!({"complete": "All set"})),
            Some(AgentAction::Complete {
                summary: "All set".to_string()
            })
        );
    }

    #[test]
    fn test_rejected_actions() {
        assert_eq!(parse_action(&json!({"action": "dance"})), None);
        assert_eq!(parse_action(&json!({"thought": "hmm"})), None);
        assert_eq!(parse_action(&json!(["read_file"])), None);
        assert_eq!(
            parse_action(&json!({"tool": "read_file", "parameters": "index.html"})),
            None
        );
    }

    #[test]
    fn test_truncate_on_char_boundary() {
        assert_eq!(truncate("héllo", 10), "héllo");
        assert_eq!(truncate("héllo", 2), "hé... (truncated)");
    }
}
