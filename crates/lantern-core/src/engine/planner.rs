//! Turns a request and project summary into an ordered objective list.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::{
    completion::{extract_payload, CompletionRequest, CompletionService, CompletionTask},
    error::Result,
    events::{Broadcaster, PlannedObjective, RunEvent},
    models::{MessageKind, MessageRole, Objective, ProjectSummary},
    store::StateStore,
};

const PLAN_INSTRUCTIONS: &str = "You plan software changes. Break the user's request into 2 to 8 \
short, actionable objectives in execution order. Reply with one JSON object: \
{\"objectives\": [string]}.";

/// Result of planning one request.
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub objectives: Vec<Objective>,
    /// ID of the persisted plan message
    pub message_id: u64,
    /// True when the generic fallback plan was used
    pub fallback: bool,
}

/// Produces and persists the objective list of a run.
#[derive(Clone)]
pub struct Planner {
    completion: Arc<dyn CompletionService>,
    store: StateStore,
    broadcaster: Broadcaster,
    max_objectives: usize,
}

impl Planner {
    pub fn new(
        completion: Arc<dyn CompletionService>,
        store: StateStore,
        broadcaster: Broadcaster,
        max_objectives: usize,
    ) -> Self {
        Self {
            completion,
            store,
            broadcaster,
            max_objectives: max_objectives.max(1),
        }
    }

    /// Plans `request`, persists the objectives with orders from 1, writes a
    /// plan message and emits `plan-created`.
    ///
    /// Malformed output never fails the call: the reply is re-parsed after
    /// cleanup and then replaced by a generic three-step plan. Only a
    /// completion-service failure is returned as an error.
    pub async fn plan(
        &self,
        session_id: &str,
        request: &str,
        summary: &ProjectSummary,
    ) -> Result<PlanOutcome> {
        let completion = CompletionRequest::new(CompletionTask::Plan, PLAN_INSTRUCTIONS).user(
            format!("{}\nRequest: {request}", summary.to_prompt_context()),
        );
        let reply = self.completion.complete(&completion).await?;

        let (mut texts, fallback) = match parse_objectives(&reply) {
            Some(texts) => (texts, false),
            None => {
                log::warn!("Unusable plan from completion service, using fallback plan");
                (fallback_plan(request), true)
            }
        };
        texts.truncate(self.max_objectives);

        let objectives = self.store.create_objectives(session_id, texts).await?;
        log::info!(
            "Planned {} objectives for session {session_id}",
            objectives.len()
        );

        let payload = json!({
            "request": request,
            "fallback": fallback,
            "objectives": objectives
                .iter()
                .map(|o| json!({
                    "id": o.id,
                    "order": o.order,
                    "text": o.text,
                    "status": o.status,
                }))
                .collect::<Vec<_>>(),
        });
        let message = self
            .store
            .add_message(session_id, MessageRole::Assistant, MessageKind::Plan, payload)
            .await?;

        self.broadcaster.publish(RunEvent::PlanCreated {
            session_id: session_id.to_string(),
            objectives: objectives
                .iter()
                .map(|o| PlannedObjective {
                    id: o.id,
                    order: o.order,
                    text: o.text.clone(),
                })
                .collect(),
            fallback,
        });

        Ok(PlanOutcome {
            objectives,
            message_id: message.id,
            fallback,
        })
    }
}

/// Extracts objective texts, retrying once on a cleaned-up copy.
pub fn parse_objectives(reply: &str) -> Option<Vec<String>> {
    extract_payload(reply)
        .and_then(|payload| objectives_from(&payload))
        .or_else(|| {
            let cleaned = strip_artifacts(reply);
            extract_payload(&cleaned).and_then(|payload| objectives_from(&payload))
        })
}

fn objectives_from(payload: &Value) -> Option<Vec<String>> {
    let items = match payload {
        Value::Array(items) => items,
        Value::Object(map) => ["objectives", "tasks", "plan", "steps"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_array))?,
        _ => return None,
    };

    let texts: Vec<String> = items
        .iter()
        .filter_map(|item| match item {
            Value::String(text) => Some(text.as_str()),
            Value::Object(map) => ["text", "title", "description"]
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_str)),
            _ => None,
        })
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(String::from)
        .collect();

    (!texts.is_empty()).then_some(texts)
}

/// Removes wrapper artifacts models like to add around JSON: typographic
/// quotes, stray language labels and trailing commas.
fn strip_artifacts(reply: &str) -> String {
    let mut text = reply
        .replace(['\u{201c}', '\u{201d}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    let unlabeled = ["json:", "JSON:", "json", "JSON"]
        .iter()
        .find_map(|label| text.trim_start().strip_prefix(*label))
        .map(str::to_string);
    if let Some(rest) = unlabeled {
        text = rest;
    }

    let mut cleaned = String::with_capacity(text.len());
    let chars: Vec<char> = text.chars().collect();
    for (i, c) in chars.iter().enumerate() {
        if *c == ',' {
            let next = chars[i + 1..].iter().find(|n| !n.is_whitespace());
            if matches!(next, Some(']') | Some('}')) {
                continue;
            }
        }
        cleaned.push(*c);
    }
    cleaned
}

/// Generic analyze / implement / verify plan.
pub fn fallback_plan(request: &str) -> Vec<String> {
    let request = request.trim();
    vec![
        format!("Analyze the project structure and code relevant to: {request}"),
        format!("Implement the changes for: {request}"),
        "Verify the changes build and behave as intended".to_string(),
    ]
}
