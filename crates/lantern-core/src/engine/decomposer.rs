//! Expands one objective into concrete, validated tool calls.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::{
    completion::{
        extract_payload, ChatMessage, CompletionRequest, CompletionService, CompletionTask,
    },
    error::{EngineError, Result},
    models::{Objective, ProjectSummary, SubtaskDraft},
    tools::ToolDispatcher,
};

const DECOMPOSE_INSTRUCTIONS: &str = "You turn one objective into 2 to 6 concrete tool calls, \
executed in order inside the project root. Use only the listed tools and only their listed \
parameters; paths are relative to the project root. Reply with one JSON object: \
{\"subtasks\": [{\"name\": string, \"tool\": string, \"parameters\": object}]}.";

/// Decomposes objectives, regenerating once when the first answer is
/// rejected.
#[derive(Clone)]
pub struct Decomposer {
    completion: Arc<dyn CompletionService>,
    max_subtasks: usize,
}

impl Decomposer {
    pub fn new(completion: Arc<dyn CompletionService>, max_subtasks: usize) -> Self {
        Self {
            completion,
            max_subtasks: max_subtasks.max(1),
        }
    }

    /// Returns validated drafts for `objective`.
    ///
    /// Every draft names a registered tool with a parameter bag that passes
    /// the dispatcher's schema and root checks.
    ///
    /// # Errors
    ///
    /// * `EngineError::Decomposition` - When the answer and its one
    ///   regeneration are both rejected
    /// * `EngineError::Completion` - When the completion service fails
    pub async fn decompose(
        &self,
        request: &str,
        summary: &ProjectSummary,
        objective: &Objective,
        dispatcher: &ToolDispatcher,
    ) -> Result<Vec<SubtaskDraft>> {
        let prompt = format!(
            "{}\nAvailable tools:\n{}\nOverall request: {request}\nObjective {}: {}",
            summary.to_prompt_context(),
            dispatcher.registry().catalogue(),
            objective.order,
            objective.text
        );
        let mut messages = vec![ChatMessage::user(prompt)];

        let mut rejection = String::new();
        for attempt in 0..2 {
            let completion = CompletionRequest::new(CompletionTask::Decompose, DECOMPOSE_INSTRUCTIONS)
                .with_messages(messages.clone());
            let reply = self.completion.complete(&completion).await?;

            match self.parse_and_validate(&reply, dispatcher) {
                Ok(drafts) => {
                    log::debug!(
                        "Objective {} decomposed into {} subtasks",
                        objective.id,
                        drafts.len()
                    );
                    return Ok(drafts);
                }
                Err(reason) => {
                    log::warn!(
                        "Decomposition of objective {} rejected (attempt {}): {reason}",
                        objective.id,
                        attempt + 1
                    );
                    messages.push(ChatMessage::assistant(reply));
                    messages.push(ChatMessage::user(format!(
                        "Your answer was rejected: {reason}. Regenerate the subtasks using only \
                         these tools: {}.",
                        dispatcher.registry().names().join(", ")
                    )));
                    rejection = reason;
                }
            }
        }

        Err(EngineError::Decomposition { reason: rejection })
    }

    fn parse_and_validate(
        &self,
        reply: &str,
        dispatcher: &ToolDispatcher,
    ) -> std::result::Result<Vec<SubtaskDraft>, String> {
        let payload =
            extract_payload(reply).ok_or_else(|| "no JSON payload found".to_string())?;
        let mut drafts = parse_subtasks(&payload)?;

        // Every draft is validated, including ones about to be cut
        for (position, draft) in drafts.iter().enumerate() {
            dispatcher
                .validate(&draft.tool, &draft.parameters)
                .map_err(|e| format!("subtask {position} ({}): {e}", draft.name))?;
        }
        if drafts.len() > self.max_subtasks {
            log::warn!(
                "Dropping {} subtasks beyond the limit of {}",
                drafts.len() - self.max_subtasks,
                self.max_subtasks
            );
            drafts.truncate(self.max_subtasks);
        }
        Ok(drafts)
    }
}

/// Reads subtask drafts from a decomposition payload.
pub fn parse_subtasks(payload: &Value) -> std::result::Result<Vec<SubtaskDraft>, String> {
    let items = match payload {
        Value::Array(items) => items,
        Value::Object(map) => ["subtasks", "steps", "tasks"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_array))
            .ok_or_else(|| "payload has no subtasks list".to_string())?,
        _ => return Err("payload is neither an object nor a list".to_string()),
    };
    if items.is_empty() {
        return Err("decomposition is empty".to_string());
    }

    items
        .iter()
        .enumerate()
        .map(|(position, item)| {
            let map = item
                .as_object()
                .ok_or_else(|| format!("subtask {position} is not an object"))?;
            let tool = map
                .get("tool")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .ok_or_else(|| format!("subtask {position} names no tool"))?;
            let parameters = match ["parameters", "args", "params"]
                .iter()
                .find_map(|key| map.get(*key))
            {
                None | Some(Value::Null) => Map::new(),
                Some(Value::Object(parameters)) => parameters.clone(),
                Some(_) => return Err(format!("parameters of subtask {position} are not an object")),
            };
            let name = ["name", "description"]
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_str))
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .unwrap_or(tool)
                .to_string();

            Ok(SubtaskDraft {
                name,
                tool: tool.to_string(),
                parameters,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_aliases_are_accepted() {
        let drafts = parse_subtasks(&json!([
            {"description": "Read the page", "tool": "read_file", "args": {"path": "index.html"}},
            {"tool": "list_directory"}
        ]))
        .unwrap();

        assert_eq!(drafts[0].name, "Read the page");
        assert_eq!(drafts[0].parameters["path"], "index.html");
        assert_eq!(drafts[1].name, "list_directory");
        assert!(drafts[1].parameters.is_empty());
    }

    #[test]
    fn test_shape_errors() {
        assert!(parse_subtasks(&json!({"subtasks": []})).is_err());
        assert!(parse_subtasks(&json!({"subtasks": [{"name": "x"}]})).is_err());
        assert!(parse_subtasks(&json!({"subtasks": [{"tool": "read_file", "parameters": "a"}]})).is_err());
        assert!(parse_subtasks(&json!("read everything")).is_err());
    }
}
