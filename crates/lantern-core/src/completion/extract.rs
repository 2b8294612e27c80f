//! Best-effort extraction of a JSON payload from free-form model output.

use serde_json::Value;

/// Finds the structured payload in a completion response.
///
/// Candidates are tried in this order and the first one that parses wins:
///
/// 1. the whole trimmed text;
/// 2. the body of the first fenced code block (```` ```json ```` or bare
///    ```` ``` ````);
/// 3. the slice from the first `{` or `[` to the last matching `}` or `]`.
///
/// ```rust
/// use lantern_core::completion::extract_payload;
///
/// let reply = "Sure! Here is the plan:\n```json\n{\"objectives\": [\"Add form\"]}\n```";
/// let payload = extract_payload(reply).unwrap();
/// assert_eq!(payload["objectives"][0], "Add form");
/// ```
pub fn extract_payload(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    if let Some(block) = fenced_block(trimmed) {
        if let Ok(value) = serde_json::from_str(block) {
            return Some(value);
        }
    }

    bracket_slices(trimmed)
        .into_iter()
        .find_map(|slice| serde_json::from_str(slice).ok())
}

/// Body of the first ``` fence, without the info string.
fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after_fence = &text[start + 3..];
    // The info string (e.g. "json") runs to the end of the opening line
    let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_fence[body_start..];
    let end = body.find("```")?;
    Some(body[..end].trim())
}

/// Object and array slices, earliest opening bracket first.
fn bracket_slices(text: &str) -> Vec<&str> {
    let mut slices: Vec<(usize, &str)> = [('{', '}'), ('[', ']')]
        .into_iter()
        .filter_map(|(open, close)| {
            let start = text.find(open)?;
            let end = text.rfind(close)?;
            (end > start).then(|| (start, &text[start..=end]))
        })
        .collect();
    slices.sort_by_key(|(start, _)| *start);
    slices.into_iter().map(|(_, slice)| slice).collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_direct_json() {
        assert_eq!(
            extract_payload(r#"  {"done": true}  "#),
            Some(json!({"done": true}))
        );
    }

    #[test]
    fn test_bare_fence() {
        let text = "```\n[\"a\", \"b\"]\n```";
        assert_eq!(extract_payload(text), Some(json!(["a", "b"])));
    }

    #[test]
    fn test_fence_wins_over_surrounding_braces() {
        let text = "Using {braces} in prose.\n```json\n{\"tool\": \"read_file\"}\n```\nDone {ok}";
        assert_eq!(extract_payload(text), Some(json!({"tool": "read_file"})));
    }

    #[test]
    fn test_brace_heuristic() {
        let text = "I will read the file now: {\"tool\": \"read_file\", \"parameters\": {\"path\": \"a\"}} thanks";
        let value = extract_payload(text).unwrap();
        assert_eq!(value["parameters"]["path"], "a");
    }

    #[test]
    fn test_array_before_object() {
        let text = "Plan: [\"Analyze {structure}\", \"Implement\"] end";
        assert_eq!(
            extract_payload(text),
            Some(json!(["Analyze {structure}", "Implement"]))
        );
    }

    #[test]
    fn test_unparseable_text() {
        assert_eq!(extract_payload("no structure here"), None);
        assert_eq!(extract_payload("{ broken"), None);
        assert_eq!(extract_payload(""), None);
    }
}
