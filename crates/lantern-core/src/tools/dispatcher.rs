//! Resolves a tool call against the registry and normalizes its outcome.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{ParamKind, ToolContext, ToolError, ToolHandler, ToolParams, ToolRegistry};

/// Uniform result envelope of one dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    /// Create a successful result
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Create a failed result
    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }

    /// Error text, or an empty string for successful results.
    pub fn error_text(&self) -> &str {
        self.error.as_deref().unwrap_or_default()
    }
}

impl From<Result<Value, ToolError>> for ToolResult {
    fn from(result: Result<Value, ToolError>) -> Self {
        match result {
            Ok(data) => ToolResult::ok(data),
            Err(e) => ToolResult::err(e.to_string()),
        }
    }
}

/// Validates and runs tool calls for one project root.
#[derive(Debug, Clone)]
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    context: ToolContext,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>, context: ToolContext) -> Self {
        Self { registry, context }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn context(&self) -> &ToolContext {
        &self.context
    }

    /// Checks a call against the tool's schema without running it: the tool
    /// must exist, required parameters must be present, every value must
    /// have the declared kind, unknown keys are rejected and path parameters
    /// must stay inside the project root.
    pub fn validate(
        &self,
        tool: &str,
        params: &Map<String, Value>,
    ) -> Result<Arc<dyn ToolHandler>, ToolError> {
        let handler = self
            .registry
            .get(tool)
            .ok_or_else(|| ToolError::UnknownTool(tool.to_string()))?;
        let spec = handler.spec();

        if let Some(unknown) = params.keys().find(|key| spec.param(key).is_none()) {
            return Err(ToolError::InvalidParameters(format!(
                "{tool} does not accept '{unknown}'"
            )));
        }

        for param in &spec.params {
            let value = match params.get(&param.name) {
                None | Some(Value::Null) if param.required => {
                    return Err(ToolError::InvalidParameters(format!(
                        "{tool} requires '{}'",
                        param.name
                    )));
                }
                None | Some(Value::Null) => continue,
                Some(value) => value,
            };

            let matches = match param.kind {
                ParamKind::String | ParamKind::Path => value.is_string(),
                ParamKind::Integer => value.is_i64() || value.is_u64(),
                ParamKind::Boolean => value.is_boolean(),
            };
            if !matches {
                return Err(ToolError::InvalidParameters(format!(
                    "'{}' of {tool} must be {}",
                    param.name,
                    param.kind.as_str()
                )));
            }

            if param.kind == ParamKind::Path {
                if let Some(raw) = value.as_str() {
                    self.context.resolve(raw)?;
                }
            }
        }

        Ok(handler)
    }

    /// Validates then invokes the tool, keeping the typed error.
    pub async fn try_dispatch(
        &self,
        tool: &str,
        params: &Map<String, Value>,
    ) -> Result<Value, ToolError> {
        let handler = self.validate(tool, params)?;
        handler.call(&self.context, ToolParams::new(params)).await
    }

    /// Validates then invokes the tool, folding the outcome into a
    /// [`ToolResult`].
    pub async fn dispatch(&self, tool: &str, params: &Map<String, Value>) -> ToolResult {
        let result = ToolResult::from(self.try_dispatch(tool, params).await);
        if result.success {
            log::debug!("{tool} succeeded");
        } else {
            log::debug!("{tool} failed: {}", result.error_text());
        }
        result
    }
}
