//! The `Tool` trait and its execution types.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::error::Result;

/// What a tool is allowed to touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCapability {
    Network,
    ReadFiles,
}

/// Ambient information passed to every tool call.
#[derive(Debug, Clone, Default)]
pub struct ToolExecutionContext {
    pub agent_id: String,
    /// Conversation thread, when the call belongs to one.
    pub thread_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResult {
    pub success: bool,
    /// Text handed back to the model.
    pub output: String,
    /// Structured payload surfaced to A2A clients as a data artifact.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(output: String) -> Self {
        Self {
            success: true,
            output,
            data: None,
            error: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            output: format!("Error: {}", message),
            data: None,
            error: Some(message),
        }
    }

    /// The value recorded for this call in task artifacts.
    pub fn to_value(&self) -> Value {
        match (&self.data, &self.error) {
            (Some(data), _) => data.clone(),
            (None, Some(err)) => serde_json::json!({ "error": err }),
            (None, None) => Value::String(self.output.clone()),
        }
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the `input` object.
    fn input_schema(&self) -> Value;

    fn capabilities(&self) -> Vec<ToolCapability>;

    fn requires_approval(&self) -> bool;

    async fn execute(&self, input: Value, context: &ToolExecutionContext) -> Result<ToolResult>;
}
