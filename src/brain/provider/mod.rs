//! LLM Provider Module
//!
//! A single trait the agent runtime talks to, an OpenAI-compatible
//! chat-completions implementation, and a placeholder used when no API key
//! is configured.

mod error;
mod openai;
mod placeholder;
mod types;

use async_trait::async_trait;

pub use error::{ProviderError, Result};
pub use openai::OpenAiProvider;
pub use placeholder::PlaceholderProvider;
pub use types::{
    ContentBlock, LLMRequest, LLMResponse, Message, Role, StopReason, TokenUsage, ToolDefinition,
};

#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    fn default_model(&self) -> &str;

    fn supported_models(&self) -> Vec<String>;

    fn context_window(&self, model: &str) -> Option<u32>;

    fn calculate_cost(&self, model: &str, input_tokens: u32, output_tokens: u32) -> f64;

    async fn complete(&self, request: LLMRequest) -> Result<LLMResponse>;

    fn supports_tools(&self) -> bool;

    fn supports_vision(&self) -> bool;
}
