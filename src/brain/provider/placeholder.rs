//! Placeholder Provider
//!
//! Stands in when no API key is configured so the gateway can still boot,
//! serve agent cards and health checks. Any agent invocation fails.

use async_trait::async_trait;

use super::{LLMRequest, LLMResponse, Provider, ProviderError, Result};

pub struct PlaceholderProvider;

#[async_trait]
impl Provider for PlaceholderProvider {
    fn name(&self) -> &str {
        "none"
    }

    fn default_model(&self) -> &str {
        "none"
    }

    fn supported_models(&self) -> Vec<String> {
        vec![]
    }

    fn context_window(&self, _model: &str) -> Option<u32> {
        None
    }

    fn calculate_cost(&self, _model: &str, _input_tokens: u32, _output_tokens: u32) -> f64 {
        0.0
    }

    async fn complete(&self, _request: LLMRequest) -> Result<LLMResponse> {
        Err(ProviderError::Internal(
            "No LLM provider configured. Set llm.api_key or OPENAI_API_KEY.".to_string(),
        ))
    }

    fn supports_tools(&self) -> bool {
        false
    }

    fn supports_vision(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::provider::Message;

    #[tokio::test]
    async fn test_placeholder_refuses_completion() {
        let provider = PlaceholderProvider;
        let err = provider
            .complete(LLMRequest::new("none", vec![Message::user("hi")]))
            .await
            .expect_err("placeholder must fail");
        assert!(err.to_string().contains("No LLM provider configured"));
        assert_eq!(provider.name(), "none");
    }
}
