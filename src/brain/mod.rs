//! Brain Module
//!
//! Everything behind an agent invocation: the LLM provider, the tools,
//! the agent definitions and runtime, and the scorers that grade replies.

pub mod agent;
pub mod provider;
pub mod registry;
pub mod scorers;
pub mod tools;

use std::sync::Arc;
use std::time::Duration;

// Re-exports
pub use agent::{Agent, AgentDefinition, AgentError, AgentOutput, GenerateOptions};
pub use registry::AgentRegistry;

use crate::config::{Config, LlmConfig};
use provider::{OpenAiProvider, PlaceholderProvider, Provider};
use tools::{ToolRegistry, WebSearchTool};

/// The configured provider, or the placeholder when no key is set.
pub fn build_provider(cfg: &LlmConfig) -> anyhow::Result<Arc<dyn Provider>> {
    match cfg.api_key.clone().filter(|k| !k.is_empty()) {
        Some(key) => {
            let provider = OpenAiProvider::new(
                cfg.base_url.clone(),
                key,
                cfg.model.clone(),
                Duration::from_secs(cfg.timeout_secs),
            )?;
            tracing::info!("LLM provider: {} ({})", cfg.base_url, cfg.model);
            Ok(Arc::new(provider))
        }
        None => {
            tracing::warn!("No LLM API key configured; agent calls will fail until one is set");
            Ok(Arc::new(PlaceholderProvider))
        }
    }
}

/// All built-in tools.
pub fn build_tools(cfg: &Config) -> anyhow::Result<ToolRegistry> {
    let mut tools = ToolRegistry::new();
    tools.register(Arc::new(WebSearchTool::new(&cfg.search)?));
    Ok(tools)
}
