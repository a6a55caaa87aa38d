//! Agents
//!
//! An [`AgentDefinition`] is static configuration: instructions, model,
//! tool names, whether it keeps memory, which scorers grade it. An
//! [`Agent`] binds a definition to a provider, the shared tool registry and
//! the memory store, and runs the tool-calling loop.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::brain::provider::{
    ContentBlock, LLMRequest, Message, Provider, ProviderError, Role, TokenUsage,
};
use crate::brain::scorers::{self, ScoreResult, Scorer, ScorerInput};
use crate::brain::tools::{ToolExecutionContext, ToolRegistry, ToolResult, web_search};
use crate::memory::{MemoryError, MemoryStore, StoredMessage};

pub const SEARCH_AGENT_ID: &str = "searchAgent";

const SEARCH_AGENT_INSTRUCTIONS: &str = "You are a web research assistant.

- Use the web_search tool whenever the question involves recent events, \
  changing facts, or when the user asks for sources.
- Prefer a few focused searches over one broad one.
- Answer concisely and cite the URLs you relied on inline.
- If the search returns nothing useful, say so instead of guessing.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub instructions: String,
    /// Falls back to the provider's default model.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default = "default_true")]
    pub memory: bool,
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    #[serde(default)]
    pub scorers: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_max_steps() -> usize {
    5
}

impl AgentDefinition {
    /// The built-in web research agent.
    pub fn search_agent() -> Self {
        Self {
            id: SEARCH_AGENT_ID.to_string(),
            name: "Search Agent".to_string(),
            description: "Answers questions with up-to-date information from the web, citing sources."
                .to_string(),
            instructions: SEARCH_AGENT_INSTRUCTIONS.to_string(),
            model: None,
            tools: vec![web_search::TOOL_NAME.to_string()],
            memory: true,
            max_steps: default_max_steps(),
            scorers: vec![
                scorers::TOOL_CALL.to_string(),
                scorers::COMPLETENESS.to_string(),
                scorers::SOURCE_ATTRIBUTION.to_string(),
            ],
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Agent received no input messages")]
    EmptyInput,

    #[error("LLM call failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Memory access failed: {0}")]
    Memory(#[from] MemoryError),
}

#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Memory thread; the A2A `contextId`.
    pub thread_id: Option<String>,
    /// Memory scope of the thread. Defaults to the agent id.
    pub resource_id: Option<String>,
}

/// One tool invocation and its outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallRecord {
    pub tool_call_id: String,
    pub tool_name: String,
    pub args: Value,
    pub result: Value,
    pub is_error: bool,
}

/// One model round-trip.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentStep {
    pub text: String,
    pub tool_calls: Vec<ToolCallRecord>,
}

#[derive(Debug, Clone)]
pub struct AgentOutput {
    pub text: String,
    pub model: String,
    pub steps: Vec<AgentStep>,
    pub usage: TokenUsage,
    pub cost_usd: f64,
    pub scores: Vec<ScoreResult>,
}

impl AgentOutput {
    /// All tool calls across steps, in order.
    pub fn tool_results(&self) -> impl Iterator<Item = &ToolCallRecord> {
        self.steps.iter().flat_map(|s| s.tool_calls.iter())
    }
}

pub struct Agent {
    definition: AgentDefinition,
    provider: Arc<dyn Provider>,
    tools: ToolRegistry,
    memory: Option<MemoryStore>,
    memory_window: u32,
    scorers: Vec<Arc<dyn Scorer>>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl Agent {
    pub fn new(definition: AgentDefinition, provider: Arc<dyn Provider>, tools: ToolRegistry) -> Self {
        Self {
            definition,
            provider,
            tools,
            memory: None,
            memory_window: 10,
            scorers: Vec::new(),
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_memory(mut self, store: MemoryStore, window: u32) -> Self {
        self.memory = Some(store);
        self.memory_window = window;
        self
    }

    pub fn with_scorers(mut self, scorers: Vec<Arc<dyn Scorer>>) -> Self {
        self.scorers = scorers;
        self
    }

    pub fn with_sampling(mut self, temperature: Option<f32>, max_tokens: Option<u32>) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn id(&self) -> &str {
        &self.definition.id
    }

    pub fn definition(&self) -> &AgentDefinition {
        &self.definition
    }

    pub fn model(&self) -> String {
        self.definition
            .model
            .clone()
            .unwrap_or_else(|| self.provider.default_model().to_string())
    }

    fn memory_store(&self) -> Option<&MemoryStore> {
        self.memory.as_ref().filter(|_| self.definition.memory)
    }

    /// Run the agent over `messages` and return its final reply.
    pub async fn generate(
        &self,
        messages: Vec<Message>,
        options: &GenerateOptions,
    ) -> Result<AgentOutput, AgentError> {
        if messages.is_empty() {
            return Err(AgentError::EmptyInput);
        }

        let model = self.model();
        let resource_id = options
            .resource_id
            .clone()
            .unwrap_or_else(|| self.definition.id.clone());

        let mut conversation = Vec::new();
        let mut fresh_from = 0;
        if let (Some(store), Some(thread)) = (self.memory_store(), options.thread_id.as_deref()) {
            let recalled = store
                .recent_messages(&resource_id, thread, self.memory_window)
                .await?;
            let recall = merge_recalled(recalled, &messages);
            tracing::debug!(
                "Recalled {} messages from thread {} ({} already in the request)",
                recall.kept.len() + recall.replayed,
                thread,
                recall.replayed
            );
            conversation.extend(recall.kept);
            fresh_from = recall.fresh_from;
        }
        conversation.extend(messages.iter().cloned());

        let tool_defs = if self.provider.supports_tools() {
            self.tools.definitions(&self.definition.tools)
        } else {
            Vec::new()
        };
        let ctx = ToolExecutionContext {
            agent_id: self.definition.id.clone(),
            thread_id: options.thread_id.clone(),
        };

        let mut steps = Vec::new();
        let mut usage = TokenUsage::default();
        let mut final_text = None;
        let mut last_text = String::new();

        for step in 0..self.definition.max_steps.max(1) {
            let mut request = LLMRequest::new(model.clone(), conversation.clone())
                .with_system(self.definition.instructions.clone())
                .with_tools(tool_defs.clone());
            request.temperature = self.temperature;
            request.max_tokens = self.max_tokens;

            let response = self.provider.complete(request).await?;
            usage.add(response.usage);

            let text = response.text();
            let calls: Vec<(String, String, Value)> = response
                .tool_uses()
                .into_iter()
                .map(|(id, name, input)| (id.to_string(), name.to_string(), input.clone()))
                .collect();

            if calls.is_empty() {
                steps.push(AgentStep {
                    text: text.clone(),
                    tool_calls: Vec::new(),
                });
                final_text = Some(text);
                break;
            }

            tracing::debug!(
                "Agent {} step {}: {} tool call(s)",
                self.definition.id,
                step + 1,
                calls.len()
            );

            conversation.push(Message {
                role: Role::Assistant,
                content: response.content,
            });

            let mut records = Vec::with_capacity(calls.len());
            let mut result_blocks = Vec::with_capacity(calls.len());
            for (id, name, input) in calls {
                let result = self.run_tool(&name, input.clone(), &ctx).await;
                result_blocks.push(ContentBlock::ToolResult {
                    tool_use_id: id.clone(),
                    content: result.output.clone(),
                    is_error: !result.success,
                });
                records.push(ToolCallRecord {
                    tool_call_id: id,
                    tool_name: name,
                    args: input,
                    result: result.to_value(),
                    is_error: !result.success,
                });
            }
            conversation.push(Message {
                role: Role::User,
                content: result_blocks,
            });

            if !text.is_empty() {
                last_text = text.clone();
            }
            steps.push(AgentStep {
                text,
                tool_calls: records,
            });
        }

        let text = final_text.unwrap_or_else(|| {
            tracing::warn!(
                "Agent {} hit the step limit ({}) before a final answer",
                self.definition.id,
                self.definition.max_steps
            );
            last_text
        });

        if let (Some(store), Some(thread)) = (self.memory_store(), options.thread_id.as_deref()) {
            let mut turn: Vec<(Role, String)> = messages[fresh_from..]
                .iter()
                .filter(|m| m.role == Role::User)
                .map(|m| (m.role, m.text()))
                .collect();
            if !text.is_empty() {
                turn.push((Role::Assistant, text.clone()));
            }
            store.append_messages(&resource_id, thread, &turn).await?;
        }

        let cost_usd = self
            .provider
            .calculate_cost(&model, usage.input_tokens, usage.output_tokens);

        let mut output = AgentOutput {
            text,
            model,
            steps,
            usage,
            cost_usd,
            scores: Vec::new(),
        };
        output.scores = self.run_scorers(&messages, &output).await;

        tracing::info!(
            "Agent {} answered: {} steps, {} in / {} out tokens",
            self.definition.id,
            output.steps.len(),
            output.usage.input_tokens,
            output.usage.output_tokens
        );

        Ok(output)
    }

    async fn run_tool(&self, name: &str, input: Value, ctx: &ToolExecutionContext) -> ToolResult {
        if !self.definition.tools.iter().any(|t| t == name) {
            tracing::warn!("Agent {} requested unavailable tool '{}'", self.definition.id, name);
            return ToolResult::error(format!("Tool '{}' is not available to this agent", name));
        }

        match self.tools.execute(name, input, ctx).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!("Tool '{}' failed: {}", name, e);
                ToolResult::error(e.to_string())
            }
        }
    }

    async fn run_scorers(&self, messages: &[Message], output: &AgentOutput) -> Vec<ScoreResult> {
        if self.scorers.is_empty() {
            return Vec::new();
        }

        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(Message::text)
            .unwrap_or_default();
        let tool_calls: Vec<ToolCallRecord> = output.tool_results().cloned().collect();
        let input = ScorerInput {
            input: &last_user,
            output: &output.text,
            tool_calls: &tool_calls,
        };

        let mut results = Vec::with_capacity(self.scorers.len());
        for scorer in &self.scorers {
            match scorer.score(&input).await {
                Ok(score) => {
                    tracing::info!(
                        agent = %self.definition.id,
                        scorer = %score.scorer,
                        score = score.score,
                        "{}",
                        score.reason
                    );
                    results.push(score);
                }
                Err(e) => tracing::warn!("Scorer {} skipped: {}", scorer.name(), e),
            }
        }
        results
    }
}

/// Recalled history after removing what the caller already re-sent.
#[derive(Debug)]
struct Recall {
    kept: Vec<Message>,
    replayed: usize,
    /// Inbound messages before this index are history the caller replayed.
    fresh_from: usize,
}

/// Drop recalled messages that reappear in `inbound` with the same role and
/// text. Each inbound message cancels at most one recalled message. Inbound
/// messages up to the last cancelled one count as replayed history.
fn merge_recalled(recalled: Vec<StoredMessage>, inbound: &[Message]) -> Recall {
    let inbound_keys: Vec<(Role, String)> = inbound.iter().map(|m| (m.role, m.text())).collect();
    let mut used = vec![false; inbound.len()];
    let mut kept = Vec::new();
    let mut replayed = 0;
    let mut fresh_from = 0;

    for stored in recalled {
        let hit = inbound_keys
            .iter()
            .enumerate()
            .position(|(i, (role, text))| !used[i] && *role == stored.role && *text == stored.content);
        match hit {
            Some(i) => {
                used[i] = true;
                replayed += 1;
                fresh_from = fresh_from.max(i + 1);
            }
            None => kept.push(Message {
                role: stored.role,
                content: vec![ContentBlock::Text {
                    text: stored.content,
                }],
            }),
        }
    }

    Recall {
        kept,
        replayed,
        fresh_from,
    }
}
