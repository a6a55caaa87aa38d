//! Agent registry: resolves A2A `agentId`s to runnable agents.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::brain::agent::{Agent, AgentDefinition};
use crate::brain::provider::Provider;
use crate::brain::scorers;
use crate::brain::tools::ToolRegistry;
use crate::config::Config;
use crate::memory::MemoryStore;

#[derive(Clone, Default)]
pub struct AgentRegistry {
    agents: BTreeMap<String, Arc<Agent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the built-in agents plus those declared in `cfg.agents`.
    ///
    /// A configured agent replaces a built-in one with the same id. Unknown
    /// tool and scorer names are dropped with a warning.
    pub fn from_config(
        cfg: &Config,
        provider: Arc<dyn Provider>,
        tools: &ToolRegistry,
        memory: Option<MemoryStore>,
    ) -> Self {
        let mut definitions: BTreeMap<String, AgentDefinition> = BTreeMap::new();
        let builtin = AgentDefinition::search_agent();
        definitions.insert(builtin.id.clone(), builtin);
        for def in &cfg.agents {
            definitions.insert(def.id.clone(), def.clone());
        }

        let mut registry = Self::new();
        for (_, mut def) in definitions {
            def.tools.retain(|name| {
                let known = tools.contains(name);
                if !known {
                    tracing::warn!("Agent {}: unknown tool '{}' ignored", def.id, name);
                }
                known
            });

            let model = def
                .model
                .clone()
                .unwrap_or_else(|| cfg.llm.model.clone());
            let agent_scorers = def
                .scorers
                .iter()
                .filter_map(|name| {
                    let scorer = scorers::build_scorer(name, provider.clone(), &model);
                    if scorer.is_none() {
                        tracing::warn!("Agent {}: unknown scorer '{}' ignored", def.id, name);
                    }
                    scorer
                })
                .collect();

            let mut agent = Agent::new(def, provider.clone(), tools.clone())
                .with_scorers(agent_scorers)
                .with_sampling(cfg.llm.temperature, cfg.llm.max_tokens);
            if let Some(store) = memory.clone() {
                agent = agent.with_memory(store, cfg.memory.last_messages);
            }
            registry.insert(agent);
        }

        registry
    }

    pub fn insert(&mut self, agent: Agent) {
        self.agents.insert(agent.id().to_string(), Arc::new(agent));
    }

    pub fn get(&self, id: &str) -> Option<Arc<Agent>> {
        self.agents.get(id).cloned()
    }

    pub fn ids(&self) -> Vec<String> {
        self.agents.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Agent>> {
        self.agents.values()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
