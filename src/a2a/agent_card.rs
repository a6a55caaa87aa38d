//! Agent Card generation for `/.well-known/{agent_id}/agent.json`.
//!
//! One card per registered agent. Skills are derived from the agent's
//! tools, plus a general question-answering skill from its description.

use crate::a2a::types::*;
use crate::brain::Agent;
use crate::brain::tools::web_search;

fn modes(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

fn tool_skill(tool: &str) -> AgentSkill {
    match tool {
        web_search::TOOL_NAME => AgentSkill {
            id: "web-search".to_string(),
            name: "Web Search".to_string(),
            description: Some(
                "Searches the web for current information and cites the sources it used."
                    .to_string(),
            ),
            tags: modes(&["search", "web", "research"]),
            examples: vec!["What changed in the latest stable Rust release?".to_string()],
            input_modes: modes(&["text/plain"]),
            output_modes: modes(&["text/plain", "application/json"]),
        },
        other => AgentSkill {
            id: other.replace('_', "-"),
            name: other.to_string(),
            description: None,
            tags: vec![other.to_string()],
            examples: vec![],
            input_modes: modes(&["text/plain"]),
            output_modes: modes(&["text/plain"]),
        },
    }
}

/// Build the card for `agent`, advertised under `base_url`.
pub fn build_agent_card(agent: &Agent, base_url: &str) -> AgentCard {
    let def = agent.definition();
    let base_url = base_url.trim_end_matches('/');

    let mut skills = vec![AgentSkill {
        id: "answer".to_string(),
        name: def.name.clone(),
        description: Some(def.description.clone()).filter(|d| !d.is_empty()),
        tags: vec!["qa".to_string()],
        examples: vec![],
        input_modes: modes(&["text/plain", "application/json"]),
        output_modes: modes(&["text/plain"]),
    }];
    skills.extend(def.tools.iter().map(|t| tool_skill(t)));

    AgentCard {
        name: def.name.clone(),
        description: Some(def.description.clone()).filter(|d| !d.is_empty()),
        version: Some(crate::VERSION.to_string()),
        supported_interfaces: vec![SupportedInterface {
            url: format!("{}/a2a/agent/{}", base_url, def.id),
            protocol_binding: "JSONRPC".to_string(),
            protocol_version: Some("1.0".to_string()),
        }],
        provider: Some(AgentProvider {
            organization: "searchcrabs".to_string(),
            url: None,
        }),
        capabilities: Some(AgentCapabilities {
            streaming: false,
            push_notifications: false,
            state_transition_history: true,
        }),
        skills,
        default_input_modes: modes(&["text/plain", "application/json"]),
        default_output_modes: modes(&["text/plain", "application/json"]),
    }
}
