//! A2A (Agent-to-Agent) route adapter.
//!
//! Exposes every registered agent over the A2A protocol:
//! - Agent Card discovery (`/.well-known/{agent_id}/agent.json`)
//! - JSON-RPC 2.0 endpoint per agent (`/a2a/agent/{agent_id}`)
//! - HTTP server (axum)

pub mod agent_card;
pub mod flatten;
pub mod handler;
pub mod server;
pub mod types;
