//! A2A HTTP server powered by axum.
//!
//! Serves:
//! - `POST /a2a/agent/{agent_id}`  JSON-RPC 2.0 endpoint per agent
//! - `GET  /.well-known/{agent_id}/agent.json`  Agent Card discovery
//! - `GET  /a2a/agents`  registered agents
//! - `GET  /a2a/health`  Health check

use crate::a2a::{agent_card, handler, types::*};
use crate::brain::AgentRegistry;
use axum::{
    Router,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared state for the A2A server.
#[derive(Clone)]
pub struct A2aState {
    pub agents: AgentRegistry,
    pub task_store: handler::TaskStore,
    /// Base URL advertised in agent cards.
    pub public_url: String,
    /// Hides error chains from clients.
    pub production: bool,
}

impl A2aState {
    pub fn new(agents: AgentRegistry, public_url: impl Into<String>, production: bool) -> Self {
        Self {
            agents,
            task_store: handler::new_task_store(),
            public_url: public_url.into(),
            production,
        }
    }
}

/// Build the axum router for the A2A server.
pub fn build_router(state: A2aState) -> Router {
    Router::new()
        .route("/a2a/agent/{agent_id}", post(handle_agent_request))
        .route("/.well-known/{agent_id}/agent.json", get(get_agent_card))
        .route("/a2a/agents", get(list_agents))
        .route("/a2a/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub struct ServerParams {
    pub bind: String,
    pub port: u16,
    pub production: bool,
}

/// Run the server until Ctrl-C.
pub async fn start_server(params: &ServerParams, agents: AgentRegistry) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", params.bind, params.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid server address: {}", e))?;

    let state = A2aState::new(agents, format!("http://{}", addr), params.production);
    let agent_ids = state.agents.ids();
    let app = build_router(state);

    tracing::info!("A2A server starting on http://{}", addr);
    for id in &agent_ids {
        tracing::info!("   {id}: http://{addr}/a2a/agent/{id}");
    }
    if params.production {
        tracing::info!("   production mode: error details hidden from clients");
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("A2A server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

/// POST /a2a/agent/{agent_id}: JSON-RPC 2.0 endpoint.
///
/// The body is taken raw so malformed JSON reaches the handler instead of
/// being rejected by the extractor.
async fn handle_agent_request(
    State(state): State<A2aState>,
    Path(agent_id): Path<String>,
    body: Bytes,
) -> (StatusCode, Json<JsonRpcResponse>) {
    let (status, response) = handler::handle_request(&state, &agent_id, &body).await;
    (status, Json(response))
}

/// GET /.well-known/{agent_id}/agent.json: Agent Card discovery.
async fn get_agent_card(
    State(state): State<A2aState>,
    Path(agent_id): Path<String>,
) -> Result<Json<AgentCard>, (StatusCode, Json<serde_json::Value>)> {
    match state.agents.get(&agent_id) {
        Some(agent) => Ok(Json(agent_card::build_agent_card(&agent, &state.public_url))),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("Agent not found: {}", agent_id) })),
        )),
    }
}

/// GET /a2a/agents: registered agents.
async fn list_agents(State(state): State<A2aState>) -> Json<serde_json::Value> {
    let agents: Vec<serde_json::Value> = state
        .agents
        .iter()
        .map(|agent| {
            let def = agent.definition();
            serde_json::json!({
                "id": def.id,
                "name": def.name,
                "description": def.description,
                "tools": def.tools,
            })
        })
        .collect();
    Json(serde_json::json!({ "agents": agents }))
}

/// GET /a2a/health: Health check.
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": crate::VERSION,
        "protocol": "A2A",
    }))
}
