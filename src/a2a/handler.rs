//! JSON-RPC 2.0 handler for the per-agent A2A route.
//!
//! Validates the envelope, resolves the agent and dispatches:
//! - `tasks/get`    → stored task by id
//! - `tasks/cancel` → always refused, tasks are terminal once returned
//! - anything else  → flatten the inbound messages, run the agent, build a task

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::{Map, Value, json};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::a2a::flatten::{self, ResolvedMessage};
use crate::a2a::server::A2aState;
use crate::a2a::types::*;
use crate::brain::provider::{self, Role as LlmRole};
use crate::brain::{Agent, AgentError, AgentOutput, GenerateOptions};
use crate::utils::truncate_with_ellipsis;

/// Reply text used when the request body carries nothing at all.
pub const NO_MESSAGE_PLACEHOLDER: &str = "No message provided";

/// Oldest tasks are evicted past this many.
const MAX_STORED_TASKS: usize = 1024;

#[derive(Debug, Clone)]
struct StoredTask {
    agent_id: String,
    task: Task,
}

/// Completed tasks, kept in memory for `tasks/get`.
#[derive(Debug, Default)]
pub struct TaskTable {
    tasks: HashMap<String, StoredTask>,
    order: VecDeque<String>,
}

impl TaskTable {
    fn insert(&mut self, agent_id: &str, task: Task) {
        let id = task.id.clone();
        let previous = self.tasks.insert(
            id.clone(),
            StoredTask {
                agent_id: agent_id.to_string(),
                task,
            },
        );
        if previous.is_none() {
            self.order.push_back(id);
        }
        while self.order.len() > MAX_STORED_TASKS {
            if let Some(oldest) = self.order.pop_front() {
                self.tasks.remove(&oldest);
            }
        }
    }

    fn get(&self, agent_id: &str, task_id: &str) -> Option<&Task> {
        self.tasks
            .get(task_id)
            .filter(|stored| stored.agent_id == agent_id)
            .map(|stored| &stored.task)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

pub type TaskStore = Arc<RwLock<TaskTable>>;

pub fn new_task_store() -> TaskStore {
    Arc::new(RwLock::new(TaskTable::default()))
}

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("{0}")]
    InvalidParams(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Task {0} is already completed and cannot be canceled")]
    TaskNotCancelable(String),

    #[error("Agent invocation failed: {0}")]
    Agent(#[from] AgentError),

    #[error("Failed to encode task: {0}")]
    Encode(#[from] serde_json::Error),
}

impl RequestError {
    pub fn code(&self) -> i32 {
        match self {
            RequestError::InvalidRequest(_) => error_codes::INVALID_REQUEST,
            RequestError::AgentNotFound(_) | RequestError::InvalidParams(_) => {
                error_codes::INVALID_PARAMS
            }
            RequestError::TaskNotFound(_) => error_codes::TASK_NOT_FOUND,
            RequestError::TaskNotCancelable(_) => error_codes::TASK_NOT_CANCELABLE,
            RequestError::Agent(_) | RequestError::Encode(_) => error_codes::INTERNAL_ERROR,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            RequestError::InvalidRequest(_) | RequestError::InvalidParams(_) => {
                StatusCode::BAD_REQUEST
            }
            RequestError::AgentNotFound(_) | RequestError::TaskNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            RequestError::TaskNotCancelable(_) => StatusCode::CONFLICT,
            RequestError::Agent(_) | RequestError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn is_internal(&self) -> bool {
        self.code() == error_codes::INTERNAL_ERROR
    }
}

/// Handle one POST to `/a2a/agent/{agent_id}`.
pub async fn handle_request(
    state: &A2aState,
    agent_id: &str,
    body: &[u8],
) -> (StatusCode, JsonRpcResponse) {
    let request = parse_body(body);
    if request.is_empty() {
        tracing::debug!("A2A: empty request for agent {}", agent_id);
        return (StatusCode::OK, placeholder_response(agent_id));
    }

    let id = request.get("id").cloned().unwrap_or(Value::Null);
    match process(state, agent_id, &request).await {
        Ok(result) => (StatusCode::OK, JsonRpcResponse::success(id, result)),
        Err(err) => {
            if err.is_internal() {
                tracing::error!("A2A: agent {} request failed: {:?}", agent_id, err);
            } else {
                tracing::warn!("A2A: rejected request for agent {}: {}", agent_id, err);
            }
            let data = (err.is_internal() && !state.production)
                .then(|| json!({ "stack": error_chain(&err) }));
            (
                err.status(),
                JsonRpcResponse::error_with_data(id, err.code(), err.to_string(), data),
            )
        }
    }
}

/// Anything that is not a JSON object counts as an empty request.
fn parse_body(body: &[u8]) -> Map<String, Value> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

async fn process(
    state: &A2aState,
    agent_id: &str,
    request: &Map<String, Value>,
) -> Result<Value, RequestError> {
    if request.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
        return Err(RequestError::InvalidRequest(
            "Invalid JSON-RPC version, expected 2.0".to_string(),
        ));
    }

    match request.get("id") {
        None | Some(Value::Null) => {
            return Err(RequestError::InvalidRequest("Missing request id".to_string()));
        }
        Some(Value::String(_)) | Some(Value::Number(_)) => {}
        Some(_) => {
            return Err(RequestError::InvalidRequest(
                "Request id must be a string or a number".to_string(),
            ));
        }
    }

    let agent = state
        .agents
        .get(agent_id)
        .ok_or_else(|| RequestError::AgentNotFound(agent_id.to_string()))?;

    let params = request
        .get("params")
        .filter(|p| p.is_object())
        .ok_or_else(|| RequestError::InvalidParams("Missing params".to_string()))?;

    let method = request.get("method").and_then(Value::as_str).unwrap_or("");
    match method {
        "tasks/get" => get_task(state, agent_id, params).await,
        "tasks/cancel" => cancel_task(state, agent_id, params).await,
        _ => send_message(state, &agent, params).await,
    }
}

fn task_id_param(params: &Value) -> Result<String, RequestError> {
    serde_json::from_value::<TaskIdParams>(params.clone())
        .map(|p| p.id)
        .map_err(|e| RequestError::InvalidParams(format!("Invalid params: {}", e)))
}

async fn get_task(state: &A2aState, agent_id: &str, params: &Value) -> Result<Value, RequestError> {
    let task_id = task_id_param(params)?;
    let tasks = state.task_store.read().await;
    let task = tasks
        .get(agent_id, &task_id)
        .ok_or(RequestError::TaskNotFound(task_id))?;
    Ok(serde_json::to_value(task)?)
}

/// Stored tasks are always completed, so a known id can never be canceled.
async fn cancel_task(
    state: &A2aState,
    agent_id: &str,
    params: &Value,
) -> Result<Value, RequestError> {
    let task_id = task_id_param(params)?;
    let tasks = state.task_store.read().await;
    match tasks.get(agent_id, &task_id) {
        Some(_) => Err(RequestError::TaskNotCancelable(task_id)),
        None => Err(RequestError::TaskNotFound(task_id)),
    }
}

async fn send_message(
    state: &A2aState,
    agent: &Agent,
    params: &Value,
) -> Result<Value, RequestError> {
    let params: SendMessageParams = serde_json::from_value(params.clone())
        .map_err(|e| RequestError::InvalidParams(format!("Invalid params: {}", e)))?;

    let inbound: Vec<&InboundMessage> = params
        .messages
        .iter()
        .chain(params.message.iter())
        .collect();
    let resolved = flatten::resolve_messages(inbound.iter().copied());
    if resolved.is_empty() {
        return Err(RequestError::InvalidParams(
            "No message text found in params".to_string(),
        ));
    }

    let last = inbound.last();
    let task_id = params
        .task_id
        .clone()
        .or_else(|| last.and_then(|m| m.task_id.clone()))
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let context_id = params
        .context_id
        .clone()
        .or_else(|| last.and_then(|m| m.context_id.clone()))
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    if let Some(prompt) = resolved.last() {
        tracing::info!(
            "A2A: agent {} task {}: {}",
            agent.id(),
            task_id,
            truncate_with_ellipsis(&prompt.text, 100)
        );
    }

    let messages = resolved
        .iter()
        .map(|m| match m.role {
            LlmRole::User => provider::Message::user(m.text.clone()),
            LlmRole::Assistant => provider::Message::assistant(m.text.clone()),
        })
        .collect();
    let options = GenerateOptions {
        thread_id: Some(context_id.clone()),
        resource_id: Some(agent.id().to_string()),
    };
    let output = agent.generate(messages, &options).await?;

    let task = completed_task(
        &task_id,
        &context_id,
        &resolved,
        &output,
        agent.id(),
        params.metadata,
    );
    let result = serde_json::to_value(&task)?;

    state.task_store.write().await.insert(agent.id(), task);
    tracing::info!(
        "A2A: task {} completed ({} steps, {} in / {} out tokens)",
        task_id,
        output.steps.len(),
        output.usage.input_tokens,
        output.usage.output_tokens
    );

    Ok(result)
}

fn completed_task(
    task_id: &str,
    context_id: &str,
    inbound: &[ResolvedMessage],
    output: &AgentOutput,
    agent_id: &str,
    metadata: Option<Value>,
) -> Task {
    let mut history: Vec<Message> = inbound
        .iter()
        .map(|m| {
            let role = match m.role {
                LlmRole::User => Role::User,
                LlmRole::Assistant => Role::Agent,
            };
            Message::new(role, vec![Part::text(m.text.clone())], task_id, context_id)
                .with_id(m.message_id.as_deref())
        })
        .collect();

    for step in output.steps.iter().filter(|s| !s.tool_calls.is_empty()) {
        let mut parts = Vec::new();
        if !step.text.trim().is_empty() {
            parts.push(Part::text(step.text.clone()));
        }
        parts.extend(step.tool_calls.iter().map(|call| {
            Part::data(json!({
                "type": "tool-call",
                "toolCallId": call.tool_call_id,
                "toolName": call.tool_name,
                "args": call.args,
            }))
        }));
        parts.extend(step.tool_calls.iter().map(|call| {
            Part::data(json!({
                "type": "tool-result",
                "toolCallId": call.tool_call_id,
                "toolName": call.tool_name,
                "result": call.result,
                "isError": call.is_error,
            }))
        }));
        history.push(Message::new(Role::Agent, parts, task_id, context_id));
    }

    let reply = Message::new(
        Role::Agent,
        vec![Part::text(output.text.clone())],
        task_id,
        context_id,
    );
    history.push(reply.clone());

    let mut artifacts = vec![Artifact::new("response", vec![Part::text(output.text.clone())])];
    artifacts.extend(output.tool_results().map(|call| {
        Artifact::new(
            "tool-result",
            vec![Part::data(json!({
                "toolCallId": call.tool_call_id,
                "toolName": call.tool_name,
                "args": call.args,
                "result": call.result,
            }))],
        )
    }));

    let mut meta = match metadata {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    meta.insert("agentId".to_string(), json!(agent_id));
    meta.insert("model".to_string(), json!(output.model));
    meta.insert(
        "usage".to_string(),
        json!({
            "inputTokens": output.usage.input_tokens,
            "outputTokens": output.usage.output_tokens,
            "costUsd": output.cost_usd,
        }),
    );
    meta.insert("scores".to_string(), json!(output.scores));

    Task {
        kind: "task".to_string(),
        id: task_id.to_string(),
        context_id: context_id.to_string(),
        status: TaskStatus {
            state: TaskState::Completed,
            message: Some(reply),
            timestamp: Some(chrono::Utc::now().to_rfc3339()),
        },
        artifacts,
        history,
        metadata: Some(Value::Object(meta)),
    }
}

fn placeholder_response(agent_id: &str) -> JsonRpcResponse {
    let task_id = Uuid::new_v4().to_string();
    let context_id = Uuid::new_v4().to_string();
    let reply = Message::new(
        Role::Agent,
        vec![Part::text(NO_MESSAGE_PLACEHOLDER)],
        &task_id,
        &context_id,
    );

    let task = Task {
        kind: "task".to_string(),
        id: task_id,
        context_id,
        status: TaskStatus {
            state: TaskState::Completed,
            message: Some(reply.clone()),
            timestamp: Some(chrono::Utc::now().to_rfc3339()),
        },
        artifacts: vec![Artifact::new(
            "response",
            vec![Part::text(NO_MESSAGE_PLACEHOLDER)],
        )],
        history: vec![reply],
        metadata: Some(json!({ "agentId": agent_id })),
    };

    match serde_json::to_value(&task) {
        Ok(result) => JsonRpcResponse::success(Value::Null, result),
        Err(e) => JsonRpcResponse::error(
            Value::Null,
            error_codes::INTERNAL_ERROR,
            format!("Failed to encode task: {}", e),
        ),
    }
}

/// `err` and every `source()` below it, one per line.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut lines = vec![err.to_string()];
    let mut source = err.source();
    while let Some(cause) = source {
        lines.push(format!("caused by: {}", cause));
        source = cause.source();
    }
    lines.join("\n")
}
