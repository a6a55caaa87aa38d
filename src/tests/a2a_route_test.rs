//! A2A Route Tests
//!
//! Drives the axum router end to end: JSON-RPC envelope validation, the
//! agent tool loop against a mocked search API, task bookkeeping, loose
//! inbound message shapes and memory threading by `contextId`.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use rstest::rstest;
use serde_json::{Value, json};
use tower::ServiceExt;

use crate::a2a::handler::NO_MESSAGE_PLACEHOLDER;
use crate::a2a::server::{A2aState, build_router};
use crate::brain::agent::test_support::ScriptedProvider;
use crate::brain::provider::{Provider, Role};
use crate::brain::{self, AgentRegistry};
use crate::config::Config;
use crate::memory::MemoryStore;

const SOURCE_URL: &str = "https://blog.rust-lang.org/2024/07/25/Rust-1.80.0.html";

struct Harness {
    app: Router,
    provider: Arc<ScriptedProvider>,
    search: mockito::ServerGuard,
}

async fn harness(provider: ScriptedProvider, production: bool) -> Harness {
    let search = mockito::Server::new_async().await;
    let cfg = Config::from_toml_str(&format!(
        r#"
        [search]
        base_url = "{}"
        api_key = "exa-test"

        [[agents]]
        id = "chatAgent"
        name = "Chat Agent"
        instructions = "Chat without tools."
        "#,
        search.url()
    ))
    .expect("config");

    let provider = Arc::new(provider);
    let tools = brain::build_tools(&cfg).expect("tools");
    let memory = MemoryStore::in_memory().await.expect("memory");
    let agents = AgentRegistry::from_config(
        &cfg,
        provider.clone() as Arc<dyn Provider>,
        &tools,
        Some(memory),
    );

    Harness {
        app: build_router(A2aState::new(agents, "http://localhost:4111", production)),
        provider,
        search,
    }
}

async fn post(app: &Router, agent_id: &str, body: impl Into<Body>) -> (StatusCode, Value) {
    let req = Request::builder()
        .method("POST")
        .uri(format!("/a2a/agent/{agent_id}"))
        .header("content-type", "application/json")
        .body(body.into())
        .expect("request");

    let resp = app.clone().oneshot(req).await.expect("response");
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body");
    (status, serde_json::from_slice(&bytes).expect("json body"))
}

fn send(id: Value, params: Value) -> String {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "message/send",
        "params": params,
    })
    .to_string()
}

fn text_message(text: &str) -> Value {
    json!({"role": "user", "parts": [{"kind": "text", "text": text}]})
}

#[tokio::test]
async fn test_send_runs_tool_loop_and_returns_task() {
    let mut h = harness(
        ScriptedProvider::new()
            .tool_call("call_1", "web_search", json!({"query": "rust 1.80 release"}))
            .text(&format!("Rust 1.80 stabilised LazyLock. Source: {SOURCE_URL}")),
        false,
    )
    .await;

    let search_mock = h
        .search
        .mock("POST", "/search")
        .match_header("x-api-key", "exa-test")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "results": [{
                    "title": "Announcing Rust 1.80.0",
                    "url": SOURCE_URL,
                    "text": "LazyCell and LazyLock are now stable."
                }]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let body = send(
        json!("req-1"),
        json!({
            "message": {
                "role": "user",
                "messageId": "m-1",
                "parts": [{"kind": "text", "text": "What's new in Rust 1.80?"}]
            },
            "metadata": {"client": "route-test"}
        }),
    );
    let (status, resp) = post(&h.app, "searchAgent", body).await;

    search_mock.assert_async().await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp["jsonrpc"], "2.0");
    assert_eq!(resp["id"], "req-1");

    let task = &resp["result"];
    assert_eq!(task["kind"], "task");
    assert_eq!(task["status"]["state"], "completed");
    assert!(task["status"]["timestamp"].is_string());
    let reply = task["status"]["message"]["parts"][0]["text"]
        .as_str()
        .expect("reply text");
    assert!(reply.contains("LazyLock"));
    assert_eq!(task["status"]["message"]["role"], "agent");

    let artifacts = task["artifacts"].as_array().expect("artifacts");
    assert_eq!(artifacts.len(), 2);
    assert_eq!(artifacts[0]["name"], "response");
    assert_eq!(artifacts[0]["parts"][0]["text"], reply);
    assert_eq!(artifacts[1]["name"], "tool-result");
    let tool_data = &artifacts[1]["parts"][0]["data"];
    assert_eq!(tool_data["toolCallId"], "call_1");
    assert_eq!(tool_data["toolName"], "web_search");
    assert_eq!(tool_data["args"]["query"], "rust 1.80 release");
    assert_eq!(tool_data["result"]["results"][0]["url"], SOURCE_URL);

    let history = task["history"].as_array().expect("history");
    assert_eq!(history.len(), 3);
    assert_eq!(history[0]["messageId"], "m-1");
    assert_eq!(history[0]["parts"][0]["kind"], "text");
    assert_eq!(history[1]["role"], "agent");
    assert_eq!(history[1]["parts"][0]["data"]["type"], "tool-call");
    assert_eq!(history[1]["parts"][1]["data"]["type"], "tool-result");
    assert_eq!(history[2]["parts"][0]["text"], reply);

    let meta = &task["metadata"];
    assert_eq!(meta["client"], "route-test");
    assert_eq!(meta["agentId"], "searchAgent");
    assert_eq!(meta["usage"]["inputTokens"], 20);
    assert_eq!(meta["usage"]["outputTokens"], 10);
    assert_eq!(meta["usage"]["costUsd"], 0.03);
    let scores = meta["scores"].as_array().expect("scores");
    assert_eq!(scores.len(), 3);
    assert!(
        scores
            .iter()
            .all(|s| s["score"].as_f64().is_some_and(|v| (0.0..=1.0).contains(&v)))
    );
    assert_eq!(h.provider.request_count(), 2);
}

#[tokio::test]
async fn test_tasks_get_and_cancel() {
    let h = harness(ScriptedProvider::new().text("Stored answer."), false).await;

    let (_, sent) = post(
        &h.app,
        "searchAgent",
        send(json!(1), json!({"message": text_message("remember this task")})),
    )
    .await;
    let task_id = sent["result"]["id"].as_str().expect("task id").to_string();

    let get = json!({"jsonrpc": "2.0", "id": 2, "method": "tasks/get", "params": {"id": task_id}});
    let (status, fetched) = post(&h.app, "searchAgent", get.to_string()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["id"], 2);
    assert_eq!(fetched["result"]["id"], task_id.as_str());
    assert_eq!(
        fetched["result"]["status"]["message"]["parts"][0]["text"],
        "Stored answer."
    );

    let cancel =
        json!({"jsonrpc": "2.0", "id": 3, "method": "tasks/cancel", "params": {"id": task_id}});
    let (status, canceled) = post(&h.app, "searchAgent", cancel.to_string()).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(canceled["error"]["code"], -32002);

    let missing =
        json!({"jsonrpc": "2.0", "id": 4, "method": "tasks/get", "params": {"id": "nope"}});
    let (status, not_found) = post(&h.app, "searchAgent", missing.to_string()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(not_found["error"]["code"], -32001);

    // Only the agent call made the model work
    assert_eq!(h.provider.request_count(), 1);
}

#[rstest]
#[case::empty("")]
#[case::empty_object("{}")]
#[case::not_json("{not json")]
#[case::array("[1, 2, 3]")]
#[tokio::test]
async fn test_empty_or_malformed_body_gets_placeholder(#[case] body: &'static str) {
    let h = harness(ScriptedProvider::new(), false).await;

    let (status, resp) = post(&h.app, "searchAgent", body).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp["id"], Value::Null);
    assert!(resp.get("error").is_none());
    assert_eq!(
        resp["result"]["status"]["message"]["parts"][0]["text"],
        NO_MESSAGE_PLACEHOLDER
    );
    assert_eq!(h.provider.request_count(), 0);
}

#[rstest]
#[case::wrong_version(
    "searchAgent",
    json!({"jsonrpc": "1.0", "id": 1, "params": {"message": text_message("hi")}}),
    400,
    -32600
)]
#[case::missing_id(
    "searchAgent",
    json!({"jsonrpc": "2.0", "params": {"message": text_message("hi")}}),
    400,
    -32600
)]
#[case::null_id(
    "searchAgent",
    json!({"jsonrpc": "2.0", "id": null, "params": {"message": text_message("hi")}}),
    400,
    -32600
)]
#[case::unknown_agent(
    "ghostAgent",
    json!({"jsonrpc": "2.0", "id": 1, "params": {"message": text_message("hi")}}),
    404,
    -32602
)]
#[case::missing_params("searchAgent", json!({"jsonrpc": "2.0", "id": 1}), 400, -32602)]
#[case::params_not_object(
    "searchAgent",
    json!({"jsonrpc": "2.0", "id": 1, "params": "hello"}),
    400,
    -32602
)]
#[case::no_text(
    "searchAgent",
    json!({"jsonrpc": "2.0", "id": 1, "params": {"message": {"role": "user", "parts": []}}}),
    400,
    -32602
)]
#[tokio::test]
async fn test_validation_errors(
    #[case] agent_id: &str,
    #[case] body: Value,
    #[case] status: u16,
    #[case] code: i64,
) {
    let h = harness(ScriptedProvider::new().text("unused"), false).await;

    let (actual, resp) = post(&h.app, agent_id, body.to_string()).await;

    assert_eq!(actual.as_u16(), status);
    assert_eq!(resp["jsonrpc"], "2.0");
    assert_eq!(resp["error"]["code"], code);
    assert!(resp["error"]["message"].is_string());
    assert!(resp.get("result").is_none());
    assert_eq!(resp["id"], body.get("id").cloned().unwrap_or(Value::Null));
    assert_eq!(h.provider.request_count(), 0);
}

#[rstest]
#[case::development(false)]
#[case::production(true)]
#[tokio::test]
async fn test_agent_failure_is_internal_error(#[case] production: bool) {
    let h = harness(ScriptedProvider::new().failure("upstream timeout"), production).await;

    let (status, resp) = post(
        &h.app,
        "searchAgent",
        send(json!(7), json!({"message": text_message("will fail")})),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(resp["id"], 7);
    assert_eq!(resp["error"]["code"], -32603);
    if production {
        assert!(resp["error"].get("data").is_none());
    } else {
        let stack = resp["error"]["data"]["stack"].as_str().expect("stack");
        assert!(stack.contains("upstream timeout"));
        assert!(stack.contains("caused by"));
    }
}

#[tokio::test]
async fn test_ids_resolve_from_params_then_last_message() {
    let h = harness(
        ScriptedProvider::new().text("first").text("second"),
        false,
    )
    .await;

    let (_, explicit) = post(
        &h.app,
        "searchAgent",
        send(
            json!(1),
            json!({
                "taskId": "task-A",
                "contextId": "ctx-A",
                "message": {
                    "role": "user",
                    "taskId": "ignored",
                    "parts": [{"kind": "text", "text": "hello"}]
                }
            }),
        ),
    )
    .await;
    assert_eq!(explicit["result"]["id"], "task-A");
    assert_eq!(explicit["result"]["contextId"], "ctx-A");

    let (_, from_message) = post(
        &h.app,
        "searchAgent",
        send(
            json!(2),
            json!({
                "messages": [
                    {"role": "user", "contextId": "ctx-old", "parts": [{"kind": "text", "text": "earlier question"}]},
                    {"role": "agent", "content": "earlier answer"}
                ],
                "message": {
                    "role": "user",
                    "taskId": "task-B",
                    "contextId": "ctx-B",
                    "parts": [{"text": "follow-up"}]
                }
            }),
        ),
    )
    .await;
    assert_eq!(from_message["result"]["id"], "task-B");
    assert_eq!(from_message["result"]["contextId"], "ctx-B");
    assert_eq!(
        from_message["result"]["history"][1]["role"],
        "agent",
        "inbound agent messages keep their role"
    );

    let requests = h.provider.requests.lock().expect("lock");
    let sent = &requests[1].messages;
    let roles: Vec<Role> = sent.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User]);
    assert_eq!(sent[1].text(), "earlier answer");
}

#[tokio::test]
async fn test_context_id_threads_memory() {
    let h = harness(
        ScriptedProvider::new()
            .text("Noted, you live in Oslo.")
            .text("You live in Oslo."),
        false,
    )
    .await;

    for (id, text) in [(1, "I live in Oslo."), (2, "Where do I live?")] {
        let (status, _) = post(
            &h.app,
            "searchAgent",
            send(
                json!(id),
                json!({"contextId": "ctx-mem", "message": text_message(text)}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let requests = h.provider.requests.lock().expect("lock");
    let second = &requests[1].messages;
    assert_eq!(second.len(), 3);
    assert_eq!(second[0].text(), "I live in Oslo.");
    assert_eq!(second[1].text(), "Noted, you live in Oslo.");
    assert_eq!(second[2].text(), "Where do I live?");
}

#[tokio::test]
async fn test_history_data_part_becomes_context() {
    let h = harness(ScriptedProvider::new().text("About 700,000 people."), false).await;

    let (status, _) = post(
        &h.app,
        "searchAgent",
        send(
            json!("ctx"),
            json!({
                "message": {
                    "role": "user",
                    "parts": [
                        {"kind": "text", "text": "And its population?"},
                        {"kind": "data", "data": [
                            {"role": "user", "text": "Tell me about Oslo, the capital of Norway."},
                            {"role": "agent", "text": "<div class=\"widget\">rendered card</div>"},
                            {"role": "user", "text": "ok"}
                        ]}
                    ]
                }
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let requests = h.provider.requests.lock().expect("lock");
    assert_eq!(
        requests[0].messages[0].text(),
        "And its population?\nTell me about Oslo, the capital of Norway."
    );
}

fn prompts(provider: &ScriptedProvider, request: usize) -> Vec<String> {
    let requests = provider.requests.lock().expect("lock");
    requests[request].messages.iter().map(|m| m.text()).collect()
}

#[rstest]
#[case::null_parts_with_content(
    json!({"message": {"role": "user", "parts": null, "content": "hello there"}}),
    vec!["hello there"]
)]
#[case::content_blocks_in_history(
    json!({
        "messages": [{"role": "user", "content": [{"type": "text", "text": "earlier question"}]}],
        "message": text_message("next question")
    }),
    vec!["earlier question", "next question"]
)]
#[case::type_alias_and_null_fields(
    json!({
        "contextId": null,
        "taskId": 12,
        "message": {
            "role": null,
            "messageId": 5,
            "parts": [{"type": "text", "text": "typed part"}, null, "stray"]
        }
    }),
    vec!["typed part"]
)]
#[case::mixed_data_array(
    json!({"message": {"role": "user", "parts": [
        {"kind": "text", "text": "compare"},
        {"kind": "data", "data": [{"text": "an entry long enough to count"}, 42]}
    ]}}),
    vec!["compare\n[{\"text\":\"an entry long enough to count\"},42]"]
)]
#[tokio::test]
async fn test_loose_inbound_shapes_are_accepted(
    #[case] params: Value,
    #[case] expected: Vec<&'static str>,
) {
    let h = harness(ScriptedProvider::new().text("ok"), false).await;

    let (status, resp) = post(&h.app, "searchAgent", send(json!(1), params)).await;

    assert_eq!(status, StatusCode::OK, "{resp}");
    assert_eq!(resp["result"]["status"]["state"], "completed");
    assert_eq!(prompts(&h.provider, 0), expected);
}

#[tokio::test]
async fn test_numeric_task_id_is_used_as_text() {
    let h = harness(ScriptedProvider::new().text("ok"), false).await;

    let (status, resp) = post(
        &h.app,
        "searchAgent",
        send(json!(1), json!({"taskId": 12, "message": text_message("hi")})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp["result"]["id"], "12");
}

#[tokio::test]
async fn test_textless_history_entries_are_dropped() {
    let h = harness(ScriptedProvider::new().text("ok"), false).await;

    let (status, resp) = post(
        &h.app,
        "searchAgent",
        send(
            json!(1),
            json!({
                "messages": [
                    {"role": "user", "parts": []},
                    {"role": "agent", "parts": [{"kind": "file", "file": {"uri": "file:///x"}}]},
                    {"role": "user", "content": "   "},
                    {"role": "agent", "content": "kept answer"}
                ],
                "message": text_message("question")
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(prompts(&h.provider, 0), vec!["kept answer", "question"]);
    let history = resp["result"]["history"].as_array().expect("history");
    assert_eq!(history.len(), 3);
    assert_eq!(history[0]["role"], "agent");
}

#[tokio::test]
async fn test_tasks_are_scoped_to_their_agent() {
    let h = harness(ScriptedProvider::new().text("search answer"), false).await;

    let (_, sent) = post(
        &h.app,
        "searchAgent",
        send(json!(1), json!({"message": text_message("owned by search")})),
    )
    .await;
    let task_id = sent["result"]["id"].as_str().expect("task id").to_string();

    for method in ["tasks/get", "tasks/cancel"] {
        let body = json!({"jsonrpc": "2.0", "id": 2, "method": method, "params": {"id": task_id}});
        let (status, resp) = post(&h.app, "chatAgent", body.to_string()).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{method}");
        assert_eq!(resp["error"]["code"], -32001, "{method}");
    }

    let own = json!({"jsonrpc": "2.0", "id": 3, "method": "tasks/get", "params": {"id": task_id}});
    let (status, resp) = post(&h.app, "searchAgent", own.to_string()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp["result"]["id"], task_id.as_str());
}

#[tokio::test]
async fn test_resent_history_is_not_stored_twice() {
    let h = harness(
        ScriptedProvider::new()
            .text("Hi Ada.")
            .text("You are Ada.")
            .text("Still Ada."),
        false,
    )
    .await;

    let turns = [
        json!({"contextId": "ctx-ada", "message": text_message("I am Ada")}),
        json!({
            "contextId": "ctx-ada",
            "messages": [
                text_message("I am Ada"),
                {"role": "agent", "parts": [{"kind": "text", "text": "Hi Ada."}]}
            ],
            "message": text_message("Who am I?")
        }),
        json!({"contextId": "ctx-ada", "message": text_message("And now?")}),
    ];
    for (id, params) in turns.into_iter().enumerate() {
        let (status, _) = post(&h.app, "searchAgent", send(json!(id), params)).await;
        assert_eq!(status, StatusCode::OK);
    }

    assert_eq!(
        prompts(&h.provider, 1),
        vec!["I am Ada", "Hi Ada.", "Who am I?"]
    );
    assert_eq!(
        prompts(&h.provider, 2),
        vec!["I am Ada", "Hi Ada.", "Who am I?", "You are Ada.", "And now?"]
    );
}

#[tokio::test]
async fn test_agents_do_not_share_memory_threads() {
    let h = harness(
        ScriptedProvider::new()
            .text("Noted, you live in Oslo.")
            .text("I don't know where you live."),
        false,
    )
    .await;

    let (status, _) = post(
        &h.app,
        "searchAgent",
        send(json!(1), json!({"contextId": "shared", "message": text_message("I live in Oslo.")})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = post(
        &h.app,
        "chatAgent",
        send(json!(2), json!({"contextId": "shared", "message": text_message("Where do I live?")})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(prompts(&h.provider, 1), vec!["Where do I live?"]);
}
