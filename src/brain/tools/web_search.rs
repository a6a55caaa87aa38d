//! Web Search Tool
//!
//! One outbound call to an Exa-style search API (`POST {base}/search`).
//! Input is validated before the request and the response is validated
//! entry by entry; every failure comes back as an error [`ToolResult`] so
//! the model can explain or rephrase.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::{Value, json};
use zeroize::Zeroizing;

use super::error::{Result, ToolError};
use super::r#trait::{Tool, ToolCapability, ToolExecutionContext, ToolResult};
use crate::config::SearchConfig;
use crate::utils::truncate_with_ellipsis;

pub const TOOL_NAME: &str = "web_search";

const MAX_QUERY_CHARS: usize = 500;
const MAX_RESULTS: u64 = 10;

pub struct WebSearchTool {
    client: Client,
    base_url: String,
    api_key: Option<Zeroizing<String>>,
    default_results: u32,
    max_characters: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
}

impl WebSearchTool {
    pub fn new(cfg: &SearchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .user_agent(concat!("searchcrabs/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ToolError::Execution(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone().filter(|k| !k.is_empty()),
            default_results: cfg.num_results.clamp(1, MAX_RESULTS as u32),
            max_characters: cfg.max_characters,
        })
    }

    /// Validated `(query, num_results)` or a message for the model.
    fn parse_input(&self, input: &Value) -> std::result::Result<(String, u32), String> {
        let query = match input.get("query") {
            Some(Value::String(q)) => q.trim().to_string(),
            Some(_) => return Err("'query' must be a string".to_string()),
            None => return Err("'query' is required".to_string()),
        };
        if query.is_empty() {
            return Err("'query' cannot be empty".to_string());
        }
        if query.chars().count() > MAX_QUERY_CHARS {
            return Err(format!(
                "'query' is too long (max {} characters)",
                MAX_QUERY_CHARS
            ));
        }

        let num_results = match input.get("num_results") {
            None | Some(Value::Null) => self.default_results,
            Some(v) => match v.as_u64() {
                Some(n) => n.clamp(1, MAX_RESULTS) as u32,
                None => return Err("'num_results' must be a positive integer".to_string()),
            },
        };

        Ok((query, num_results))
    }

    fn parse_hits(&self, body: &Value) -> std::result::Result<Vec<SearchHit>, String> {
        let results = body
            .get("results")
            .and_then(Value::as_array)
            .ok_or_else(|| "search response has no 'results' array".to_string())?;

        let hits = results
            .iter()
            .filter_map(|entry| {
                let url = entry
                    .get("url")
                    .and_then(Value::as_str)
                    .filter(|u| !u.trim().is_empty())?;
                let title = entry
                    .get("title")
                    .and_then(Value::as_str)
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or(url);
                let raw = ["text", "snippet", "summary"]
                    .iter()
                    .find_map(|k| entry.get(*k).and_then(Value::as_str))
                    .unwrap_or("");
                let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");

                Some(SearchHit {
                    title: title.trim().to_string(),
                    url: url.trim().to_string(),
                    snippet: truncate_with_ellipsis(&collapsed, self.max_characters),
                    published_date: entry
                        .get("publishedDate")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                })
            })
            .collect();

        Ok(hits)
    }

    async fn search(&self, api_key: &str, query: &str, num_results: u32) -> std::result::Result<Vec<SearchHit>, String> {
        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .header("x-api-key", api_key)
            .json(&json!({
                "query": query,
                "numResults": num_results,
                "contents": { "text": { "maxCharacters": self.max_characters } },
            }))
            .send()
            .await
            .map_err(|e| format!("search request failed: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!(
                "search provider returned HTTP {}: {}",
                status.as_u16(),
                truncate_with_ellipsis(&body, 300)
            ));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| format!("search response is not valid JSON: {e}"))?;

        self.parse_hits(&body)
    }
}

fn format_summary(query: &str, hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return format!("No results found for '{}'.", query);
    }

    let formatted = hits
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{}. **{}**\n   {}\n   URL: {}", i + 1, h.title, h.snippet, h.url))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!("Found {} results for '{}'\n\n{}", hits.len(), query, formatted)
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Search the web for current information. Returns titles, URLs and text \
         excerpts. Use it for recent events, facts you are unsure about, or \
         whenever the user asks for sources."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "num_results": {
                    "type": "integer",
                    "description": "Number of results to return (1-10)",
                    "minimum": 1,
                    "maximum": MAX_RESULTS
                }
            },
            "required": ["query"]
        })
    }

    fn capabilities(&self) -> Vec<ToolCapability> {
        vec![ToolCapability::Network]
    }

    fn requires_approval(&self) -> bool {
        false
    }

    async fn execute(&self, input: Value, context: &ToolExecutionContext) -> Result<ToolResult> {
        let (query, num_results) = match self.parse_input(&input) {
            Ok(parsed) => parsed,
            Err(msg) => return Ok(ToolResult::error(msg)),
        };

        let Some(api_key) = self.api_key.as_deref() else {
            return Ok(ToolResult::error(
                "Web search is not configured (missing search.api_key / EXA_API_KEY)".to_string(),
            ));
        };

        tracing::info!(
            agent = %context.agent_id,
            "Web search: '{}' ({} results)",
            query,
            num_results
        );

        match self.search(api_key, &query, num_results).await {
            Ok(hits) => {
                let summary = format_summary(&query, &hits);
                Ok(ToolResult::success(summary).with_data(json!({
                    "query": query,
                    "results": hits,
                })))
            }
            Err(msg) => {
                tracing::warn!("Web search failed: {}", msg);
                Ok(ToolResult::error(msg))
            }
        }
    }
}
