//! Output scorers.
//!
//! Cheap heuristics run on every completed agent reply, plus an optional
//! LLM judge. Scores are in `[0, 1]`; they are logged and surfaced in the
//! task metadata, never used to alter the reply.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::brain::agent::ToolCallRecord;
use crate::brain::provider::{LLMRequest, Message, Provider, ProviderError};
use crate::brain::tools::web_search::TOOL_NAME as WEB_SEARCH;

pub const TOOL_CALL: &str = "tool-call";
pub const COMPLETENESS: &str = "completeness";
pub const SOURCE_ATTRIBUTION: &str = "source-attribution";
pub const JUDGE: &str = "judge";

#[derive(Debug, thiserror::Error)]
pub enum ScorerError {
    #[error("Judge call failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Judge returned an unusable verdict: {0}")]
    InvalidVerdict(String),
}

/// What a scorer looks at.
#[derive(Debug, Clone, Copy)]
pub struct ScorerInput<'a> {
    /// The last user message.
    pub input: &'a str,
    /// The agent's final reply.
    pub output: &'a str,
    pub tool_calls: &'a [ToolCallRecord],
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreResult {
    pub scorer: String,
    pub score: f64,
    pub reason: String,
}

#[async_trait]
pub trait Scorer: Send + Sync {
    fn name(&self) -> &str;

    async fn score(&self, input: &ScorerInput<'_>) -> Result<ScoreResult, ScorerError>;
}

/// Build a scorer by its configured name.
pub fn build_scorer(name: &str, provider: Arc<dyn Provider>, model: &str) -> Option<Arc<dyn Scorer>> {
    match name {
        TOOL_CALL => Some(Arc::new(ToolCallScorer::new(WEB_SEARCH))),
        COMPLETENESS => Some(Arc::new(CompletenessScorer)),
        SOURCE_ATTRIBUTION => Some(Arc::new(SourceAttributionScorer)),
        JUDGE => Some(Arc::new(LlmJudgeScorer::new(provider, model))),
        _ => None,
    }
}

fn result(scorer: &str, score: f64, reason: impl Into<String>) -> ScoreResult {
    ScoreResult {
        scorer: scorer.to_string(),
        score: score.clamp(0.0, 1.0),
        reason: reason.into(),
    }
}

// ── tool-call ────────────────────────────────────────────────────────────────

static NEEDS_LOOKUP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(latest|current(ly)?|today|tonight|yesterday|recent(ly)?|news|this (week|month|year)|search|look up|sources?|citations?|20\d\d)\b",
    )
    .expect("lookup pattern is valid")
});

/// Was the tool used exactly when the request called for fresh information?
pub struct ToolCallScorer {
    tool: String,
}

impl ToolCallScorer {
    pub fn new(tool: impl Into<String>) -> Self {
        Self { tool: tool.into() }
    }
}

#[async_trait]
impl Scorer for ToolCallScorer {
    fn name(&self) -> &str {
        TOOL_CALL
    }

    async fn score(&self, input: &ScorerInput<'_>) -> Result<ScoreResult, ScorerError> {
        let expected = NEEDS_LOOKUP.is_match(input.input);
        let used = input.tool_calls.iter().any(|c| c.tool_name == self.tool);

        let (score, reason) = match (expected, used) {
            (true, true) => (1.0, format!("Request needed a lookup and {} was called", self.tool)),
            (false, false) => (1.0, "No lookup needed and none was made".to_string()),
            (true, false) => (0.0, format!("Request needed a lookup but {} was not called", self.tool)),
            (false, true) => (0.0, format!("{} was called without an apparent need", self.tool)),
        };
        Ok(result(TOOL_CALL, score, reason))
    }
}

// ── completeness ─────────────────────────────────────────────────────────────

const STOP_WORDS: &[&str] = &[
    "about", "after", "also", "been", "before", "being", "could", "does", "from", "have",
    "into", "just", "like", "more", "most", "much", "only", "other", "over", "please", "should",
    "some", "such", "than", "that", "their", "them", "then", "there", "these", "they", "this",
    "those", "very", "want", "what", "when", "where", "which", "while", "with", "would", "your",
    "tell", "know", "give", "explain",
];

fn significant_terms(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 3 && !STOP_WORDS.contains(w))
        .map(str::to_string)
        .collect()
}

/// Share of the request's significant terms that the reply mentions.
pub struct CompletenessScorer;

#[async_trait]
impl Scorer for CompletenessScorer {
    fn name(&self) -> &str {
        COMPLETENESS
    }

    async fn score(&self, input: &ScorerInput<'_>) -> Result<ScoreResult, ScorerError> {
        let terms = significant_terms(input.input);
        if terms.is_empty() {
            return Ok(result(COMPLETENESS, 1.0, "No significant terms in the request"));
        }

        let output = input.output.to_lowercase();
        let covered = terms.iter().filter(|t| output.contains(t.as_str())).count();
        Ok(result(
            COMPLETENESS,
            covered as f64 / terms.len() as f64,
            format!("Covered {} of {} request terms", covered, terms.len()),
        ))
    }
}

// ── source-attribution ───────────────────────────────────────────────────────

fn search_urls(tool_calls: &[ToolCallRecord]) -> Vec<String> {
    tool_calls
        .iter()
        .filter(|c| c.tool_name == WEB_SEARCH && !c.is_error)
        .filter_map(|c| c.result.get("results").and_then(Value::as_array))
        .flatten()
        .filter_map(|r| r.get("url").and_then(Value::as_str))
        .map(|u| u.trim_end_matches('/').to_string())
        .collect()
}

/// Does the reply cite at least one URL the search actually returned?
pub struct SourceAttributionScorer;

#[async_trait]
impl Scorer for SourceAttributionScorer {
    fn name(&self) -> &str {
        SOURCE_ATTRIBUTION
    }

    async fn score(&self, input: &ScorerInput<'_>) -> Result<ScoreResult, ScorerError> {
        let urls = search_urls(input.tool_calls);
        if urls.is_empty() {
            return Ok(result(SOURCE_ATTRIBUTION, 1.0, "No search results to attribute"));
        }

        let cited = urls.iter().filter(|u| input.output.contains(u.as_str())).count();
        let score = if cited > 0 { 1.0 } else { 0.0 };
        Ok(result(
            SOURCE_ATTRIBUTION,
            score,
            format!("Reply cites {} of {} returned sources", cited, urls.len()),
        ))
    }
}

// ── judge ────────────────────────────────────────────────────────────────────


const JUDGE_INSTRUCTIONS: &str = "You grade answers written by a research assistant. \
Judge whether the answer addresses the question accurately and completely, \
and whether claims about current events are backed by cited sources. \
Respond with only a JSON object: {\"score\": <number between 0 and 1>, \"reason\": \"<one sentence>\"}.";

/// Asks the model to grade the reply.
pub struct LlmJudgeScorer {
    provider: Arc<dyn Provider>,
    model: String,
}

impl LlmJudgeScorer {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

fn parse_verdict(reply: &str) -> Result<(f64, String), ScorerError> {
    let start = reply
        .find('{')
        .ok_or_else(|| ScorerError::InvalidVerdict("no JSON object in reply".to_string()))?;

    // First complete JSON value from the opening brace; anything after it is ignored.
    let verdict: Value = serde_json::Deserializer::from_str(&reply[start..])
        .into_iter::<Value>()
        .next()
        .ok_or_else(|| ScorerError::InvalidVerdict("no JSON object in reply".to_string()))?
        .map_err(|e| ScorerError::InvalidVerdict(e.to_string()))?;

    let score = verdict
        .get("score")
        .and_then(Value::as_f64)
        .filter(|s| s.is_finite())
        .ok_or_else(|| ScorerError::InvalidVerdict("missing numeric 'score'".to_string()))?;
    let reason = verdict
        .get("reason")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Ok((score, reason))
}

#[async_trait]
impl Scorer for LlmJudgeScorer {
    fn name(&self) -> &str {
        JUDGE
    }

    async fn score(&self, input: &ScorerInput<'_>) -> Result<ScoreResult, ScorerError> {
        let prompt = format!(
            "Question:\n{}\n\nAnswer:\n{}\n\nTools used: {}",
            input.input,
            input.output,
            if input.tool_calls.is_empty() {
                "none".to_string()
            } else {
                input
                    .tool_calls
                    .iter()
                    .map(|c| c.tool_name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            }
        );

        let mut request = LLMRequest::new(self.model.clone(), vec![Message::user(prompt)])
            .with_system(JUDGE_INSTRUCTIONS);
        request.temperature = Some(0.0);

        let response = self.provider.complete(request).await?;
        let (score, reason) = parse_verdict(&response.text())?;
        Ok(result(JUDGE, score, reason))
    }
}
