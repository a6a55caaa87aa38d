//! Turns loosely-shaped inbound A2A messages into plain prompt text.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::types::{InboundMessage, InboundPart, content_text};
use crate::brain::provider::Role;

/// Shortest history entry worth forwarding as context.
pub const MIN_CONTEXT_CHARS: usize = 20;

static MARKUP_START: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*<(?:[A-Za-z][\w:.-]*|!|\?|/)[^>]*>").expect("markup pattern is valid")
});

/// A message that survived flattening.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMessage {
    pub role: Role,
    pub text: String,
    pub message_id: Option<String>,
}

/// Flattened text of one message, falling back to its raw `content`.
pub fn flatten_message(msg: &InboundMessage) -> String {
    let joined = msg
        .parts
        .iter()
        .filter_map(part_fragment)
        .collect::<Vec<_>>()
        .join("\n");

    if !joined.trim().is_empty() {
        return joined;
    }
    msg.content.clone().unwrap_or_default()
}

/// `params.messages` in order, then `params.message`; empty ones dropped.
pub fn resolve_messages<'a>(
    messages: impl IntoIterator<Item = &'a InboundMessage>,
) -> Vec<ResolvedMessage> {
    messages
        .into_iter()
        .filter_map(|msg| {
            let text = flatten_message(msg);
            if text.trim().is_empty() {
                return None;
            }
            Some(ResolvedMessage {
                role: map_role(msg.role.as_deref()),
                text,
                message_id: msg.message_id.clone(),
            })
        })
        .collect()
}

pub fn map_role(role: Option<&str>) -> Role {
    match role {
        Some("agent") | Some("assistant") => Role::Assistant,
        _ => Role::User,
    }
}

fn part_fragment(part: &InboundPart) -> Option<String> {
    match part.kind.as_deref() {
        Some("text") => part.text.clone().filter(|t| !t.is_empty()),
        Some("data") => part.data.as_ref().and_then(data_fragment),
        None if part.text.is_some() => part.text.clone().filter(|t| !t.is_empty()),
        _ => None,
    }
}

fn data_fragment(data: &Value) -> Option<String> {
    match data {
        Value::Null => None,
        Value::String(s) => Some(s.clone()).filter(|s| !s.is_empty()),
        Value::Array(items) if !items.is_empty() && items.iter().all(is_history_like) => {
            history_context(items)
        }
        other => Some(other.to_string()),
    }
}

fn is_history_like(item: &Value) -> bool {
    item.as_object()
        .is_some_and(|o| o.contains_key("text") || o.contains_key("content") || o.contains_key("parts"))
}

/// Last entry long enough to carry meaning and not rendered markup.
fn history_context(items: &[Value]) -> Option<String> {
    items
        .iter()
        .rev()
        .filter_map(item_text)
        .find(|text| text.chars().count() >= MIN_CONTEXT_CHARS && !is_markup(text))
}

fn item_text(item: &Value) -> Option<String> {
    if let Some(text) = item.get("text").and_then(Value::as_str) {
        return Some(text.trim().to_string());
    }
    if let Some(content) = item.get("content").and_then(content_text) {
        return Some(content.trim().to_string());
    }
    let parts = item.get("parts").and_then(Value::as_array)?;
    let joined = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("\n");
    Some(joined.trim().to_string())
}

fn is_markup(text: &str) -> bool {
    MARKUP_START.is_match(text)
}
