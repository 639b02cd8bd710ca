//! Anthropic Messages wire format.
//!
//! System-role messages move out of the message sequence into the top-level
//! `system` field, and `max_tokens` is mandatory upstream so it defaults
//! here when the caller left it unset.

use serde_json::{Map, Value, json};

use super::{UpstreamCall, UpstreamError};
use crate::types::{ChatRequest, Role};

const VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub(crate) fn translate(request: &ChatRequest, api_key: &str, base_url: &str) -> UpstreamCall {
    let system: Vec<&str> = request
        .messages
        .iter()
        .filter(|message| message.role == Role::System)
        .map(|message| message.content.as_str())
        .collect();

    let messages: Vec<Value> = request
        .messages
        .iter()
        .filter(|message| message.role != Role::System)
        .map(|message| {
            let role = match message.role {
                Role::Assistant => "assistant",
                _ => "user",
            };
            json!({ "role": role, "content": message.content })
        })
        .collect();

    let mut body = Map::new();
    body.insert("model".to_string(), json!(request.model));
    body.insert(
        "max_tokens".to_string(),
        json!(request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)),
    );
    body.insert("messages".to_string(), Value::Array(messages));
    if !system.is_empty() {
        body.insert("system".to_string(), json!(system.join("\n\n")));
    }
    if let Some(temperature) = request.temperature {
        body.insert("temperature".to_string(), json!(temperature));
    }
    if let Some(top_p) = request.top_p {
        body.insert("top_p".to_string(), json!(top_p));
    }
    if let Some(stream) = request.stream {
        body.insert("stream".to_string(), json!(stream));
    }

    UpstreamCall {
        url: format!("{}/messages", base_url.trim_end_matches('/')),
        headers: vec![
            ("x-api-key", api_key.to_string()),
            ("anthropic-version", VERSION.to_string()),
        ],
        body: Value::Object(body),
    }
}

/// Error envelope: `{"type": "error", "error": {"type", "message"}}`.
pub(crate) fn extract_error(value: &Value) -> Option<UpstreamError> {
    let error = value.get("error")?;
    let message = error.get("message").and_then(Value::as_str)?.to_string();
    let kind = error
        .get("type")
        .and_then(Value::as_str)
        .map(str::to_string);
    Some(UpstreamError {
        message,
        kind: kind.clone(),
        code: kind,
    })
}
