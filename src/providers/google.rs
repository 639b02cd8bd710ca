//! Google Generative Language wire format.
//!
//! Turn-based schema: assistant messages become the `model` role, content is
//! wrapped in parts, sampling parameters nest under `generationConfig`, and
//! the API key travels as a query parameter because this endpoint does not
//! take header auth. Streaming selects the `:streamGenerateContent` method
//! variant.

use serde_json::{Map, Value, json};

use super::{UpstreamCall, UpstreamError};
use crate::types::{ChatRequest, Role};

pub(crate) fn translate(request: &ChatRequest, api_key: &str, base_url: &str) -> UpstreamCall {
    let system: Vec<&str> = request
        .messages
        .iter()
        .filter(|message| message.role == Role::System)
        .map(|message| message.content.as_str())
        .collect();

    let contents: Vec<Value> = request
        .messages
        .iter()
        .filter(|message| message.role != Role::System)
        .map(|message| {
            let role = match message.role {
                Role::Assistant => "model",
                _ => "user",
            };
            json!({ "role": role, "parts": [{ "text": message.content }] })
        })
        .collect();

    let mut body = Map::new();
    body.insert("contents".to_string(), Value::Array(contents));
    if !system.is_empty() {
        body.insert(
            "systemInstruction".to_string(),
            json!({ "parts": [{ "text": system.join("\n\n") }] }),
        );
    }

    let mut generation = Map::new();
    if let Some(temperature) = request.temperature {
        generation.insert("temperature".to_string(), json!(temperature));
    }
    if let Some(top_p) = request.top_p {
        generation.insert("topP".to_string(), json!(top_p));
    }
    if let Some(max_tokens) = request.max_tokens {
        generation.insert("maxOutputTokens".to_string(), json!(max_tokens));
    }
    if !generation.is_empty() {
        body.insert("generationConfig".to_string(), Value::Object(generation));
    }

    let base = base_url.trim_end_matches('/');
    let url = if request.wants_stream() {
        format!(
            "{base}/models/{}:streamGenerateContent?alt=sse&key={api_key}",
            request.model
        )
    } else {
        format!("{base}/models/{}:generateContent?key={api_key}", request.model)
    };

    UpstreamCall {
        url,
        headers: Vec::new(),
        body: Value::Object(body),
    }
}

/// Error envelope: `{"error": {"code", "message", "status"}}`, sometimes
/// wrapped in a single-element array.
pub(crate) fn extract_error(value: &Value) -> Option<UpstreamError> {
    let unwrapped = value
        .as_array()
        .and_then(|entries| entries.first())
        .unwrap_or(value);
    let error = unwrapped.get("error")?;
    let message = error.get("message").and_then(Value::as_str)?.to_string();
    let code = match error.get("status") {
        Some(Value::String(status)) => Some(status.clone()),
        _ => error
            .get("code")
            .and_then(Value::as_u64)
            .map(|code| code.to_string()),
    };
    Some(UpstreamError {
        message,
        kind: None,
        code,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChatMessage;

    const BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

    fn request() -> ChatRequest {
        ChatRequest::new(
            "gemini-2.0-flash",
            vec![
                ChatMessage::new(Role::System, "be terse"),
                ChatMessage::new(Role::User, "hi"),
                ChatMessage::new(Role::Assistant, "hello"),
            ],
        )
    }

    #[test]
    fn key_rides_as_query_parameter_not_header() {
        let call = translate(&request(), "AIza-test", BASE);
        assert!(call.headers.is_empty());
        assert_eq!(
            call.url,
            format!("{BASE}/models/gemini-2.0-flash:generateContent?key=AIza-test")
        );
    }

    #[test]
    fn streaming_selects_the_sse_method_variant() {
        let mut req = request();
        req.stream = Some(true);
        let call = translate(&req, "AIza-test", BASE);
        assert_eq!(
            call.url,
            format!("{BASE}/models/gemini-2.0-flash:streamGenerateContent?alt=sse&key=AIza-test")
        );
    }

    #[test]
    fn maps_roles_and_wraps_parts() {
        let call = translate(&request(), "k", BASE);
        let contents = call.body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[0]["parts"][0]["text"], "hi");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(call.body["systemInstruction"]["parts"][0]["text"], "be terse");
    }

    #[test]
    fn sampling_parameters_nest_under_generation_config() {
        let mut req = request();
        req.temperature = Some(0.5);
        req.top_p = Some(0.8);
        req.max_tokens = Some(256);
        let call = translate(&req, "k", BASE);
        let config = &call.body["generationConfig"];
        assert_eq!(config["temperature"], 0.5);
        assert_eq!(config["topP"], 0.8);
        assert_eq!(config["maxOutputTokens"], 256);
    }

    #[test]
    fn generation_config_is_omitted_when_empty() {
        let call = translate(&request(), "k", BASE);
        assert!(
            !call
                .body
                .as_object()
                .unwrap()
                .contains_key("generationConfig")
        );
    }

    #[test]
    fn unwraps_array_wrapped_errors() {
        let value: Value = serde_json::from_str(
            r#"[{"error":{"code":429,"message":"quota","status":"RESOURCE_EXHAUSTED"}}]"#,
        )
        .unwrap();
        let err = extract_error(&value).unwrap();
        assert_eq!(err.message, "quota");
        assert_eq!(err.code.as_deref(), Some("RESOURCE_EXHAUSTED"));
    }
}
