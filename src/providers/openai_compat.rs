//! OpenAI-compatible chat-completions wire format, shared by the OpenAI and
//! Groq variants. The canonical request maps almost one-to-one; absent
//! optionals are omitted rather than sent as nulls.

use serde_json::{Map, Value, json};

use super::{UpstreamCall, UpstreamError};
use crate::types::ChatRequest;

pub(crate) fn translate(request: &ChatRequest, api_key: &str, base_url: &str) -> UpstreamCall {
    let mut body = Map::new();
    body.insert("model".to_string(), json!(request.model));
    body.insert(
        "messages".to_string(),
        serde_json::to_value(&request.messages).unwrap_or_else(|_| json!([])),
    );
    if let Some(temperature) = request.temperature {
        body.insert("temperature".to_string(), json!(temperature));
    }
    if let Some(top_p) = request.top_p {
        body.insert("top_p".to_string(), json!(top_p));
    }
    if let Some(max_tokens) = request.max_tokens {
        body.insert("max_tokens".to_string(), json!(max_tokens));
    }
    if let Some(response_format) = &request.response_format {
        body.insert("response_format".to_string(), response_format.clone());
    }
    if let Some(stream) = request.stream {
        body.insert("stream".to_string(), json!(stream));
    }

    UpstreamCall {
        url: format!("{}/chat/completions", base_url.trim_end_matches('/')),
        headers: vec![("authorization", format!("Bearer {api_key}"))],
        body: Value::Object(body),
    }
}

/// Error envelope: `{"error": {"message", "type", "code"}}`; `code` may be a
/// string or a number.
pub(crate) fn extract_error(value: &Value) -> Option<UpstreamError> {
    let error = value.get("error")?;
    let message = error.get("message").and_then(Value::as_str)?.to_string();
    let kind = error
        .get("type")
        .and_then(Value::as_str)
        .map(str::to_string);
    let code = error.get("code").and_then(|code| match code {
        Value::String(code) => Some(code.clone()),
        Value::Number(code) => Some(code.to_string()),
        _ => None,
    });
    Some(UpstreamError {
        message,
        kind,
        code,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChatMessage, Role};

    #[test]
    fn passes_fields_through_and_omits_absent_optionals() {
        let request = ChatRequest::new(
            "gpt-4o-mini",
            vec![ChatMessage::new(Role::User, "hello")],
        );
        let call = translate(&request, "sk-live", "https://api.openai.com/v1");

        assert_eq!(call.url, "https://api.openai.com/v1/chat/completions");
        assert_eq!(
            call.headers,
            vec![("authorization", "Bearer sk-live".to_string())]
        );
        assert_eq!(call.body["model"], "gpt-4o-mini");
        assert_eq!(call.body["messages"][0]["role"], "user");
        assert_eq!(call.body["messages"][0]["content"], "hello");
        let obj = call.body.as_object().unwrap();
        for absent in ["temperature", "top_p", "max_tokens", "response_format", "stream"] {
            assert!(!obj.contains_key(absent), "{absent} should be omitted");
        }
    }

    #[test]
    fn forwards_present_sampling_parameters() {
        let mut request = ChatRequest::new("gpt-4o", vec![ChatMessage::new(Role::User, "x")]);
        request.temperature = Some(0.2);
        request.top_p = Some(0.9);
        request.max_tokens = Some(128);
        request.stream = Some(true);
        let call = translate(&request, "sk", "https://api.groq.com/openai/v1/");

        assert_eq!(call.url, "https://api.groq.com/openai/v1/chat/completions");
        assert_eq!(call.body["temperature"], 0.2);
        assert_eq!(call.body["top_p"], 0.9);
        assert_eq!(call.body["max_tokens"], 128);
        assert_eq!(call.body["stream"], true);
    }

    #[test]
    fn extracts_numeric_codes() {
        let value: Value =
            serde_json::from_str(r#"{"error":{"message":"m","type":"server_error","code":500}}"#)
                .unwrap();
        let err = extract_error(&value).unwrap();
        assert_eq!(err.code.as_deref(), Some("500"));
        assert_eq!(err.kind.as_deref(), Some("server_error"));
    }
}
