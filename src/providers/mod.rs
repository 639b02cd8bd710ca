//! Upstream provider identities, model routing, request translation, and
//! error normalization.
//!
//! Provider identity is resolved once from the model name and carried as an
//! enum through the rest of the pipeline; translation and normalization
//! dispatch on the variant.

mod anthropic;
mod google;
mod openai_compat;

use serde_json::Value;

use crate::error::{ApiError, ErrorKind};
use crate::types::ChatRequest;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Groq,
    Anthropic,
    Google,
}

/// Fully assembled upstream HTTP call. Deterministic for a given request.
#[derive(Clone, Debug, PartialEq)]
pub struct UpstreamCall {
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: Value,
}

/// Message/type/code pulled out of a provider's error envelope.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct UpstreamError {
    pub message: String,
    pub kind: Option<String>,
    pub code: Option<String>,
}

/// Ordered prefix rules; first match wins.
const MODEL_ROUTES: &[(&str, Provider)] = &[
    ("gpt-", Provider::OpenAi),
    ("chatgpt-", Provider::OpenAi),
    ("o1", Provider::OpenAi),
    ("o3", Provider::OpenAi),
    ("o4", Provider::OpenAi),
    ("claude-", Provider::Anthropic),
    ("gemini-", Provider::Google),
    ("llama", Provider::Groq),
    ("mixtral", Provider::Groq),
    ("gemma", Provider::Groq),
    ("deepseek", Provider::Groq),
];

impl Provider {
    /// Route a model name to its provider. `None` is a hard rejection, not a
    /// fallback.
    pub fn from_model(model: &str) -> Option<Self> {
        MODEL_ROUTES
            .iter()
            .find(|(prefix, _)| model.starts_with(prefix))
            .map(|(_, provider)| *provider)
    }

    pub fn name(self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Groq => "groq",
            Provider::Anthropic => "anthropic",
            Provider::Google => "google",
        }
    }

    pub fn api_key_env(self) -> &'static str {
        match self {
            Provider::OpenAi => "OPENAI_API_KEY",
            Provider::Groq => "GROQ_API_KEY",
            Provider::Anthropic => "ANTHROPIC_API_KEY",
            Provider::Google => "GOOGLE_API_KEY",
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            Provider::OpenAi => "https://api.openai.com/v1",
            Provider::Groq => "https://api.groq.com/openai/v1",
            Provider::Anthropic => "https://api.anthropic.com/v1",
            Provider::Google => "https://generativelanguage.googleapis.com/v1beta",
        }
    }

    /// Build the provider-specific wire call for a canonical request.
    pub fn translate(self, request: &ChatRequest, api_key: &str, base_url: &str) -> UpstreamCall {
        match self {
            Provider::OpenAi | Provider::Groq => {
                openai_compat::translate(request, api_key, base_url)
            }
            Provider::Anthropic => anthropic::translate(request, api_key, base_url),
            Provider::Google => google::translate(request, api_key, base_url),
        }
    }

    /// Convert an upstream error response into the canonical error shape.
    ///
    /// The status-code override table takes precedence over whatever the
    /// provider put in the body; extraction failures degrade to a generic
    /// message. The raw body is never forwarded.
    pub fn normalize_error(self, status: u16, body: &[u8]) -> ApiError {
        let parsed: Option<Value> = serde_json::from_slice(body).ok();
        let extracted = parsed.as_ref().and_then(|value| match self {
            Provider::OpenAi | Provider::Groq => openai_compat::extract_error(value),
            Provider::Anthropic => anthropic::extract_error(value),
            Provider::Google => google::extract_error(value),
        });

        let err = match status {
            401 | 403 => ApiError::new(
                status,
                ErrorKind::AuthenticationError,
                format!(
                    "Authentication with {} failed. Please contact support.",
                    self.name()
                ),
            )
            .with_code("provider_authentication_failed"),
            429 => ApiError::new(
                status,
                ErrorKind::RateLimitError,
                format!("{} rate limit exceeded. Please retry shortly.", self.name()),
            )
            .with_code("provider_rate_limited"),
            500 | 502 | 503 => ApiError::new(
                status,
                ErrorKind::ApiError,
                format!(
                    "{} is temporarily unavailable. Please retry shortly.",
                    self.name()
                ),
            )
            .with_code("provider_unavailable"),
            _ => match extracted {
                Some(upstream) => {
                    let kind = upstream
                        .kind
                        .as_deref()
                        .map(map_upstream_kind)
                        .unwrap_or(ErrorKind::ApiError);
                    let mut err = ApiError::new(status, kind, upstream.message);
                    if let Some(code) = upstream.code {
                        err = err.with_code(code);
                    }
                    err
                }
                None => ApiError::new(
                    status,
                    ErrorKind::ApiError,
                    format!("{} returned an error", self.name()),
                ),
            },
        };

        err.with_provider(self.name())
    }
}

fn map_upstream_kind(kind: &str) -> ErrorKind {
    match kind {
        "invalid_request_error" => ErrorKind::InvalidRequestError,
        "authentication_error" => ErrorKind::AuthenticationError,
        "permission_error" => ErrorKind::PermissionError,
        "rate_limit_error" | "rate_limit_exceeded" => ErrorKind::RateLimitError,
        "server_error" | "overloaded_error" => ErrorKind::ServerError,
        _ => ErrorKind::ApiError,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChatMessage, ChatRequest, Role};

    fn request() -> ChatRequest {
        ChatRequest::new(
            "gpt-4o-mini",
            vec![
                ChatMessage::new(Role::System, "be terse"),
                ChatMessage::new(Role::User, "hi"),
            ],
        )
    }

    #[test]
    fn routes_by_first_matching_prefix() {
        assert_eq!(Provider::from_model("o3-mini"), Some(Provider::OpenAi));
        assert_eq!(Provider::from_model("gpt-4o-mini"), Some(Provider::OpenAi));
        assert_eq!(Provider::from_model("claude-x"), Some(Provider::Anthropic));
        assert_eq!(
            Provider::from_model("gemini-2.0-flash"),
            Some(Provider::Google)
        );
        assert_eq!(
            Provider::from_model("llama-3.1-8b-instant"),
            Some(Provider::Groq)
        );
        assert_eq!(Provider::from_model("gemma2-9b-it"), Some(Provider::Groq));
    }

    #[test]
    fn unknown_model_is_rejected_not_defaulted() {
        assert_eq!(Provider::from_model("unknown-llm"), None);
        assert_eq!(Provider::from_model(""), None);
    }

    #[test]
    fn translation_is_deterministic() {
        for provider in [
            Provider::OpenAi,
            Provider::Groq,
            Provider::Anthropic,
            Provider::Google,
        ] {
            let a = provider.translate(&request(), "sk-test", provider.default_base_url());
            let b = provider.translate(&request(), "sk-test", provider.default_base_url());
            assert_eq!(a, b, "{} translation not deterministic", provider.name());
        }
    }

    #[test]
    fn status_override_beats_body_content() {
        let body = br#"[{"error":{"code":429,"message":"quota"}}]"#;
        let err = Provider::Google.normalize_error(429, body);
        assert_eq!(err.status, 429);
        assert_eq!(err.kind, ErrorKind::RateLimitError);
        assert_eq!(err.provider, Some("google"));
        assert!(err.message.contains("rate limit exceeded"));
        assert!(!err.message.contains("quota"));
    }

    #[test]
    fn auth_failures_tell_the_caller_to_contact_support() {
        let err = Provider::OpenAi.normalize_error(401, br#"{"error":{"message":"bad key"}}"#);
        assert_eq!(err.kind, ErrorKind::AuthenticationError);
        assert_eq!(err.code.as_deref(), Some("provider_authentication_failed"));
        assert!(err.message.contains("contact support"));
        assert!(!err.message.contains("bad key"));
    }

    #[test]
    fn server_errors_normalize_to_unavailable() {
        for status in [500, 502, 503] {
            let err = Provider::Anthropic.normalize_error(status, b"upstream exploded");
            assert_eq!(err.status, status);
            assert_eq!(err.code.as_deref(), Some("provider_unavailable"));
            assert!(err.message.contains("temporarily unavailable"));
        }
    }

    #[test]
    fn body_extraction_applies_outside_the_override_table() {
        let body = br#"{"error":{"message":"unknown field","type":"invalid_request_error","code":"bad_field"}}"#;
        let err = Provider::OpenAi.normalize_error(400, body);
        assert_eq!(err.kind, ErrorKind::InvalidRequestError);
        assert_eq!(err.message, "unknown field");
        assert_eq!(err.code.as_deref(), Some("bad_field"));
    }

    #[test]
    fn malformed_bodies_degrade_to_a_generic_message() {
        let err = Provider::Groq.normalize_error(418, b"<html>teapot</html>");
        assert_eq!(err.status, 418);
        assert_eq!(err.message, "groq returned an error");
        assert_eq!(err.provider, Some("groq"));
    }
}
