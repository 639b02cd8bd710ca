use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

/// Coarse error taxonomy surfaced to callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    AuthenticationError,
    InvalidRequestError,
    PermissionError,
    RateLimitError,
    ServerError,
    ApiError,
}

/// The one error shape the gateway returns, regardless of which stage or
/// upstream provider produced it. Raw provider bodies never pass through.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiError {
    pub status: u16,
    pub kind: ErrorKind,
    pub message: String,
    pub code: Option<String>,
    pub provider: Option<&'static str>,
    /// Seconds until a retry may succeed; rendered as a `Retry-After`
    /// header, never part of the JSON body.
    pub retry_after: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

impl ApiError {
    pub fn new(status: u16, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: message.into(),
            code: None,
            provider: None,
            retry_after: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_provider(mut self, provider: &'static str) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    pub fn authentication(code: &str, message: impl Into<String>) -> Self {
        Self::new(401, ErrorKind::AuthenticationError, message).with_code(code)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(400, ErrorKind::InvalidRequestError, message)
    }

    pub fn permission(code: &str, message: impl Into<String>) -> Self {
        Self::new(403, ErrorKind::PermissionError, message).with_code(code)
    }

    pub fn rate_limited(code: &str, message: impl Into<String>) -> Self {
        Self::new(429, ErrorKind::RateLimitError, message).with_code(code)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(500, ErrorKind::ServerError, message)
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            error: ErrorDetail {
                message: self.message.clone(),
                kind: self.kind,
                code: self.code.clone(),
                provider: self.provider.map(str::to_string),
            },
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}): {}",
            self.status,
            self.code.as_deref().unwrap_or("-"),
            self.message
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, Json(self.body())).into_response();
        if let Some(seconds) = self.retry_after {
            response
                .headers_mut()
                .insert("retry-after", axum::http::HeaderValue::from(seconds));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_to_openai_error_envelope() {
        let err =
            ApiError::authentication("invalid_license_key", "Invalid or inactive license key");
        let body = serde_json::to_value(err.body()).unwrap();
        assert_eq!(body["error"]["type"], "authentication_error");
        assert_eq!(body["error"]["code"], "invalid_license_key");
        assert_eq!(body["error"]["message"], "Invalid or inactive license key");
        assert!(body["error"].get("provider").is_none());
    }

    #[test]
    fn retry_after_becomes_a_header_not_body_content() {
        let err = ApiError::rate_limited("task_limit_reached", "capped").with_retry_after(86_400);
        let body = serde_json::to_value(err.body()).unwrap();
        assert!(body["error"].get("retry_after").is_none());

        let response = err.into_response();
        assert_eq!(response.headers()["retry-after"], "86400");
    }

    #[test]
    fn omits_code_when_absent() {
        let err = ApiError::server("Internal error");
        let body = serde_json::to_value(err.body()).unwrap();
        assert!(body["error"].get("code").is_none());
    }
}
