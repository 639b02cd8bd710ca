//! The proxy orchestrator: a straight-line pipeline of hard gates, each
//! returning immediately on failure, ending in a buffered or streaming
//! relay of the upstream response.

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderValue, StatusCode};
use axum::http::header::HeaderMap;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::StreamExt;
use serde_json::Value;

use super::{AppState, extract_license_key};
use crate::error::{ApiError, ErrorKind};
use crate::license::now_epoch;
use crate::limiter::RateDecision;
use crate::plans::{self, TaskQuota};
use crate::providers::Provider;
use crate::types::ChatRequest;

pub(crate) async fn chat_completions(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut rate: Option<RateDecision> = None;
    let mut response = match admit_and_dispatch(&state, &headers, &body, &mut rate).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    };

    // Whatever happened past admission, the caller learns its budget.
    if let Some(decision) = rate {
        let headers = response.headers_mut();
        headers.insert("x-ratelimit-limit", HeaderValue::from(decision.limit));
        headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));
        if !decision.allowed {
            headers.insert("retry-after", HeaderValue::from(decision.reset_in_seconds));
        }
    }
    response
}

async fn admit_and_dispatch(
    state: &AppState,
    headers: &HeaderMap,
    body: &Bytes,
    rate: &mut Option<RateDecision>,
) -> Result<Response, ApiError> {
    // 1. Credential extraction.
    let license_key = extract_license_key(headers).ok_or_else(|| {
        ApiError::authentication(
            "missing_license_key",
            "Missing license key. Pass it in the X-License-Key header or as a bearer token.",
        )
    })?;

    // 2. License resolution. Missing and inactive collapse to one code so a
    //    probing caller cannot tell whether a key exists.
    let record = state
        .licenses
        .get_by_key(&license_key)
        .await
        .map_err(|err| {
            tracing::error!(error = %err, "license store lookup failed");
            ApiError::server("Internal error")
        })?
        .filter(|record| record.is_active())
        .ok_or_else(|| {
            ApiError::authentication("invalid_license_key", "Invalid or inactive license key")
        })?;

    let plan = plans::plan_or_free(&record.plan);

    // 3. Rate admission.
    let decision = state.limiter.admit(&license_key, plan).await;
    *rate = Some(decision);
    if !decision.allowed {
        return Err(ApiError::rate_limited(
            "rate_limit_exceeded",
            format!(
                "Rate limit exceeded ({} requests per minute). Retry in {} seconds.",
                decision.limit, decision.reset_in_seconds
            ),
        ));
    }

    // 4. Payload shape.
    let request = parse_request(body)?;

    // 5. Model authorization.
    if !plans::is_model_allowed(plan, &request.model) {
        return Err(ApiError::permission(
            "model_not_allowed",
            format!(
                "Model `{}` is not available on the {} plan.",
                request.model, plan.name
            ),
        ));
    }
    if request.wants_stream() && !plan.streaming {
        return Err(ApiError::permission(
            "streaming_not_allowed",
            format!("Streaming is not available on the {} plan.", plan.name),
        ));
    }

    // 6. Monthly quota. The retry hint counts down to the stored reset
    //    date, never less than a second.
    if let TaskQuota::Limited(limit) = plan.monthly_tasks {
        if record.tasks_used_this_month >= limit {
            let until_reset = record.resets_at.saturating_sub(now_epoch()).max(1) as u64;
            return Err(ApiError::rate_limited(
                "task_limit_reached",
                format!(
                    "Monthly task limit of {limit} reached on the {} plan.",
                    plan.name
                ),
            )
            .with_retry_after(until_reset));
        }
    }

    // 7. Provider resolution: no prefix match is a hard rejection.
    let provider = Provider::from_model(&request.model).ok_or_else(|| {
        ApiError::invalid_request(format!("Unknown model `{}`.", request.model))
            .with_code("unknown_model")
    })?;

    // 8. Upstream credential: absence is operator misconfiguration.
    let settings = state.config.provider(provider);
    let api_key = settings.api_key.as_deref().ok_or_else(|| {
        tracing::error!(provider = provider.name(), "upstream provider not configured");
        ApiError::new(
            503,
            ErrorKind::ServerError,
            format!("{} is not configured on this deployment.", provider.name()),
        )
        .with_code("provider_not_configured")
    })?;

    // 9. Count the task before dispatch: a crash mid-call still consumes
    //    quota. Simplicity over exactness under failure.
    state
        .licenses
        .increment_monthly_usage(&license_key, now_epoch())
        .await
        .map_err(|err| {
            tracing::error!(error = %err, "usage increment failed");
            ApiError::server("Internal error")
        })?;

    // 10. Translate and dispatch.
    let call = provider.translate(&request, api_key, &settings.base_url);
    let mut upstream_request = state.http.post(&call.url).json(&call.body);
    for (name, value) in &call.headers {
        upstream_request = upstream_request.header(*name, value);
    }
    let upstream = upstream_request.send().await.map_err(|err| {
        tracing::error!(error = %err, provider = provider.name(), "upstream call failed");
        ApiError::new(
            502,
            ErrorKind::ApiError,
            format!("Failed to reach {}.", provider.name()),
        )
        .with_code("upstream_unreachable")
        .with_provider(provider.name())
    })?;

    // 11. Relay. Errors are normalized before any bytes reach the caller.
    let status = upstream.status();
    if !status.is_success() {
        let body = upstream.bytes().await.unwrap_or_default();
        return Err(provider.normalize_error(status.as_u16(), &body));
    }

    if request.wants_stream() {
        Ok(relay_stream(upstream))
    } else {
        let body = upstream.bytes().await.map_err(|err| {
            tracing::error!(error = %err, provider = provider.name(), "upstream body read failed");
            ApiError::new(
                502,
                ErrorKind::ApiError,
                format!("{} connection dropped mid-response.", provider.name()),
            )
            .with_provider(provider.name())
        })?;
        Ok((
            StatusCode::OK,
            [("content-type", "application/json")],
            body,
        )
            .into_response())
    }
}

fn parse_request(body: &Bytes) -> Result<ChatRequest, ApiError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|err| ApiError::invalid_request(format!("invalid JSON: {err}")))?;

    let model = value
        .get("model")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|model| !model.is_empty());
    if model.is_none() {
        return Err(ApiError::invalid_request("missing field `model`"));
    }

    match value.get("messages").and_then(Value::as_array) {
        Some(messages) if !messages.is_empty() => {}
        _ => {
            return Err(ApiError::invalid_request(
                "`messages` must be a non-empty array",
            ));
        }
    }

    let mut request: ChatRequest = serde_json::from_value(value)
        .map_err(|err| ApiError::invalid_request(format!("invalid request: {err}")))?;
    // Every later stage (plan check, routing, translation) sees the
    // trimmed name.
    request.model = request.model.trim().to_string();
    Ok(request)
}

/// Forward the upstream byte stream chunk-by-chunk. One chunk in flight at
/// a time; upstream end-of-stream ends the relay, and a caller disconnect
/// drops this body and the upstream connection with it.
fn relay_stream(upstream: reqwest::Response) -> Response {
    let stream = upstream
        .bytes_stream()
        .map(|chunk| chunk.map_err(|err| std::io::Error::other(err.to_string())));

    let mut response = Response::new(Body::from_stream(stream));
    let headers = response.headers_mut();
    headers.insert("content-type", HeaderValue::from_static("text/event-stream"));
    headers.insert("cache-control", HeaderValue::from_static("no-cache"));
    response
}
