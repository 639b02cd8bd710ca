//! HTTP surface: router, shared state, and the thin endpoints around the
//! proxy orchestrator (license verification, admin issuance, health).

pub mod chat;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::config::AppConfig;
use crate::error::ApiError;
use crate::license::{LicenseRecord, LicenseStatus, now_epoch};
use crate::limiter::RateLimiter;
use crate::plans;
use crate::store::{LicenseStore, WindowStore};

const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub licenses: Arc<dyn LicenseStore>,
    pub limiter: RateLimiter,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        licenses: Arc<dyn LicenseStore>,
        windows: Arc<dyn WindowStore>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(UPSTREAM_TIMEOUT)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            config,
            licenses,
            limiter: RateLimiter::new(windows),
            http,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/health", get(health))
        .route("/v1/chat/completions", post(chat::chat_completions))
        .route("/v1/licenses/verify", post(verify_license));

    // Issuance is only reachable when an admin token is configured.
    if state.config.admin_token.is_some() {
        router = router.route("/admin/licenses", post(create_license));
    }

    router.layer(CorsLayer::permissive()).with_state(state)
}

pub(crate) fn extract_header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

pub(crate) fn extract_bearer(headers: &HeaderMap) -> Option<String> {
    let value = headers.get("authorization")?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ").or_else(|| value.strip_prefix("bearer "))?;
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// The dedicated header wins over bearer auth when both are present.
pub(crate) fn extract_license_key(headers: &HeaderMap) -> Option<String> {
    extract_header(headers, "x-license-key").or_else(|| extract_bearer(headers))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

#[derive(Debug, Deserialize)]
struct VerifyRequest {
    license_key: String,
}

#[derive(Debug, Serialize)]
struct VerifyResponse {
    valid: bool,
    plan: &'static str,
    status: LicenseStatus,
    tasks_used_this_month: u32,
    /// `null` means unlimited.
    tasks_limit: Option<u32>,
    requests_per_minute: u32,
    resets_at: i64,
}

/// Unlike the proxy path, verification distinguishes "not found" from
/// "found but inactive": it is called by the licence owner, not probed
/// with guessed keys.
async fn verify_license(
    State(state): State<AppState>,
    Json(payload): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let record = state
        .licenses
        .get_by_key(&payload.license_key)
        .await
        .map_err(|err| {
            tracing::error!(error = %err, "license store lookup failed");
            ApiError::server("Internal error")
        })?
        .ok_or_else(|| {
            ApiError::new(404, crate::error::ErrorKind::AuthenticationError, "License key not found")
                .with_code("license_not_found")
        })?;

    if !record.is_active() {
        return Err(ApiError::permission("license_inactive", "License is not active"));
    }

    let plan = plans::plan_or_free(&record.plan);
    Ok(Json(VerifyResponse {
        valid: true,
        plan: plan.id,
        status: record.status,
        tasks_used_this_month: record.tasks_used_this_month,
        tasks_limit: plan.monthly_tasks.cap(),
        requests_per_minute: plan.requests_per_minute,
        resets_at: record.resets_at,
    }))
}

#[derive(Debug, Deserialize)]
struct CreateLicenseRequest {
    email: String,
    plan: String,
}

#[derive(Debug, Serialize)]
struct CreateLicenseResponse {
    license_key: String,
    email: String,
    plan: String,
    status: LicenseStatus,
    resets_at: i64,
    created: bool,
}

/// Issue (or re-surface) a license for an email. This is the seam the
/// payment-confirmation flow calls once a checkout settles.
async fn create_license(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateLicenseRequest>,
) -> Result<Json<CreateLicenseResponse>, ApiError> {
    let expected = state.config.admin_token.as_deref().unwrap_or_default();
    let presented = extract_header(&headers, "x-admin-token").unwrap_or_default();
    if expected.is_empty() || presented != expected {
        return Err(ApiError::authentication("invalid_admin_token", "Invalid admin token"));
    }

    let email = payload.email.trim().to_ascii_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::invalid_request("`email` must be a valid address").with_code("invalid_email"));
    }
    if plans::find(&payload.plan).is_none() {
        return Err(ApiError::invalid_request(format!("unknown plan `{}`", payload.plan))
            .with_code("unknown_plan"));
    }

    let store_err = |err| {
        tracing::error!(error = %err, "license store write failed");
        ApiError::server("Internal error")
    };

    if let Some(existing) = state.licenses.get_by_email(&email).await.map_err(store_err)? {
        return Ok(Json(CreateLicenseResponse {
            license_key: existing.license_key,
            email: existing.email,
            plan: existing.plan,
            status: existing.status,
            resets_at: existing.resets_at,
            created: false,
        }));
    }

    let record = LicenseRecord::new(email, payload.plan, now_epoch());
    state.licenses.put(&record).await.map_err(store_err)?;
    tracing::info!(email = %record.email, plan = %record.plan, "license issued");

    Ok(Json(CreateLicenseResponse {
        license_key: record.license_key,
        email: record.email,
        plan: record.plan,
        status: record.status,
        resets_at: record.resets_at,
        created: true,
    }))
}
