//! keygate: a license-gated billing proxy in front of hosted LLM chat
//! completion APIs.
//!
//! One inbound OpenAI-style endpoint; license keys carry a plan that sets
//! per-minute rate limits, monthly task quotas, and the allowed model
//! list. Requests are translated to the upstream provider's wire protocol
//! and relayed back, buffered or streamed.

pub mod config;
pub mod error;
pub mod http;
pub mod license;
pub mod limiter;
pub mod plans;
pub mod providers;
pub mod store;
pub mod types;

pub use config::{AppConfig, ProviderSettings};
pub use error::{ApiError, ErrorKind};
pub use http::AppState;
pub use license::{LicenseRecord, LicenseStatus, generate_license_key};
pub use limiter::{RateDecision, RateLimiter};
pub use plans::{Plan, TaskQuota};
pub use providers::Provider;
pub use store::{LicenseStore, MemoryStore, RedisStore, StoreError, WindowStore};
pub use types::{ChatMessage, ChatRequest, Role};
