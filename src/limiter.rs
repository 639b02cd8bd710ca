//! Sliding-window rate limiter over a `WindowStore`.
//!
//! Each accepted request records a (timestamp, nonce) entry; admission
//! prunes entries older than the trailing 60-second window and counts the
//! survivors. The prune/count/add sequence is not transactional, so two
//! concurrent requests on one key can slightly over-admit. An accepted
//! trade-off, not a bug.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::plans::Plan;
use crate::store::WindowStore;

pub const WINDOW_MS: u64 = 60_000;

/// Window length plus a buffer so idle keys age out of storage.
const WINDOW_TTL_SECS: u64 = 90;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_in_seconds: u64,
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn WindowStore>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn WindowStore>) -> Self {
        Self { store }
    }

    pub async fn admit(&self, license_key: &str, plan: &Plan) -> RateDecision {
        self.admit_at(license_key, plan, now_ms()).await
    }

    pub async fn admit_at(&self, license_key: &str, plan: &Plan, now_ms: u64) -> RateDecision {
        let limit = plan.requests_per_minute;
        match self.try_admit(license_key, limit, now_ms).await {
            Ok(decision) => decision,
            Err(err) => {
                // Fail open: availability over strict enforcement while the
                // counter store is down.
                tracing::warn!(
                    error = %err,
                    plan = plan.id,
                    "rate limiter store unreachable; admitting request (degraded)"
                );
                RateDecision {
                    allowed: true,
                    limit,
                    remaining: limit,
                    reset_in_seconds: 0,
                }
            }
        }
    }

    async fn try_admit(
        &self,
        license_key: &str,
        limit: u32,
        now_ms: u64,
    ) -> Result<RateDecision, crate::store::StoreError> {
        let window_start = now_ms.saturating_sub(WINDOW_MS);
        self.store.remove_older_than(license_key, window_start).await?;
        let count = self.store.count(license_key).await?;

        if count >= u64::from(limit) {
            let reset_in_seconds = match self.store.oldest_ms(license_key).await? {
                Some(oldest) => (oldest + WINDOW_MS)
                    .saturating_sub(now_ms)
                    .div_ceil(1000)
                    .max(1),
                None => WINDOW_MS / 1000,
            };
            return Ok(RateDecision {
                allowed: false,
                limit,
                remaining: 0,
                reset_in_seconds,
            });
        }

        // Nonce keeps two same-millisecond entries from colliding.
        let member = format!("{now_ms}-{:016x}", nonce());
        self.store.add(license_key, now_ms, &member).await?;
        self.store.expire(license_key, WINDOW_TTL_SECS).await?;

        Ok(RateDecision {
            allowed: true,
            limit,
            remaining: limit.saturating_sub(count as u32 + 1),
            reset_in_seconds: 0,
        })
    }
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as u64)
        .unwrap_or(0)
}

fn nonce() -> u64 {
    let mut bytes = [0u8; 8];
    if getrandom::fill(&mut bytes).is_err() {
        return now_ms();
    }
    u64::from_le_bytes(bytes)
}
