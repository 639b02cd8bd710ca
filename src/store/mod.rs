//! Storage capability: license records and rate-limit windows.
//!
//! Two implementations exist: the redis-backed store for real deployments
//! and an in-memory store for tests and keyless local runs. The choice is
//! made once at process start; the two are never mixed at runtime.

pub mod redis;

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::license::{LicenseRecord, first_of_next_month};

pub use redis::RedisStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("license not found")]
    LicenseNotFound,
}

/// Persistence for license records, keyed by license key with a secondary
/// email index. The index is best-effort: it may lag the records after a
/// partial failure, so readers tolerate a stale or missing entry.
#[async_trait]
pub trait LicenseStore: Send + Sync {
    async fn get_by_key(&self, license_key: &str) -> Result<Option<LicenseRecord>, StoreError>;

    async fn get_by_email(&self, email: &str) -> Result<Option<LicenseRecord>, StoreError>;

    async fn put(&self, record: &LicenseRecord) -> Result<(), StoreError>;

    /// Increment the monthly counter and return the new value. Performs the
    /// monthly reset (zero the counter, advance the reset date) when
    /// `now_epoch` has reached the stored reset date.
    async fn increment_monthly_usage(
        &self,
        license_key: &str,
        now_epoch: i64,
    ) -> Result<u32, StoreError>;
}

/// Ordered-set semantics over (timestamp, nonce) entries, one set per
/// license key. Backs the sliding-window limiter; the prune/count/add
/// sequence issued against it is intentionally not transactional.
#[async_trait]
pub trait WindowStore: Send + Sync {
    /// Drop every entry with a timestamp at or below `cutoff_ms`.
    async fn remove_older_than(&self, license_key: &str, cutoff_ms: u64) -> Result<(), StoreError>;

    async fn count(&self, license_key: &str) -> Result<u64, StoreError>;

    /// Timestamp of the oldest surviving entry, if any.
    async fn oldest_ms(&self, license_key: &str) -> Result<Option<u64>, StoreError>;

    async fn add(
        &self,
        license_key: &str,
        timestamp_ms: u64,
        member: &str,
    ) -> Result<(), StoreError>;

    async fn expire(&self, license_key: &str, ttl_secs: u64) -> Result<(), StoreError>;
}

/// Ephemeral store backed by process memory. State is lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    licenses: Mutex<HashMap<String, LicenseRecord>>,
    email_index: Mutex<HashMap<String, String>>,
    windows: Mutex<HashMap<String, Vec<(u64, String)>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LicenseStore for MemoryStore {
    async fn get_by_key(&self, license_key: &str) -> Result<Option<LicenseRecord>, StoreError> {
        Ok(self.licenses.lock().await.get(license_key).cloned())
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<LicenseRecord>, StoreError> {
        let key = match self.email_index.lock().await.get(email) {
            Some(key) => key.clone(),
            None => return Ok(None),
        };
        // The index entry may be stale; a missing record is simply absent.
        self.get_by_key(&key).await
    }

    async fn put(&self, record: &LicenseRecord) -> Result<(), StoreError> {
        self.licenses
            .lock()
            .await
            .insert(record.license_key.clone(), record.clone());
        self.email_index
            .lock()
            .await
            .insert(record.email.clone(), record.license_key.clone());
        Ok(())
    }

    async fn increment_monthly_usage(
        &self,
        license_key: &str,
        now_epoch: i64,
    ) -> Result<u32, StoreError> {
        let mut licenses = self.licenses.lock().await;
        let record = licenses
            .get_mut(license_key)
            .ok_or(StoreError::LicenseNotFound)?;
        if now_epoch >= record.resets_at {
            record.tasks_used_this_month = 0;
            record.resets_at = first_of_next_month(now_epoch);
        }
        record.tasks_used_this_month += 1;
        record.updated_at = now_epoch;
        Ok(record.tasks_used_this_month)
    }
}

#[async_trait]
impl WindowStore for MemoryStore {
    async fn remove_older_than(&self, license_key: &str, cutoff_ms: u64) -> Result<(), StoreError> {
        let mut windows = self.windows.lock().await;
        if let Some(entries) = windows.get_mut(license_key) {
            entries.retain(|(timestamp, _)| *timestamp > cutoff_ms);
        }
        Ok(())
    }

    async fn count(&self, license_key: &str) -> Result<u64, StoreError> {
        Ok(self
            .windows
            .lock()
            .await
            .get(license_key)
            .map(|entries| entries.len() as u64)
            .unwrap_or(0))
    }

    async fn oldest_ms(&self, license_key: &str) -> Result<Option<u64>, StoreError> {
        Ok(self
            .windows
            .lock()
            .await
            .get(license_key)
            .and_then(|entries| entries.iter().map(|(timestamp, _)| *timestamp).min()))
    }

    async fn add(
        &self,
        license_key: &str,
        timestamp_ms: u64,
        member: &str,
    ) -> Result<(), StoreError> {
        self.windows
            .lock()
            .await
            .entry(license_key.to_string())
            .or_default()
            .push((timestamp_ms, member.to_string()));
        Ok(())
    }

    async fn expire(&self, _license_key: &str, _ttl_secs: u64) -> Result<(), StoreError> {
        // Memory windows are pruned by remove_older_than; no TTL to refresh.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::license::LicenseStatus;

    fn record(email: &str, now: i64) -> LicenseRecord {
        LicenseRecord::new(email, "starter", now)
    }

    #[tokio::test]
    async fn put_then_get_by_key_and_email() {
        let store = MemoryStore::new();
        let record = record("user@example.test", 1_700_000_000);
        store.put(&record).await.unwrap();

        let by_key = store.get_by_key(&record.license_key).await.unwrap().unwrap();
        assert_eq!(by_key.email, "user@example.test");
        assert_eq!(by_key.status, LicenseStatus::Active);

        let by_email = store
            .get_by_email("user@example.test")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_email.license_key, record.license_key);
    }

    #[tokio::test]
    async fn stale_email_index_reads_as_absent() {
        let store = MemoryStore::new();
        let record = record("stale@example.test", 0);
        store.put(&record).await.unwrap();
        store.licenses.lock().await.remove(&record.license_key);

        assert!(store.get_by_email("stale@example.test").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn increment_counts_and_resets_once_per_month() {
        let store = MemoryStore::new();
        let created_at = 1_749_988_800; // 2025-06-15T12:00:00Z
        let record = record("count@example.test", created_at);
        let key = record.license_key.clone();
        let resets_at = record.resets_at;
        store.put(&record).await.unwrap();

        assert_eq!(store.increment_monthly_usage(&key, created_at).await.unwrap(), 1);
        assert_eq!(
            store
                .increment_monthly_usage(&key, created_at + 60)
                .await
                .unwrap(),
            2
        );

        // First access on/after the reset date zeroes the counter exactly once.
        assert_eq!(store.increment_monthly_usage(&key, resets_at).await.unwrap(), 1);
        let rolled = store.get_by_key(&key).await.unwrap().unwrap();
        assert!(rolled.resets_at > resets_at);
        assert_eq!(
            store
                .increment_monthly_usage(&key, resets_at + 60)
                .await
                .unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn increment_on_missing_key_errors() {
        let store = MemoryStore::new();
        let err = store.increment_monthly_usage("KG-MISSING", 0).await;
        assert!(matches!(err, Err(StoreError::LicenseNotFound)));
    }

    #[tokio::test]
    async fn window_prune_is_inclusive_of_the_cutoff() {
        let store = MemoryStore::new();
        store.add("k", 1_000, "a").await.unwrap();
        store.add("k", 2_000, "b").await.unwrap();
        store.remove_older_than("k", 1_000).await.unwrap();
        assert_eq!(store.count("k").await.unwrap(), 1);
        assert_eq!(store.oldest_ms("k").await.unwrap(), Some(2_000));
    }
}
