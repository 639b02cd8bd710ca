//! Redis-backed store: license records as JSON strings, email index as a
//! plain key, rate-limit windows as sorted sets scored by timestamp.

use async_trait::async_trait;
use redis::AsyncCommands;

use super::{LicenseStore, StoreError, WindowStore};
use crate::license::{LicenseRecord, first_of_next_month};

#[derive(Clone, Debug)]
pub struct RedisStore {
    client: redis::Client,
    prefix: String,
}

impl RedisStore {
    pub fn new(url: impl AsRef<str>) -> Result<Self, StoreError> {
        Ok(Self {
            client: redis::Client::open(url.as_ref())?,
            prefix: "keygate".to_string(),
        })
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, redis::RedisError> {
        self.client.get_multiplexed_async_connection().await
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let _: Option<String> = conn.get(format!("{}:__ping__", self.prefix)).await?;
        Ok(())
    }

    fn key_license(&self, license_key: &str) -> String {
        format!("{}:license:{license_key}", self.prefix)
    }

    fn key_email(&self, email: &str) -> String {
        format!("{}:license_email:{email}", self.prefix)
    }

    fn key_window(&self, license_key: &str) -> String {
        format!("{}:ratelimit:{license_key}", self.prefix)
    }
}

#[async_trait]
impl LicenseStore for RedisStore {
    async fn get_by_key(&self, license_key: &str) -> Result<Option<LicenseRecord>, StoreError> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn.get(self.key_license(license_key)).await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<LicenseRecord>, StoreError> {
        let mut conn = self.connection().await?;
        let license_key: Option<String> = conn.get(self.key_email(email)).await?;
        match license_key {
            Some(license_key) => self.get_by_key(&license_key).await,
            None => Ok(None),
        }
    }

    async fn put(&self, record: &LicenseRecord) -> Result<(), StoreError> {
        let raw = serde_json::to_string(record)?;
        let mut conn = self.connection().await?;
        let _: () = conn.set(self.key_license(&record.license_key), raw).await?;
        let _: () = conn
            .set(self.key_email(&record.email), record.license_key.clone())
            .await?;
        Ok(())
    }

    async fn increment_monthly_usage(
        &self,
        license_key: &str,
        now_epoch: i64,
    ) -> Result<u32, StoreError> {
        // Read-modify-write without a transaction; concurrent increments on
        // the same key can lose a count, which mirrors the limiter's
        // approximate-admission stance.
        let mut record = self
            .get_by_key(license_key)
            .await?
            .ok_or(StoreError::LicenseNotFound)?;
        if now_epoch >= record.resets_at {
            record.tasks_used_this_month = 0;
            record.resets_at = first_of_next_month(now_epoch);
        }
        record.tasks_used_this_month += 1;
        record.updated_at = now_epoch;
        self.put(&record).await?;
        Ok(record.tasks_used_this_month)
    }
}

#[async_trait]
impl WindowStore for RedisStore {
    async fn remove_older_than(&self, license_key: &str, cutoff_ms: u64) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let _: u64 = conn
            .zrembyscore(self.key_window(license_key), "-inf", cutoff_ms as i64)
            .await?;
        Ok(())
    }

    async fn count(&self, license_key: &str) -> Result<u64, StoreError> {
        let mut conn = self.connection().await?;
        Ok(conn.zcard(self.key_window(license_key)).await?)
    }

    async fn oldest_ms(&self, license_key: &str) -> Result<Option<u64>, StoreError> {
        let mut conn = self.connection().await?;
        let entries: Vec<(String, u64)> = conn
            .zrange_withscores(self.key_window(license_key), 0, 0)
            .await?;
        Ok(entries.first().map(|(_, score)| *score))
    }

    async fn add(
        &self,
        license_key: &str,
        timestamp_ms: u64,
        member: &str,
    ) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let _: u64 = conn
            .zadd(self.key_window(license_key), member, timestamp_ms as i64)
            .await?;
        Ok(())
    }

    async fn expire(&self, license_key: &str, ttl_secs: u64) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let _: bool = conn
            .expire(self.key_window(license_key), ttl_secs as i64)
            .await?;
        Ok(())
    }
}
