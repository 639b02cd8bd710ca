//! License records and key generation.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time};

pub const KEY_PREFIX: &str = "KG";

/// 32 symbols; digits 0/1 and letters I/O are excluded as visually ambiguous.
const KEY_ALPHABET: &[u8; 32] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZ";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseStatus {
    Active,
    Expired,
    Cancelled,
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseRecord {
    pub license_key: String,
    pub email: String,
    pub plan: String,
    pub status: LicenseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
    pub tasks_used_this_month: u32,
    /// First of the next calendar month, UTC, epoch seconds.
    pub resets_at: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl std::fmt::Debug for LicenseRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LicenseRecord")
            .field("license_key", &"<redacted>")
            .field("email", &self.email)
            .field("plan", &self.plan)
            .field("status", &self.status)
            .field("tasks_used_this_month", &self.tasks_used_this_month)
            .field("resets_at", &self.resets_at)
            .finish()
    }
}

impl LicenseRecord {
    pub fn new(email: impl Into<String>, plan: impl Into<String>, now_epoch: i64) -> Self {
        Self {
            license_key: generate_license_key(),
            email: email.into(),
            plan: plan.into(),
            status: LicenseStatus::Active,
            customer_id: None,
            subscription_id: None,
            tasks_used_this_month: 0,
            resets_at: first_of_next_month(now_epoch),
            created_at: now_epoch,
            updated_at: now_epoch,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == LicenseStatus::Active
    }
}

/// Generate a key of the form `KG-XXXXX-XXXXX-XXXXX-XXXXX`.
pub fn generate_license_key() -> String {
    let mut bytes = [0u8; 20];
    if getrandom::fill(&mut bytes).is_err() {
        // No OS entropy; derive symbols from the clock instead of failing
        // key issuance outright.
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| duration.as_nanos())
            .unwrap_or(0);
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = ((ts >> ((i % 16) * 8)) & 0xff) as u8 ^ (i as u8).wrapping_mul(37);
        }
    }

    let mut out = String::with_capacity(KEY_PREFIX.len() + 24);
    out.push_str(KEY_PREFIX);
    for (i, byte) in bytes.iter().enumerate() {
        if i % 5 == 0 {
            out.push('-');
        }
        // 256 is an exact multiple of 32, so masking stays uniform.
        out.push(KEY_ALPHABET[(byte & 0x1f) as usize] as char);
    }
    out
}

/// Midnight UTC on the first day of the month after `now_epoch`.
pub fn first_of_next_month(now_epoch: i64) -> i64 {
    let now = OffsetDateTime::from_unix_timestamp(now_epoch)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH);
    let date = now.date();
    let (year, month) = match date.month() {
        Month::December => (date.year() + 1, Month::January),
        month => (date.year(), month.next()),
    };
    Date::from_calendar_date(year, month, 1)
        .map(|first| {
            PrimitiveDateTime::new(first, Time::MIDNIGHT)
                .assume_utc()
                .unix_timestamp()
        })
        .unwrap_or(now_epoch + 30 * 24 * 60 * 60)
}

pub fn now_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_has_expected_shape() {
        let key = generate_license_key();
        assert_eq!(key.len(), 26);
        let parts: Vec<&str> = key.split('-').collect();
        assert_eq!(parts.len(), 5);
        assert_eq!(parts[0], "KG");
        for group in &parts[1..] {
            assert_eq!(group.len(), 5);
            for symbol in group.bytes() {
                assert!(
                    KEY_ALPHABET.contains(&symbol),
                    "unexpected symbol {} in {key}",
                    symbol as char
                );
            }
        }
    }

    #[test]
    fn keys_are_unique_across_draws() {
        let a = generate_license_key();
        let b = generate_license_key();
        assert_ne!(a, b);
    }

    #[test]
    fn ambiguous_symbols_never_appear() {
        for banned in [b'0', b'1', b'I', b'O'] {
            assert!(!KEY_ALPHABET.contains(&banned));
        }
    }

    #[test]
    fn reset_lands_on_first_of_next_month() {
        // 2025-06-15T12:00:00Z -> 2025-07-01T00:00:00Z
        assert_eq!(first_of_next_month(1_749_988_800), 1_751_328_000);
    }

    #[test]
    fn reset_rolls_over_december() {
        // 2025-12-31T23:00:00Z -> 2026-01-01T00:00:00Z
        assert_eq!(first_of_next_month(1_767_222_000), 1_767_225_600);
    }

    #[test]
    fn debug_redacts_the_key() {
        let record = LicenseRecord::new("a@b.test", "starter", 0);
        let rendered = format!("{record:?}");
        assert!(!rendered.contains(&record.license_key));
        assert!(rendered.contains("<redacted>"));
    }
}
