//! Report payload schemas and validation for the ingestion gateway.
//!
//! Each POST endpoint accepts one report shape. Validation runs after the
//! credential check and before anything touches the store: a report either
//! becomes one complete record or is rejected with a
//! [`ApiError::MalformedPayload`] naming the offending field, with no partial
//! side effect.
//!
//! # Timestamps
//!
//! Reporters may supply `createdAt`; a supplied timestamp is recorded as-is
//! so that reporter clock problems stay visible instead of being masked by
//! server time. Only an *absent* timestamp gets the server clock. Accepted
//! formats are RFC 3339 and the naive `YYYY-MM-DD HH:MM:SS` (treated as
//! UTC) that the original desktop client emits.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::ApiError;
use crate::types::{ActivityRecord, HeartRateRecord, LockState, OpenApp, PhoneStatusRecord};

/// Wire format of the naive timestamp the desktop client sends.
const NAIVE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parses a request body into a report shape.
pub fn parse_report<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|err| ApiError::MalformedPayload(err.to_string()))
}

/// Normalizes an optional client-supplied timestamp.
///
/// A timestamp that fails to parse is an error, never silently replaced by
/// `now`.
fn normalize_created_at(
    raw: Option<&str>,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, ApiError> {
    let Some(raw) = raw else {
        return Ok(now);
    };

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, NAIVE_TIMESTAMP_FORMAT) {
        return Ok(naive.and_utc());
    }

    Err(ApiError::malformed(format!(
        "createdAt: '{raw}' is not a valid timestamp"
    )))
}

/// Desktop activity report (`POST /api/status`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityReport {
    /// Body-embedded credential; consumed by authentication, never stored.
    pub token: Option<String>,
    pub created_at: Option<String>,
    pub active_process: Option<String>,
    pub active_title: Option<String>,
    #[serde(default)]
    pub apps: Vec<OpenApp>,
}

impl ActivityReport {
    /// Validates the report and builds the record to append.
    pub fn into_record(self, now: DateTime<Utc>) -> Result<ActivityRecord, ApiError> {
        Ok(ActivityRecord {
            created_at: normalize_created_at(self.created_at.as_deref(), now)?,
            active_process: self.active_process,
            active_title: self.active_title,
            open_apps: self.apps,
        })
    }
}

/// Heart-rate report (`POST /api/heartrate`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartRateReport {
    pub token: Option<String>,
    pub created_at: Option<String>,
    pub rate: Option<i64>,
    pub source: Option<String>,
}

impl HeartRateReport {
    pub fn into_record(self, now: DateTime<Utc>) -> Result<HeartRateRecord, ApiError> {
        let rate = self
            .rate
            .ok_or_else(|| ApiError::malformed("rate is required"))?;

        Ok(HeartRateRecord {
            created_at: normalize_created_at(self.created_at.as_deref(), now)?,
            rate,
            source: self.source,
        })
    }
}

/// Phone status report (`POST /api/phone_status`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhoneStatusReport {
    pub token: Option<String>,
    pub created_at: Option<String>,
    /// Missing means the phone could not tell; see [`LockState`].
    pub locked: Option<LockState>,
    pub battery: Option<i64>,
    pub app: Option<String>,
    pub source: Option<String>,
}

impl PhoneStatusReport {
    pub fn into_record(self, now: DateTime<Utc>) -> Result<PhoneStatusRecord, ApiError> {
        let battery = match self.battery {
            None => None,
            Some(level @ 0..=100) => Some(level as u8),
            Some(level) => {
                return Err(ApiError::malformed(format!(
                    "battery: {level} is not between 0 and 100"
                )))
            }
        };

        Ok(PhoneStatusRecord {
            created_at: normalize_created_at(self.created_at.as_deref(), now)?,
            locked: self.locked.unwrap_or_default(),
            battery,
            app: self.app,
            source: self.source,
        })
    }
}
