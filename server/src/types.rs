//! Shared channel and record types for the Presence server.
//!
//! This module defines the three reporting channels and the immutable record
//! kinds that flow through them. Records are created exactly once on
//! ingestion and never mutated; "current state" is always computed from the
//! most recently appended record of a channel.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// One independent reporting stream.
///
/// The three channels are structurally identical (append + latest +
/// staleness); everything channel-specific lives in the record types and in
/// the per-channel offline thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Desktop foreground window and open application reports.
    Activity,
    /// Heart-rate samples from a watch or phone shortcut.
    HeartRate,
    /// Phone lock/battery/foreground-app reports.
    PhoneStatus,
}

impl Channel {
    /// All channels, in dashboard display order.
    pub const ALL: [Channel; 3] = [Channel::Activity, Channel::HeartRate, Channel::PhoneStatus];

    /// The canonical channel name, also the backing table name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Activity => "activity",
            Self::HeartRate => "heart_rate",
            Self::PhoneStatus => "phone_status",
        }
    }

    /// Resolves a channel from its canonical name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "activity" => Some(Self::Activity),
            "heart_rate" => Some(Self::HeartRate),
            "phone_status" => Some(Self::PhoneStatus),
            _ => None,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Identifier assigned to a record at append time.
///
/// Ids are monotonically increasing per channel, so they double as the
/// insertion-order tie-break for "most recent record".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub i64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One visible application reported by the desktop client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenApp {
    /// Process name, e.g. `code.exe`.
    pub process: String,

    /// Window title. May be empty when the reporter cannot read it.
    #[serde(default)]
    pub title: String,
}

/// A desktop activity report: foreground window plus visible applications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    pub created_at: DateTime<Utc>,
    pub active_process: Option<String>,
    pub active_title: Option<String>,
    /// Never null; an idle desktop reports an empty list.
    #[serde(default)]
    pub open_apps: Vec<OpenApp>,
}

/// A single heart-rate sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartRateRecord {
    pub created_at: DateTime<Utc>,
    /// Beats per minute. Expected positive; the store does not enforce it.
    pub rate: i64,
    pub source: Option<String>,
}

/// A phone lock/battery/app report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhoneStatusRecord {
    pub created_at: DateTime<Utc>,
    pub locked: LockState,
    /// Percentage, 0-100. Validated on ingestion.
    pub battery: Option<u8>,
    /// Foreground app name, if the phone reported one.
    pub app: Option<String>,
    pub source: Option<String>,
}

/// Tri-state phone lock status.
///
/// Phones report `locked` as a boolean when they know it; shortcut-based
/// reporters sometimes cannot tell, so the wire format also accepts the
/// strings `"locked"`, `"unlocked"`, and `"unknown"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockState {
    Locked,
    Unlocked,
    #[default]
    Unknown,
}

impl LockState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Locked => "locked",
            Self::Unlocked => "unlocked",
            Self::Unknown => "unknown",
        }
    }

    /// Resolves a lock state from its canonical name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "locked" => Some(Self::Locked),
            "unlocked" => Some(Self::Unlocked),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

impl From<bool> for LockState {
    fn from(locked: bool) -> Self {
        if locked {
            Self::Locked
        } else {
            Self::Unlocked
        }
    }
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for LockState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for LockState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct LockStateVisitor;

        impl Visitor<'_> for LockStateVisitor {
            type Value = LockState;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a boolean or one of \"locked\", \"unlocked\", \"unknown\"")
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<LockState, E> {
                Ok(LockState::from(v))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<LockState, E> {
                LockState::from_name(v)
                    .ok_or_else(|| E::invalid_value(de::Unexpected::Str(v), &self))
            }
        }

        deserializer.deserialize_any(LockStateVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_names_round_trip() {
        for channel in Channel::ALL {
            assert_eq!(Channel::from_name(channel.name()), Some(channel));
        }
    }

    #[test]
    fn channel_from_unknown_name_is_none() {
        assert_eq!(Channel::from_name("keyboard"), None);
        assert_eq!(Channel::from_name(""), None);
    }

    #[test]
    fn channel_display_matches_name() {
        assert_eq!(Channel::HeartRate.to_string(), "heart_rate");
    }

    #[test]
    fn record_id_is_ordered_by_insertion() {
        assert!(RecordId(2) > RecordId(1));
    }

    #[test]
    fn open_app_title_defaults_to_empty() {
        let app: OpenApp = serde_json::from_str(r#"{"process":"chrome.exe"}"#).unwrap();
        assert_eq!(app.process, "chrome.exe");
        assert_eq!(app.title, "");
    }

    #[test]
    fn open_app_ignores_extra_fields() {
        // The original desktop client also sends a `pid` per entry.
        let app: OpenApp =
            serde_json::from_str(r#"{"process":"chrome.exe","title":"Inbox","pid":4321}"#).unwrap();
        assert_eq!(app.title, "Inbox");
    }

    #[test]
    fn activity_record_serializes_camel_case() {
        let record = ActivityRecord {
            created_at: "2024-01-01T10:00:00Z".parse().unwrap(),
            active_process: Some("code.exe".to_string()),
            active_title: None,
            open_apps: vec![],
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["activeProcess"], "code.exe");
        assert!(json["openApps"].as_array().unwrap().is_empty());
    }

    #[test]
    fn lock_state_deserializes_from_bool() {
        let locked: LockState = serde_json::from_str("true").unwrap();
        assert_eq!(locked, LockState::Locked);
        let unlocked: LockState = serde_json::from_str("false").unwrap();
        assert_eq!(unlocked, LockState::Unlocked);
    }

    #[test]
    fn lock_state_deserializes_from_string() {
        let state: LockState = serde_json::from_str(r#""unknown""#).unwrap();
        assert_eq!(state, LockState::Unknown);
    }

    #[test]
    fn lock_state_rejects_other_strings() {
        let result: Result<LockState, _> = serde_json::from_str(r#""open""#);
        assert!(result.is_err());
    }

    #[test]
    fn lock_state_serializes_as_string() {
        assert_eq!(
            serde_json::to_string(&LockState::Locked).unwrap(),
            r#""locked""#
        );
    }

    #[test]
    fn lock_state_defaults_to_unknown() {
        assert_eq!(LockState::default(), LockState::Unknown);
    }

    #[test]
    fn phone_record_round_trips() {
        let record = PhoneStatusRecord {
            created_at: "2024-01-01T10:00:00Z".parse().unwrap(),
            locked: LockState::Unlocked,
            battery: Some(80),
            app: Some("Safari".to_string()),
            source: Some("iphone".to_string()),
        };
        let json = serde_json::to_string(&record).unwrap();
        let back: PhoneStatusRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
