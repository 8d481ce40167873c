//! Staleness classification for reporting channels.
//!
//! A channel is "live" when its most recent report is recent enough to be
//! trusted as current. Everything here is pure: liveness is computed lazily
//! at query time from the record timestamp and the caller-supplied clock,
//! never cached by a background job, so the answer can never drift from the
//! true elapsed time.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Classifies a channel as live or offline.
///
/// Total over all ages: a report exactly at the threshold still counts as
/// live, and the result is monotonic - once `age_seconds` passes the
/// threshold the channel stays offline until a newer report arrives.
#[must_use]
pub fn classify(age_seconds: u64, threshold: Duration) -> bool {
    age_seconds <= threshold.as_secs()
}

/// The liveness of a channel at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Liveness {
    /// Seconds since the most recent report, `None` when the channel has
    /// never reported.
    pub age_seconds: Option<u64>,

    /// Whether the most recent report is recent enough to display as
    /// current. Always `false` for a channel that has never reported.
    pub is_live: bool,
}

impl Liveness {
    /// Liveness of a channel with no reports at all.
    #[must_use]
    pub fn never_reported() -> Self {
        Self {
            age_seconds: None,
            is_live: false,
        }
    }
}

/// Evaluates a channel's liveness from its most recent report timestamp.
///
/// Reporter clocks may run slightly ahead of the service host; a report
/// timestamped in the future is treated as age zero rather than a negative
/// age.
#[must_use]
pub fn evaluate(
    reported_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    threshold: Duration,
) -> Liveness {
    let Some(reported_at) = reported_at else {
        return Liveness::never_reported();
    };

    let age_seconds = u64::try_from((now - reported_at).num_seconds()).unwrap_or(0);

    Liveness {
        age_seconds: Some(age_seconds),
        is_live: classify(age_seconds, threshold),
    }
}
