//! Probe records and time utilities

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Status code a probe must return to count as successful
pub const HEALTHY_STATUS: u16 = 200;

/// What a single probe observed
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The endpoint answered with this HTTP status
    Status(u16),
    /// The request never produced a response
    Failure(String),
}

impl ProbeOutcome {
    /// Key used in status code histograms
    pub fn histogram_key(&self) -> String {
        match self {
            ProbeOutcome::Status(code) => code.to_string(),
            ProbeOutcome::Failure(_) => "error".to_string(),
        }
    }
}

impl std::fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeOutcome::Status(code) => write!(f, "{}", code),
            ProbeOutcome::Failure(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Immutable outcome of one health check
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProbeRecord {
    pub endpoint: String,
    pub timestamp: DateTime<Utc>,
    pub outcome: ProbeOutcome,
    pub success: bool,
    pub load_time: Duration,
    pub time_to_first_byte: Duration,
}

impl ProbeRecord {
    /// Record for a probe that received a response
    pub fn answered(
        endpoint: impl Into<String>,
        timestamp: DateTime<Utc>,
        status: u16,
        load_time: Duration,
        time_to_first_byte: Duration,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            timestamp,
            outcome: ProbeOutcome::Status(status),
            success: status == HEALTHY_STATUS,
            load_time,
            time_to_first_byte,
        }
    }

    /// Record for a probe that failed before any response arrived
    pub fn failed(
        endpoint: impl Into<String>,
        timestamp: DateTime<Utc>,
        reason: impl Into<String>,
        load_time: Duration,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            timestamp,
            outcome: ProbeOutcome::Failure(reason.into()),
            success: false,
            load_time,
            time_to_first_byte: Duration::ZERO,
        }
    }

    /// Age of the record relative to `now`
    pub fn age(&self, now: DateTime<Utc>) -> TimeDelta {
        now.signed_duration_since(self.timestamp)
    }
}

/// Convert a configured interval into window arithmetic units
pub fn to_time_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

/// Stable human readable timestamp used in alert messages
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S UTC").to_string()
}
