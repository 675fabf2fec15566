//! Latency and status statistics for an endpoint window

use crate::availability::availability;
use crate::probe::ProbeRecord;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Derived statistics for one endpoint over a timeframe
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EndpointStats {
    pub endpoint: String,
    pub samples: usize,
    pub availability: f64,
    pub avg_load_time: Duration,
    pub max_load_time: Duration,
    pub avg_time_to_first_byte: Duration,
    pub max_time_to_first_byte: Duration,
    pub status_codes: BTreeMap<String, usize>,
}

impl EndpointStats {
    pub fn from_records(endpoint: &str, records: &[ProbeRecord], origin: DateTime<Utc>) -> Self {
        let mut status_codes = BTreeMap::new();
        let mut total_load = Duration::ZERO;
        let mut max_load_time = Duration::ZERO;
        let mut total_ttfb = Duration::ZERO;
        let mut max_time_to_first_byte = Duration::ZERO;

        for record in records {
            *status_codes.entry(record.outcome.histogram_key()).or_insert(0) += 1;

            total_load += record.load_time;
            max_load_time = max_load_time.max(record.load_time);

            total_ttfb += record.time_to_first_byte;
            max_time_to_first_byte = max_time_to_first_byte.max(record.time_to_first_byte);
        }

        let samples = records.len();
        let (avg_load_time, avg_time_to_first_byte) = if samples > 0 {
            (total_load / samples as u32, total_ttfb / samples as u32)
        } else {
            (Duration::ZERO, Duration::ZERO)
        };

        Self {
            endpoint: endpoint.to_string(),
            samples,
            availability: availability(records, origin).availability,
            avg_load_time,
            max_load_time,
            avg_time_to_first_byte,
            max_time_to_first_byte,
            status_codes,
        }
    }

    /// Histogram rendered as `(200:8 503:1)`
    pub fn status_summary(&self) -> String {
        let parts: Vec<String> = self
            .status_codes
            .iter()
            .map(|(code, count)| format!("{}:{}", code, count))
            .collect();
        format!("({})", parts.join(" "))
    }
}
