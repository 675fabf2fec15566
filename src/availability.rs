//! Availability over a set of probe records

use crate::probe::ProbeRecord;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Availability of an endpoint and the earliest record it was computed from
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct AvailabilityRange {
    pub availability: f64,
    pub window_start: DateTime<Utc>,
}

/// Compute availability for `records` measured at `origin`.
///
/// An empty set yields an availability of 0 anchored at `origin`; callers
/// tell it apart from a measured outage through the anchor. Records are not
/// assumed to be sorted.
pub fn availability(records: &[ProbeRecord], origin: DateTime<Utc>) -> AvailabilityRange {
    let Some(window_start) = records.iter().map(|r| r.timestamp).min() else {
        return AvailabilityRange {
            availability: 0.0,
            window_start: origin,
        };
    };

    let successes = records.iter().filter(|r| r.success).count();

    AvailabilityRange {
        availability: successes as f64 / records.len() as f64,
        window_start,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use std::time::Duration;

    fn record(origin: DateTime<Utc>, secs_ago: i64, success: bool) -> ProbeRecord {
        let status = if success { 200 } else { 500 };
        ProbeRecord::answered(
            "https://example.com",
            origin - TimeDelta::seconds(secs_ago),
            status,
            Duration::from_millis(120),
            Duration::from_millis(40),
        )
    }

    #[test]
    fn test_empty_window_anchors_at_origin() {
        let origin = Utc::now();
        let range = availability(&[], origin);
        assert_eq!(range.availability, 0.0);
        assert_eq!(range.window_start, origin);
    }

    #[test]
    fn test_ratio_is_exact() {
        let origin = Utc::now();
        let records: Vec<_> = (1..=9).map(|i| record(origin, i, i % 3 != 0)).collect();

        let range = availability(&records, origin);
        assert_eq!(range.availability, 6.0 / 9.0);
        assert!((0.0..=1.0).contains(&range.availability));
    }

    #[test]
    fn test_window_start_ignores_arrival_order() {
        let origin = Utc::now();
        // a slow probe issued earliest completes last
        let records = vec![
            record(origin, 3, true),
            record(origin, 1, true),
            record(origin, 8, false),
            record(origin, 5, true),
        ];

        let range = availability(&records, origin);
        assert_eq!(range.window_start, origin - TimeDelta::seconds(8));
        assert_eq!(range.availability, 0.75);
    }

    #[test]
    fn test_all_failed_is_zero_with_real_anchor() {
        let origin = Utc::now();
        let records = vec![record(origin, 4, false), record(origin, 2, false)];

        let range = availability(&records, origin);
        assert_eq!(range.availability, 0.0);
        assert_ne!(range.window_start, origin);
    }
}
