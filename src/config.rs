//! Configuration management for the availability monitor

use crate::errors::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::path::Path;
use std::time::Duration;

/// Longest cadence accepted for any periodic task, in seconds
pub const MAX_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// Longest span accepted for windows and retention, in seconds
pub const MAX_SPAN_SECS: u64 = 30 * MAX_INTERVAL_SECS;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Endpoints to probe
    pub websites: Vec<Website>,

    /// Availability alerting rules
    pub alerting: AlertConfig,

    /// Periodic statistics views
    pub dashboard: Vec<ViewConfig>,

    /// Cadence of the window eviction sweep, in seconds
    #[serde(rename = "evictionInterval")]
    pub eviction_interval_secs: u64,

    /// Capacity of the alert queue before the oldest alert is dropped
    #[serde(rename = "alertQueueCapacity")]
    pub alert_queue_capacity: usize,

    /// HTTP timeout for a single probe, in seconds
    #[serde(rename = "httpTimeout")]
    pub http_timeout_secs: u64,
}

/// A monitored endpoint. The URL is its identity across the whole pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Website {
    pub url: String,

    /// Seconds between two probes
    #[serde(rename = "checkInterval")]
    pub check_interval_secs: u64,

    /// How long records are kept; defaults to the longest configured timeframe
    #[serde(rename = "retention", default, skip_serializing_if = "Option::is_none")]
    pub retention_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertConfig {
    /// Span availability is computed over, in seconds
    #[serde(rename = "availabilityInterval")]
    pub availability_interval_secs: u64,

    /// Availability at or below which an endpoint is reported down
    #[serde(rename = "availabilityThreshold")]
    pub availability_threshold: f64,

    /// Seconds between two evaluations
    #[serde(rename = "checkInterval")]
    pub check_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ViewConfig {
    #[serde(rename = "updateInterval")]
    pub update_interval_secs: u64,

    #[serde(rename = "timeFrame")]
    pub timeframe_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            websites: Vec::new(),
            alerting: AlertConfig::default(),
            dashboard: vec![
                ViewConfig {
                    update_interval_secs: 10,
                    timeframe_secs: 600,
                },
                ViewConfig {
                    update_interval_secs: 60,
                    timeframe_secs: 3600,
                },
            ],
            eviction_interval_secs: 10,
            alert_queue_capacity: 64,
            http_timeout_secs: 10,
        }
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            availability_interval_secs: 120,
            availability_threshold: 0.8,
            check_interval_secs: 10,
        }
    }
}

impl Website {
    pub fn new(url: impl Into<String>, check_interval_secs: u64) -> Self {
        Self {
            url: url.into(),
            check_interval_secs,
            retention_secs: None,
        }
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

impl AlertConfig {
    pub fn availability_interval(&self) -> Duration {
        Duration::from_secs(self.availability_interval_secs)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

impl ViewConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }

    pub fn timeframe(&self) -> Duration {
        Duration::from_secs(self.timeframe_secs)
    }
}

impl Config {
    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Override scalar settings from environment variables
    pub fn apply_env(&mut self) {
        if let Ok(threshold) = env::var("ALERT_THRESHOLD") {
            if let Ok(value) = threshold.parse() {
                self.alerting.availability_threshold = value;
            }
        }

        if let Ok(interval) = env::var("ALERT_CHECK_INTERVAL_SECONDS") {
            if let Ok(seconds) = interval.parse() {
                self.alerting.check_interval_secs = seconds;
            }
        }

        if let Ok(interval) = env::var("AVAILABILITY_INTERVAL_SECONDS") {
            if let Ok(seconds) = interval.parse() {
                self.alerting.availability_interval_secs = seconds;
            }
        }

        if let Ok(interval) = env::var("EVICTION_INTERVAL_SECONDS") {
            if let Ok(seconds) = interval.parse() {
                self.eviction_interval_secs = seconds;
            }
        }

        if let Ok(capacity) = env::var("ALERT_QUEUE_CAPACITY") {
            if let Ok(size) = capacity.parse() {
                self.alert_queue_capacity = size;
            }
        }

        if let Ok(timeout) = env::var("HTTP_TIMEOUT_SECONDS") {
            if let Ok(seconds) = timeout.parse() {
                self.http_timeout_secs = seconds;
            }
        }
    }

    pub fn eviction_interval(&self) -> Duration {
        Duration::from_secs(self.eviction_interval_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Retention for an endpoint: its own setting, else the longest span anything reads
    pub fn retention_for(&self, website: &Website) -> Duration {
        let longest_view = self
            .dashboard
            .iter()
            .map(|view| view.timeframe_secs)
            .max()
            .unwrap_or(0);

        let secs = website
            .retention_secs
            .unwrap_or_else(|| longest_view.max(self.alerting.availability_interval_secs));
        Duration::from_secs(secs)
    }

    /// Widest lag the alert guard accepts for `website`.
    ///
    /// Records land one check apart, and a request that runs into the HTTP
    /// timeout pushes the next check back. The bound is the evaluation
    /// cadence, widened to the check interval or the timeout when larger.
    pub fn lag_bound_for(&self, website: &Website) -> Duration {
        self.alerting
            .check_interval()
            .max(website.check_interval())
            .max(self.http_timeout())
    }

    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.websites.is_empty() {
            return Err("at least one website must be specified".to_string());
        }

        let mut seen = HashSet::new();
        for website in &self.websites {
            if website.url.trim().is_empty() {
                return Err("website url cannot be empty".to_string());
            }

            if !seen.insert(website.url.as_str()) {
                return Err(format!("website {} is configured twice", website.url));
            }

            if website.check_interval_secs == 0 || website.check_interval_secs > MAX_INTERVAL_SECS {
                return Err(format!(
                    "checkInterval of {} must be between 1 and {} seconds",
                    website.url, MAX_INTERVAL_SECS
                ));
            }

            if website.retention_secs.is_some_and(|secs| secs > MAX_SPAN_SECS) {
                return Err(format!(
                    "retention of {} cannot exceed {} seconds",
                    website.url, MAX_SPAN_SECS
                ));
            }

            if self.retention_for(website) < self.alerting.availability_interval() {
                return Err(format!(
                    "retention of {} is shorter than the availability interval",
                    website.url
                ));
            }
        }

        if self.alerting.availability_interval_secs == 0
            || self.alerting.availability_interval_secs > MAX_SPAN_SECS
        {
            return Err(format!(
                "availabilityInterval must be between 1 and {} seconds",
                MAX_SPAN_SECS
            ));
        }

        if self.alerting.check_interval_secs == 0 || self.alerting.check_interval_secs > MAX_INTERVAL_SECS {
            return Err(format!(
                "alerting checkInterval must be between 1 and {} seconds",
                MAX_INTERVAL_SECS
            ));
        }

        if !(0.0..=1.0).contains(&self.alerting.availability_threshold) {
            return Err("availabilityThreshold must be between 0 and 1".to_string());
        }

        for view in &self.dashboard {
            if view.update_interval_secs == 0 || view.timeframe_secs == 0 {
                return Err("dashboard views need a positive updateInterval and timeFrame".to_string());
            }

            if view.update_interval_secs > MAX_INTERVAL_SECS || view.timeframe_secs > MAX_SPAN_SECS {
                return Err(format!(
                    "dashboard views allow at most {}s updateInterval and {}s timeFrame",
                    MAX_INTERVAL_SECS, MAX_SPAN_SECS
                ));
            }
        }

        if self.eviction_interval_secs == 0 || self.eviction_interval_secs > MAX_INTERVAL_SECS {
            return Err(format!(
                "evictionInterval must be between 1 and {} seconds",
                MAX_INTERVAL_SECS
            ));
        }

        if self.alert_queue_capacity == 0 {
            return Err("alertQueueCapacity must be greater than 0".to_string());
        }

        if self.http_timeout_secs == 0 || self.http_timeout_secs > MAX_INTERVAL_SECS {
            return Err(format!(
                "httpTimeout must be between 1 and {} seconds",
                MAX_INTERVAL_SECS
            ));
        }

        Ok(())
    }
}
