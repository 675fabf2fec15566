//! Endpoint Availability Monitor Library
//!
//! This library probes HTTP endpoints, keeps time-bounded windows of the
//! outcomes, and raises alerts when an endpoint's availability crosses the
//! configured threshold.

pub mod alerting;
pub mod availability;
pub mod config;
pub mod dashboard;
pub mod errors;
pub mod monitor;
pub mod probe;
pub mod prober;
pub mod sink;
pub mod stats;
pub mod window;

pub use alerting::{Alert, AlertState, EndpointEvaluator, EndpointState};
pub use availability::{AvailabilityRange, availability};
pub use config::Config;
pub use errors::{MonitorError, Result};
pub use monitor::{AvailabilityMonitor, MonitorReport};
pub use probe::{ProbeOutcome, ProbeRecord};
pub use window::{RecordSource, WindowedAggregator};
