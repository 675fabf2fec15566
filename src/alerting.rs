//! Availability alerting with a freshness guard and hysteresis

use crate::availability::{AvailabilityRange, availability};
use crate::config::AlertConfig;
use crate::errors::{MonitorError, Result};
use crate::probe::format_timestamp;
use crate::sink::AlertQueue;
use crate::window::RecordSource;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

/// Announced health of an endpoint
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum AlertState {
    Up,
    Down,
}

impl std::fmt::Display for AlertState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertState::Up => write!(f, "up"),
            AlertState::Down => write!(f, "down"),
        }
    }
}

/// A state transition of one endpoint
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Alert {
    pub endpoint: String,
    pub state: AlertState,
    pub availability: f64,
    pub at: DateTime<Utc>,
}

impl std::fmt::Display for Alert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Website {} is {}. availability = {:.2}%, time = {}",
            self.endpoint,
            self.state,
            100.0 * self.availability,
            format_timestamp(self.at)
        )
    }
}

/// Seconds between the window anchor and the boundary the interval expects.
///
/// Negative when the anchor predates the boundary, above the lag bound
/// when the window has not filled up yet.
pub fn window_lag(range: &AvailabilityRange, t: DateTime<Utc>, availability_interval: Duration) -> i64 {
    let interval_secs = i64::try_from(availability_interval.as_secs()).unwrap_or(i64::MAX);
    range.window_start.timestamp() - t.timestamp().saturating_sub(interval_secs)
}

/// Last announced state of one endpoint
#[derive(Clone, Debug, PartialEq)]
pub struct EndpointState {
    endpoint: String,
    is_up: bool,
}

impl EndpointState {
    /// Endpoints start out assumed healthy
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_state(endpoint, AlertState::Up)
    }

    pub fn with_state(endpoint: impl Into<String>, state: AlertState) -> Self {
        Self {
            endpoint: endpoint.into(),
            is_up: state == AlertState::Up,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn state(&self) -> AlertState {
        if self.is_up { AlertState::Up } else { AlertState::Down }
    }

    /// Apply one evaluation, returning the alert if the state flipped.
    ///
    /// A transition is only considered when the window anchor lies within
    /// `[0, max_lag]` seconds of the expected boundary.
    pub fn transition(
        &mut self,
        range: &AvailabilityRange,
        t: DateTime<Utc>,
        config: &AlertConfig,
        max_lag: Duration,
    ) -> Option<Alert> {
        let lag = window_lag(range, t, config.availability_interval());
        let max_lag = i64::try_from(max_lag.as_secs()).unwrap_or(i64::MAX);

        if !(0..=max_lag).contains(&lag) {
            debug!(endpoint = %self.endpoint, lag, "Window not eligible for alerting");
            return None;
        }

        let healthy = range.availability > config.availability_threshold;
        if healthy == self.is_up {
            return None;
        }

        self.is_up = healthy;
        Some(Alert {
            endpoint: self.endpoint.clone(),
            state: self.state(),
            availability: range.availability,
            at: t,
        })
    }
}

/// Evaluation loop for a single endpoint
pub struct EndpointEvaluator {
    state: EndpointState,
    max_lag: Duration,
    config: AlertConfig,
    source: Arc<dyn RecordSource>,
}

impl EndpointEvaluator {
    /// `max_lag` must cover the widest spacing between two of the endpoint's
    /// records, see [`Config::lag_bound_for`](crate::config::Config::lag_bound_for)
    pub fn new(
        endpoint: impl Into<String>,
        max_lag: Duration,
        config: AlertConfig,
        source: Arc<dyn RecordSource>,
    ) -> Self {
        Self {
            state: EndpointState::new(endpoint),
            max_lag,
            config,
            source,
        }
    }

    pub fn endpoint(&self) -> &str {
        self.state.endpoint()
    }

    pub fn state(&self) -> AlertState {
        self.state.state()
    }

    /// Evaluate the endpoint as of `t`
    pub async fn tick(&mut self, t: DateTime<Utc>) -> Result<Option<Alert>> {
        let records = self
            .source
            .snapshot(self.state.endpoint(), t, self.config.availability_interval())
            .await
            .map_err(|e| {
                MonitorError::DataSource(format!("{}: {}", self.state.endpoint(), e))
            })?;

        let range = availability(&records, t);
        Ok(self
            .state
            .transition(&range, t, &self.config, self.max_lag))
    }

    /// Evaluate on the configured cadence, queueing alerts, until cancelled.
    ///
    /// Stops at the first failed evaluation and returns its error.
    #[instrument(skip_all, fields(endpoint = %self.state.endpoint()))]
    pub async fn run(mut self, queue: Arc<AlertQueue>, token: CancellationToken) -> Result<()> {
        let period = self.config.check_interval();
        let start = Instant::now()
            .checked_add(period)
            .ok_or_else(|| MonitorError::Config(format!("checkInterval of {}s is out of range", period.as_secs())))?;
        let mut ticker = interval_at(start, period);
        info!(interval_secs = period.as_secs(), "Starting availability evaluation");

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("Availability evaluation stopped");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    match self.tick(Utc::now()).await {
                        Ok(Some(alert)) => queue.push(alert).await,
                        Ok(None) => {}
                        Err(e) => {
                            error!("Availability evaluation halted: {}", e);
                            return Err(e);
                        }
                    }
                }
            }
        }
    }
}
