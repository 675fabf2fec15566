//! HTTP probing of monitored endpoints

use crate::config::Website;
use crate::errors::{MonitorError, Result};
use crate::probe::ProbeRecord;
use crate::window::WindowedAggregator;
use chrono::Utc;
use reqwest::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Issues timed GET requests
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: Client,
    timeout: Duration,
}

impl HttpProber {
    pub fn new(http_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(http_timeout)
            .user_agent(format!("availability_monitor/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(MonitorError::Http)?;

        Ok(Self {
            client,
            timeout: http_timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Probe `url` once. Network failures become unsuccessful records.
    pub async fn probe(&self, url: &str) -> ProbeRecord {
        let timestamp = Utc::now();
        let start = Instant::now();

        let mut response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!("Probe of {} failed: {}", url, e);
                return ProbeRecord::failed(url, timestamp, e.to_string(), start.elapsed());
            }
        };

        // headers are in, the body is still streaming
        let time_to_first_byte = start.elapsed();
        let status = response.status().as_u16();

        // chunks are timed and dropped, never buffered
        let drained = loop {
            match response.chunk().await {
                Ok(Some(_)) => {}
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            }
        };

        match drained {
            Ok(()) => {
                ProbeRecord::answered(url, timestamp, status, start.elapsed(), time_to_first_byte)
            }
            Err(e) => {
                debug!("Reading body of {} failed: {}", url, e);
                let mut record =
                    ProbeRecord::failed(url, timestamp, e.to_string(), start.elapsed());
                record.time_to_first_byte = time_to_first_byte;
                record
            }
        }
    }
}

/// Probe `website` on its check interval and feed the aggregator until cancelled.
///
/// An ingest failure ends monitoring of this endpoint and is returned.
pub async fn run_probe_loop(
    website: Website,
    prober: HttpProber,
    aggregator: Arc<WindowedAggregator>,
    token: CancellationToken,
) -> Result<()> {
    let mut ticker = interval(website.check_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(endpoint = %website.url, interval_secs = website.check_interval_secs, "Starting probe loop");

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                info!(endpoint = %website.url, "Probe loop stopped");
                return Ok(());
            }
            _ = ticker.tick() => {}
        }

        let record = tokio::select! {
            _ = token.cancelled() => {
                info!(endpoint = %website.url, "Probe loop stopped mid-probe");
                return Ok(());
            }
            record = prober.probe(&website.url) => record,
        };

        if !record.success {
            warn!(endpoint = %website.url, outcome = %record.outcome, "Unhealthy probe");
        }

        aggregator.ingest(record).await?;
    }
}
