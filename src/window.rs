//! Time-bounded in-memory windows of probe records

use crate::errors::{MonitorError, Result};
use crate::probe::{ProbeRecord, to_time_delta};
use crate::stats::EndpointStats;
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Source of probe records bounded by time
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Records for `endpoint` with `origin - timeframe <= timestamp <= origin`
    async fn snapshot(
        &self,
        endpoint: &str,
        origin: DateTime<Utc>,
        timeframe: Duration,
    ) -> Result<Vec<ProbeRecord>>;
}

/// Records of one endpoint in arrival order
#[derive(Debug)]
struct EndpointWindow {
    records: Vec<ProbeRecord>,
    retention: TimeDelta,
}

/// Per-endpoint record windows with independent eviction.
///
/// The endpoint map is only written on registration. Each endpoint's records
/// live behind their own mutex, so producers for different endpoints never
/// contend beyond the shared read lock.
#[derive(Debug, Default)]
pub struct WindowedAggregator {
    windows: RwLock<HashMap<String, Arc<Mutex<EndpointWindow>>>>,
}

impl WindowedAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an endpoint, or update the retention of a known one
    pub async fn register(&self, endpoint: &str, retention: Duration) {
        let retention = to_time_delta(retention);
        let mut windows = self.windows.write().await;

        let existing = windows.get(endpoint).cloned();
        match existing {
            Some(window) => {
                window.lock().await.retention = retention;
            }
            None => {
                windows.insert(
                    endpoint.to_string(),
                    Arc::new(Mutex::new(EndpointWindow {
                        records: Vec::new(),
                        retention,
                    })),
                );
            }
        }

        debug!(endpoint = %endpoint, retention_secs = retention.num_seconds(), "Registered endpoint window");
    }

    async fn window(&self, endpoint: &str) -> Result<Arc<Mutex<EndpointWindow>>> {
        let windows = self.windows.read().await;
        windows
            .get(endpoint)
            .cloned()
            .ok_or_else(|| MonitorError::UnknownEndpoint(endpoint.to_string()))
    }

    /// Append a record to its endpoint's window
    pub async fn ingest(&self, record: ProbeRecord) -> Result<()> {
        let window = self.window(&record.endpoint).await?;
        window.lock().await.records.push(record);
        Ok(())
    }

    /// Drop every record older than its endpoint's retention, returning how many went
    pub async fn evict(&self, now: DateTime<Utc>) -> usize {
        let windows: Vec<Arc<Mutex<EndpointWindow>>> =
            self.windows.read().await.values().cloned().collect();

        let mut evicted = 0;
        for window in windows {
            let mut window = window.lock().await;
            let retention = window.retention;
            let before = window.records.len();
            window.records.retain(|r| r.age(now) <= retention);
            evicted += before - window.records.len();
        }

        evicted
    }

    /// Records of `endpoint` within `[origin - timeframe, origin]`
    pub async fn snapshot(
        &self,
        endpoint: &str,
        origin: DateTime<Utc>,
        timeframe: Duration,
    ) -> Result<Vec<ProbeRecord>> {
        let window = self.window(endpoint).await?;
        let from = origin
            .checked_sub_signed(to_time_delta(timeframe))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let window = window.lock().await;
        Ok(window
            .records
            .iter()
            .filter(|r| r.timestamp >= from && r.timestamp <= origin)
            .cloned()
            .collect())
    }

    /// Statistics of `endpoint` over `[origin - timeframe, origin]`
    pub async fn stats(
        &self,
        endpoint: &str,
        origin: DateTime<Utc>,
        timeframe: Duration,
    ) -> Result<EndpointStats> {
        let records = self.snapshot(endpoint, origin, timeframe).await?;
        Ok(EndpointStats::from_records(endpoint, &records, origin))
    }

    /// Number of records currently held for `endpoint`
    pub async fn len(&self, endpoint: &str) -> Result<usize> {
        let window = self.window(endpoint).await?;
        let len = window.lock().await.records.len();
        Ok(len)
    }

    /// Registered endpoints, sorted
    pub async fn endpoints(&self) -> Vec<String> {
        let mut endpoints: Vec<String> = self.windows.read().await.keys().cloned().collect();
        endpoints.sort();
        endpoints
    }

    /// Evict on a fixed cadence until cancelled
    pub async fn run_eviction(&self, every: Duration, token: CancellationToken) {
        let mut ticker = interval(every);
        info!(interval_secs = every.as_secs(), "Starting window eviction");

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("Window eviction stopped");
                    return;
                }
                _ = ticker.tick() => {
                    let evicted = self.evict(Utc::now()).await;
                    if evicted > 0 {
                        debug!("Evicted {} stale records", evicted);
                    }
                }
            }
        }
    }
}

#[async_trait]
impl RecordSource for WindowedAggregator {
    async fn snapshot(
        &self,
        endpoint: &str,
        origin: DateTime<Utc>,
        timeframe: Duration,
    ) -> Result<Vec<ProbeRecord>> {
        WindowedAggregator::snapshot(self, endpoint, origin, timeframe).await
    }
}
