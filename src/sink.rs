//! Bounded alert queue and alert sinks

use crate::alerting::{Alert, AlertState};
use crate::errors::{MonitorError, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Receiver of formatted alerts
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn deliver(&self, alert: &Alert) -> Result<()>;
}

/// Queue between evaluators and the sink.
///
/// Pushing never waits on the consumer: once `capacity` alerts are pending
/// the oldest one is dropped and counted.
#[derive(Debug)]
pub struct AlertQueue {
    alerts: Mutex<VecDeque<Alert>>,
    capacity: usize,
    dropped: AtomicU64,
    notify: Notify,
}

impl AlertQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            alerts: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            dropped: AtomicU64::new(0),
            notify: Notify::new(),
        }
    }

    /// Enqueue an alert, dropping the oldest pending one when full
    pub async fn push(&self, alert: Alert) {
        {
            let mut alerts = self.alerts.lock().await;

            if alerts.len() >= self.capacity {
                if let Some(lost) = alerts.pop_front() {
                    let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    warn!(
                        endpoint = %lost.endpoint,
                        dropped_total = total,
                        "Alert queue overflow, dropping oldest alert"
                    );
                }
            }

            alerts.push_back(alert);
            debug!("Queued alert, pending: {}", alerts.len());
        }

        self.notify.notify_one();
    }

    /// Take every pending alert in arrival order
    pub async fn drain(&self) -> Vec<Alert> {
        self.alerts.lock().await.drain(..).collect()
    }

    pub async fn len(&self) -> usize {
        self.alerts.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Alerts lost to overflow so far
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    async fn wait(&self) {
        self.notify.notified().await;
    }
}

/// Forward queued alerts to `sink` until cancelled.
///
/// Pending alerts are flushed before returning. Returns the number of
/// deliveries that failed.
pub async fn dispatch_alerts(
    queue: Arc<AlertQueue>,
    sink: Arc<dyn AlertSink>,
    token: CancellationToken,
) -> u64 {
    let mut failures = 0;

    loop {
        let stopping = tokio::select! {
            _ = token.cancelled() => true,
            _ = queue.wait() => false,
        };

        for alert in queue.drain().await {
            if let Err(e) = sink.deliver(&alert).await {
                failures += 1;
                error!(endpoint = %alert.endpoint, "Failed to deliver alert: {}", e);
            }
        }

        if stopping {
            info!(
                failed_deliveries = failures,
                dropped = queue.dropped(),
                "Alert dispatcher stopped"
            );
            return failures;
        }
    }
}

/// Emits alerts as structured log events
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl AlertSink for LogSink {
    async fn deliver(&self, alert: &Alert) -> Result<()> {
        match alert.state {
            AlertState::Down => warn!(
                endpoint = %alert.endpoint,
                state = %alert.state,
                availability = alert.availability,
                "{}", alert
            ),
            AlertState::Up => info!(
                endpoint = %alert.endpoint,
                state = %alert.state,
                availability = alert.availability,
                "{}", alert
            ),
        }
        Ok(())
    }
}

/// Writes one line per alert to stdout
#[derive(Debug, Default)]
pub struct StdoutSink;

#[async_trait]
impl AlertSink for StdoutSink {
    async fn deliver(&self, alert: &Alert) -> Result<()> {
        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(format!("{}\n", alert).as_bytes())
            .await
            .map_err(|e| MonitorError::Sink(e.to_string()))?;
        stdout
            .flush()
            .await
            .map_err(|e| MonitorError::Sink(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::Duration;

    fn alert(endpoint: &str, state: AlertState) -> Alert {
        Alert {
            endpoint: endpoint.to_string(),
            state,
            availability: 0.5,
            at: Utc::now(),
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        delivered: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AlertSink for RecordingSink {
        async fn deliver(&self, alert: &Alert) -> Result<()> {
            self.delivered.lock().await.push(alert.endpoint.clone());
            Ok(())
        }
    }

    struct BrokenSink;

    #[async_trait]
    impl AlertSink for BrokenSink {
        async fn deliver(&self, _alert: &Alert) -> Result<()> {
            Err(MonitorError::Sink("dashboard gone".to_string()))
        }
    }

    #[tokio::test]
    async fn test_overflow_drops_oldest() {
        let queue = AlertQueue::new(2);

        for endpoint in ["https://a.test", "https://b.test", "https://c.test"] {
            queue.push(alert(endpoint, AlertState::Down)).await;
        }

        assert_eq!(queue.dropped(), 1);
        let pending: Vec<String> = queue.drain().await.into_iter().map(|a| a.endpoint).collect();
        assert_eq!(pending, vec!["https://b.test", "https://c.test"]);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_dispatch_delivers_in_order_and_flushes_on_stop() {
        let queue = Arc::new(AlertQueue::new(16));
        let sink = Arc::new(RecordingSink::default());
        let token = CancellationToken::new();

        let task = tokio::spawn(dispatch_alerts(
            Arc::clone(&queue),
            sink.clone() as Arc<dyn AlertSink>,
            token.clone(),
        ));

        queue.push(alert("https://a.test", AlertState::Down)).await;
        queue.push(alert("https://b.test", AlertState::Up)).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        queue.push(alert("https://c.test", AlertState::Down)).await;
        token.cancel();

        let failures = task.await.unwrap();
        assert_eq!(failures, 0);
        assert_eq!(
            *sink.delivered.lock().await,
            vec!["https://a.test", "https://b.test", "https://c.test"]
        );
    }

    #[tokio::test]
    async fn test_dispatch_counts_failed_deliveries() {
        let queue = Arc::new(AlertQueue::new(16));
        let token = CancellationToken::new();

        queue.push(alert("https://a.test", AlertState::Down)).await;
        queue.push(alert("https://b.test", AlertState::Down)).await;
        token.cancel();

        let failures = dispatch_alerts(queue, Arc::new(BrokenSink), token).await;
        assert_eq!(failures, 2);
    }

    #[tokio::test]
    async fn test_log_sink_accepts_both_polarities() {
        let sink = LogSink;
        tokio_test::assert_ok!(sink.deliver(&alert("https://a.test", AlertState::Down)).await);
        tokio_test::assert_ok!(sink.deliver(&alert("https://a.test", AlertState::Up)).await);
    }
}
