//! Availability monitor orchestrating probing, windows, alerting and reports

use crate::alerting::EndpointEvaluator;
use crate::config::Config;
use crate::dashboard::{ViewOutput, run_view};
use crate::errors::{MonitorError, Result};
use crate::prober::{HttpProber, run_probe_loop};
use crate::sink::{AlertQueue, AlertSink, LogSink, dispatch_alerts};
use crate::window::{RecordSource, WindowedAggregator};

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::task::{Id, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// How a supervised task ended
#[derive(Debug)]
enum TaskExit {
    Probe { endpoint: String, result: Result<()> },
    Evaluator { endpoint: String, result: Result<()> },
    Dispatcher { failed_deliveries: u64 },
    Eviction,
    View,
}

/// Per-endpoint tasks, kept so a panic can be traced back to its endpoint
#[derive(Debug, Clone, Copy, PartialEq)]
enum TaskKind {
    Poller,
    Evaluator,
}

#[derive(Debug, Clone)]
struct EndpointTask {
    kind: TaskKind,
    endpoint: String,
}

/// Outcome of a monitor run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonitorReport {
    /// Endpoints whose evaluation stopped on an error or a panic, with its cause
    pub halted_evaluators: Vec<(String, String)>,
    /// Endpoints whose probing stopped on an error or a panic, with its cause
    pub failed_probes: Vec<(String, String)>,
    pub failed_deliveries: u64,
    pub dropped_alerts: u64,
}

/// Wires the pipeline together and supervises its tasks
pub struct AvailabilityMonitor {
    config: Config,
    aggregator: Arc<WindowedAggregator>,
    queue: Arc<AlertQueue>,
    prober: HttpProber,
    sink: Arc<dyn AlertSink>,
    view_output: ViewOutput,
    monitor_id: String,
    token: CancellationToken,
}

impl AvailabilityMonitor {
    /// Create a monitor; the configuration is validated here
    pub fn new(config: Config) -> Result<Self> {
        config.validate().map_err(MonitorError::Config)?;

        let prober = HttpProber::new(config.http_timeout())?;
        let queue = Arc::new(AlertQueue::new(config.alert_queue_capacity));

        Ok(Self {
            config,
            aggregator: Arc::new(WindowedAggregator::new()),
            queue,
            prober,
            sink: Arc::new(LogSink),
            view_output: ViewOutput::Log,
            monitor_id: Uuid::new_v4().to_string(),
            token: CancellationToken::new(),
        })
    }

    pub fn with_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_view_output(mut self, output: ViewOutput) -> Self {
        self.view_output = output;
        self
    }

    pub fn aggregator(&self) -> Arc<WindowedAggregator> {
        Arc::clone(&self.aggregator)
    }

    /// Cancelling this token stops the whole pipeline
    pub fn shutdown_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Run until Ctrl-C
    pub async fn start(&self) -> Result<MonitorReport> {
        self.run_until(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Shutdown signal received"),
                Err(e) => error!("Failed to wait for shutdown signal: {}", e),
            }
        })
        .await
    }

    /// Run until `shutdown` resolves or the shutdown token is cancelled
    #[instrument(skip_all, fields(monitor_id = %self.monitor_id))]
    pub async fn run_until<F>(&self, shutdown: F) -> Result<MonitorReport>
    where
        F: Future<Output = ()>,
    {
        info!(
            "Starting availability monitor for {} endpoints",
            self.config.websites.len()
        );

        for website in &self.config.websites {
            self.aggregator
                .register(&website.url, self.config.retention_for(website))
                .await;
        }

        let mut tasks = JoinSet::new();
        let mut endpoint_tokens = HashMap::new();
        let mut endpoint_tasks = HashMap::new();

        for website in &self.config.websites {
            let endpoint_token = self.token.child_token();
            endpoint_tokens.insert(website.url.clone(), endpoint_token.clone());

            let endpoint = website.url.clone();
            let probe = run_probe_loop(
                website.clone(),
                self.prober.clone(),
                Arc::clone(&self.aggregator),
                endpoint_token.clone(),
            );
            let handle = tasks.spawn(async move {
                TaskExit::Probe {
                    endpoint,
                    result: probe.await,
                }
            });
            endpoint_tasks.insert(
                handle.id(),
                EndpointTask {
                    kind: TaskKind::Poller,
                    endpoint: website.url.clone(),
                },
            );

            let endpoint = website.url.clone();
            let evaluator = EndpointEvaluator::new(
                website.url.clone(),
                self.config.lag_bound_for(website),
                self.config.alerting.clone(),
                Arc::clone(&self.aggregator) as Arc<dyn RecordSource>,
            );
            let queue = Arc::clone(&self.queue);
            let handle = tasks.spawn(async move {
                TaskExit::Evaluator {
                    endpoint,
                    result: evaluator.run(queue, endpoint_token).await,
                }
            });
            endpoint_tasks.insert(
                handle.id(),
                EndpointTask {
                    kind: TaskKind::Evaluator,
                    endpoint: website.url.clone(),
                },
            );
        }

        let aggregator = Arc::clone(&self.aggregator);
        let every = self.config.eviction_interval();
        let token = self.token.clone();
        tasks.spawn(async move {
            aggregator.run_eviction(every, token).await;
            TaskExit::Eviction
        });

        let dispatcher = dispatch_alerts(
            Arc::clone(&self.queue),
            Arc::clone(&self.sink),
            self.token.clone(),
        );
        tasks.spawn(async move {
            TaskExit::Dispatcher {
                failed_deliveries: dispatcher.await,
            }
        });

        for view in &self.config.dashboard {
            let reporter = run_view(
                view.clone(),
                self.view_output,
                Arc::clone(&self.aggregator),
                self.token.clone(),
            );
            tasks.spawn(async move {
                reporter.await;
                TaskExit::View
            });
        }

        let mut report = MonitorReport::default();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = self.token.cancelled() => break,
                Some(joined) = tasks.join_next() => {
                    Self::record_exit(joined, &endpoint_tasks, &endpoint_tokens, &mut report);
                }
            }
        }

        info!("Shutting down availability monitor");
        self.token.cancel();

        while let Some(joined) = tasks.join_next().await {
            Self::record_exit(joined, &endpoint_tasks, &endpoint_tokens, &mut report);
        }

        report.dropped_alerts = self.queue.dropped();
        if report.dropped_alerts > 0 {
            warn!("{} alerts were dropped on queue overflow", report.dropped_alerts);
        }

        info!(
            halted_evaluators = report.halted_evaluators.len(),
            failed_probes = report.failed_probes.len(),
            failed_deliveries = report.failed_deliveries,
            dropped_alerts = report.dropped_alerts,
            "Availability monitor shutdown complete"
        );

        Ok(report)
    }

    fn record_exit(
        joined: std::result::Result<TaskExit, JoinError>,
        endpoint_tasks: &HashMap<Id, EndpointTask>,
        endpoint_tokens: &HashMap<String, CancellationToken>,
        report: &mut MonitorReport,
    ) {
        let exit = match joined {
            Ok(exit) => exit,
            Err(e) => match endpoint_tasks.get(&e.id()) {
                Some(task) => {
                    let cause = format!("task panicked: {}", e);
                    match task.kind {
                        TaskKind::Poller => {
                            Self::polling_stopped(task.endpoint.clone(), cause, endpoint_tokens, report)
                        }
                        TaskKind::Evaluator => Self::evaluator_halted(task.endpoint.clone(), cause, report),
                    }
                    return;
                }
                None => {
                    error!("Monitor task panicked: {}", e);
                    return;
                }
            },
        };

        match exit {
            TaskExit::Probe {
                endpoint,
                result: Err(e),
            } => Self::polling_stopped(endpoint, e.to_string(), endpoint_tokens, report),
            TaskExit::Evaluator {
                endpoint,
                result: Err(e),
            } => Self::evaluator_halted(endpoint, e.to_string(), report),
            TaskExit::Dispatcher { failed_deliveries } => {
                report.failed_deliveries = failed_deliveries;
            }
            TaskExit::Probe { .. }
            | TaskExit::Evaluator { .. }
            | TaskExit::Eviction
            | TaskExit::View => {}
        }
    }

    fn polling_stopped(
        endpoint: String,
        cause: String,
        endpoint_tokens: &HashMap<String, CancellationToken>,
        report: &mut MonitorReport,
    ) {
        error!(endpoint = %endpoint, "Monitoring stopped: {}", cause);
        // nothing feeds this endpoint's window anymore
        if let Some(token) = endpoint_tokens.get(&endpoint) {
            token.cancel();
        }
        report.failed_probes.push((endpoint, cause));
    }

    fn evaluator_halted(endpoint: String, cause: String, report: &mut MonitorReport) {
        error!(endpoint = %endpoint, "Evaluation halted, endpoint state unknown: {}", cause);
        report.halted_evaluators.push((endpoint, cause));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::{Alert, AlertState};
    use crate::config::{AlertConfig, Website};
    use crate::ProbeRecord;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::Mutex;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct CollectingSink {
        alerts: Mutex<Vec<Alert>>,
    }

    #[async_trait]
    impl AlertSink for CollectingSink {
        async fn deliver(&self, alert: &Alert) -> Result<()> {
            self.alerts.lock().await.push(alert.clone());
            Ok(())
        }
    }

    fn fast_config(urls: &[String]) -> Config {
        Config {
            websites: urls.iter().map(|url| Website::new(url.clone(), 1)).collect(),
            alerting: AlertConfig {
                availability_interval_secs: 2,
                availability_threshold: 0.8,
                check_interval_secs: 1,
            },
            dashboard: Vec::new(),
            eviction_interval_secs: 1,
            ..Config::default()
        }
    }

    #[test]
    fn test_invalid_config_is_rejected_before_start() {
        let result = AvailabilityMonitor::new(Config::default());
        assert!(matches!(result, Err(MonitorError::Config(_))));
    }

    /// Resolves once `done` holds, or after `limit` so a broken run still ends
    async fn wait_until<F, Fut>(limit: Duration, mut done: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        let waiting = async {
            while !done().await {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        };
        let _ = tokio::time::timeout(limit, waiting).await;
    }

    #[tokio::test]
    async fn test_failing_endpoint_raises_down_alert() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let sink = Arc::new(CollectingSink::default());
        let monitor = AvailabilityMonitor::new(fast_config(&[server.uri()]))
            .unwrap()
            .with_sink(sink.clone());

        let alerts = Arc::clone(&sink);
        let report = monitor
            .run_until(wait_until(Duration::from_secs(20), move || {
                let alerts = Arc::clone(&alerts);
                async move { !alerts.alerts.lock().await.is_empty() }
            }))
            .await
            .unwrap();

        // hysteresis itself is covered with explicit instants in alerting
        let alerts = sink.alerts.lock().await;
        assert!(!alerts.is_empty());
        assert!(alerts.iter().all(|a| a.state == AlertState::Down));
        assert_eq!(alerts[0].endpoint, server.uri());
        assert_eq!(alerts[0].availability, 0.0);
        assert_eq!(report, MonitorReport::default());
    }

    #[tokio::test]
    async fn test_healthy_endpoint_stays_quiet() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let sink = Arc::new(CollectingSink::default());
        let monitor = AvailabilityMonitor::new(fast_config(&[server.uri()]))
            .unwrap()
            .with_sink(sink.clone());

        let aggregator = monitor.aggregator();
        let endpoint = server.uri();
        let report = monitor
            .run_until(wait_until(Duration::from_secs(20), move || {
                let aggregator = Arc::clone(&aggregator);
                let endpoint = endpoint.clone();
                async move { aggregator.len(&endpoint).await.is_ok_and(|len| len >= 4) }
            }))
            .await
            .unwrap();

        assert!(sink.alerts.lock().await.is_empty());
        assert!(monitor.aggregator().len(&server.uri()).await.unwrap() >= 4);
        assert_eq!(report, MonitorReport::default());
    }

    struct CrashingSource;

    #[async_trait]
    impl RecordSource for CrashingSource {
        async fn snapshot(
            &self,
            _endpoint: &str,
            _origin: chrono::DateTime<chrono::Utc>,
            _timeframe: Duration,
        ) -> Result<Vec<ProbeRecord>> {
            panic!("record store corrupted");
        }
    }

    const ENDPOINT: &str = "https://example.com";

    #[tokio::test(start_paused = true)]
    async fn test_panicked_evaluator_is_reported() {
        let alerting = AlertConfig {
            availability_interval_secs: 10,
            availability_threshold: 0.8,
            check_interval_secs: 1,
        };
        let evaluator = EndpointEvaluator::new(
            ENDPOINT,
            Duration::from_secs(1),
            alerting,
            Arc::new(CrashingSource),
        );
        let queue = Arc::new(AlertQueue::new(4));

        let mut tasks = JoinSet::new();
        let handle = tasks.spawn(async move {
            TaskExit::Evaluator {
                endpoint: ENDPOINT.to_string(),
                result: evaluator.run(queue, CancellationToken::new()).await,
            }
        });
        let endpoint_tasks = HashMap::from([(
            handle.id(),
            EndpointTask {
                kind: TaskKind::Evaluator,
                endpoint: ENDPOINT.to_string(),
            },
        )]);

        let joined = tasks.join_next().await.unwrap();
        assert!(joined.as_ref().is_err_and(|e| e.is_panic()));

        let mut report = MonitorReport::default();
        AvailabilityMonitor::record_exit(joined, &endpoint_tasks, &HashMap::new(), &mut report);

        assert_eq!(report.halted_evaluators.len(), 1);
        assert_eq!(report.halted_evaluators[0].0, ENDPOINT);
        assert!(report.halted_evaluators[0].1.contains("panicked"));
        assert!(report.failed_probes.is_empty());
    }

    async fn crashed_poller() -> TaskExit {
        panic!("request loop crashed");
    }

    #[tokio::test]
    async fn test_panicked_request_loop_stops_its_evaluator() {
        let mut tasks = JoinSet::new();
        let handle = tasks.spawn(crashed_poller());
        let endpoint_tasks = HashMap::from([(
            handle.id(),
            EndpointTask {
                kind: TaskKind::Poller,
                endpoint: ENDPOINT.to_string(),
            },
        )]);
        let token = CancellationToken::new();
        let endpoint_tokens = HashMap::from([(ENDPOINT.to_string(), token.clone())]);

        let joined = tasks.join_next().await.unwrap();
        let mut report = MonitorReport::default();
        AvailabilityMonitor::record_exit(joined, &endpoint_tasks, &endpoint_tokens, &mut report);

        assert_eq!(report.failed_probes.len(), 1);
        assert_eq!(report.failed_probes[0].0, ENDPOINT);
        assert!(token.is_cancelled());
        assert!(report.halted_evaluators.is_empty());
    }
}
