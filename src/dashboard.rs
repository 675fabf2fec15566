//! Periodic statistics reports

use crate::config::ViewConfig;
use crate::stats::EndpointStats;
use crate::window::WindowedAggregator;
use chrono::Utc;
use std::sync::Arc;
use tokio::time::{Instant, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Render statistics as a fixed-width table
pub fn render_table(view: &ViewConfig, stats: &[EndpointStats]) -> String {
    let mut out = format!(
        "Statistics for the last {}s (updated every {}s)\n",
        view.timeframe_secs, view.update_interval_secs
    );
    out.push_str(&format!(
        "{:<30} {:>12} {:>14} {:>14} {:>14} {}\n",
        "Website", "Availability", "Avg Response", "Max Response", "Avg TTFB", "Status Codes"
    ));

    for s in stats {
        out.push_str(&format!(
            "{:<30} {:>11.2}% {:>14} {:>14} {:>14} {}\n",
            s.endpoint,
            100.0 * s.availability,
            format!("{:?}", s.avg_load_time),
            format!("{:?}", s.max_load_time),
            format!("{:?}", s.avg_time_to_first_byte),
            s.status_summary()
        ));
    }

    out
}

/// Where a view sends its reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewOutput {
    /// One structured event per endpoint
    Log,
    /// A rendered table on stdout
    Table,
}

/// Report statistics of every endpoint for one view until cancelled
pub async fn run_view(
    view: ViewConfig,
    output: ViewOutput,
    aggregator: Arc<WindowedAggregator>,
    token: CancellationToken,
) {
    let period = view.update_interval();
    let Some(start) = Instant::now().checked_add(period) else {
        error!(update_interval_secs = view.update_interval_secs, "View update interval is out of range");
        return;
    };
    let mut ticker = interval_at(start, period);

    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let now = Utc::now();
        let mut stats = Vec::new();
        for endpoint in aggregator.endpoints().await {
            match aggregator.stats(&endpoint, now, view.timeframe()).await {
                Ok(s) => stats.push(s),
                Err(e) => error!(endpoint = %endpoint, "Failed to compute statistics: {}", e),
            }
        }

        match output {
            ViewOutput::Log => stats.iter().for_each(|s| log_stats(&view, s)),
            ViewOutput::Table => println!("{}", render_table(&view, &stats)),
        }
    }
}

fn log_stats(view: &ViewConfig, stats: &EndpointStats) {
    info!(
        endpoint = %stats.endpoint,
        timeframe_secs = view.timeframe_secs,
        samples = stats.samples,
        availability = stats.availability,
        avg_load_ms = stats.avg_load_time.as_millis() as u64,
        max_load_ms = stats.max_load_time.as_millis() as u64,
        avg_ttfb_ms = stats.avg_time_to_first_byte.as_millis() as u64,
        max_ttfb_ms = stats.max_time_to_first_byte.as_millis() as u64,
        status_codes = %stats.status_summary(),
        "Endpoint statistics"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeRecord;
    use chrono::TimeDelta;
    use std::time::Duration;

    #[test]
    fn test_render_table() {
        let now = Utc::now();
        let records = vec![
            ProbeRecord::answered(
                "https://a.test",
                now - TimeDelta::seconds(2),
                200,
                Duration::from_millis(100),
                Duration::from_millis(10),
            ),
            ProbeRecord::answered(
                "https://a.test",
                now - TimeDelta::seconds(1),
                404,
                Duration::from_millis(300),
                Duration::from_millis(30),
            ),
        ];
        let stats = vec![EndpointStats::from_records("https://a.test", &records, now)];
        let view = ViewConfig {
            update_interval_secs: 10,
            timeframe_secs: 600,
        };

        let table = render_table(&view, &stats);
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "Statistics for the last 600s (updated every 10s)");
        assert!(lines[2].starts_with("https://a.test"));
        assert!(lines[2].contains("50.00%"));
        assert!(lines[2].contains("200ms"));
        assert!(lines[2].ends_with("(200:1 404:1)"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_view_stops_on_cancel() {
        let aggregator = Arc::new(WindowedAggregator::new());
        aggregator.register("https://a.test", Duration::from_secs(60)).await;

        let token = CancellationToken::new();
        let view = ViewConfig {
            update_interval_secs: 1,
            timeframe_secs: 60,
        };
        let task = tokio::spawn(run_view(view, ViewOutput::Log, aggregator, token.clone()));

        tokio::time::sleep(Duration::from_secs(3)).await;
        token.cancel();
        task.await.unwrap();
    }
}
