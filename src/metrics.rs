//! Aggregate request metrics: total count and a status-code/path
//! breakdown, periodically flushed to disk as JSON.
//!
//! Grounded on `original_source/micro/metrics.go`'s `metricsData`: no
//! per-request detail is retained, only counters.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Interval between automatic metrics flushes to disk.
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(20 * 60);

#[derive(Debug, Default, Serialize, Deserialize)]
struct Counters {
    #[serde(rename = "TotalRequests")]
    total_requests: u64,
    /// status code -> path -> count
    #[serde(rename = "Paths")]
    paths: HashMap<u16, HashMap<String, u64>>,
}

/// Thread-safe aggregate metrics store.
#[derive(Debug, Default)]
pub struct Metrics {
    enabled: bool,
    counters: Mutex<Counters>,
}

impl Metrics {
    /// An empty, disabled metrics store.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            counters: Mutex::new(Counters::default()),
        }
    }

    /// An empty, enabled metrics store.
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            counters: Mutex::new(Counters::default()),
        }
    }

    /// Load counters from a previously flushed JSON file, if it exists;
    /// otherwise start from zero.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(data) => match serde_json::from_str(&data) {
                Ok(counters) => Self {
                    enabled: true,
                    counters: Mutex::new(counters),
                },
                Err(_) => Self::enabled(),
            },
            Err(_) => Self::enabled(),
        }
    }

    /// Record one request's outcome, if metrics are enabled.
    pub fn record(&self, status: u16, path: &str) {
        if !self.enabled {
            return;
        }
        let mut counters = self.counters.lock();
        *counters
            .paths
            .entry(status)
            .or_default()
            .entry(path.to_string())
            .or_insert(0) += 1;
        counters.total_requests += 1;
    }

    /// Render the metrics page body (the table the reference renders
    /// inside its HTML page template).
    pub fn render_html(&self) -> String {
        let counters = self.counters.lock();
        let mut out = format!(
            "<h1>maguro metrics</h1><br><b>Total requests:</b> {}<br>",
            counters.total_requests
        );
        for (status, by_path) in counters.paths.iter() {
            out.push_str(&format!("<br><b>{status}</b><ul>"));
            for (path, count) in by_path.iter() {
                out.push_str(&format!("<li>Amount: {count} - Path: {path}</li>"));
            }
            out.push_str("</ul>");
        }
        out
    }

    /// Write the current counters to `path` as indented JSON.
    pub fn flush(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let counters = self.counters.lock();
        let data = serde_json::to_vec_pretty(&*counters)?;
        std::fs::write(path, data)
    }

    /// Run forever, flushing to `path` every [`FLUSH_INTERVAL`]. Intended
    /// to be spawned as its own task.
    pub async fn flush_loop(&self, path: PathBuf) {
        loop {
            tokio::time::sleep(FLUSH_INTERVAL).await;
            if let Err(err) = self.flush(&path) {
                tracing::error!(?err, path = %path.display(), "failed to flush metrics");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_metrics_do_not_record() {
        let metrics = Metrics::disabled();
        metrics.record(200, "/");
        assert!(metrics.render_html().contains("Total requests:</b> 0"));
    }

    #[test]
    fn enabled_metrics_count_by_status_and_path() {
        let metrics = Metrics::enabled();
        metrics.record(200, "/index.html");
        metrics.record(200, "/index.html");
        metrics.record(404, "/missing");
        let html = metrics.render_html();
        assert!(html.contains("Total requests:</b> 3"));
        assert!(html.contains("Amount: 2 - Path: /index.html"));
        assert!(html.contains("Amount: 1 - Path: /missing"));
    }

    #[test]
    fn flush_then_load_round_trips() {
        let path = std::env::temp_dir().join("maguro-metrics-test.json");
        let metrics = Metrics::enabled();
        metrics.record(200, "/a");
        metrics.flush(&path).unwrap();

        let reloaded = Metrics::load(&path);
        assert!(reloaded.render_html().contains("Total requests:</b> 1"));
        let _ = std::fs::remove_file(&path);
    }
}
