//! Prometheus metrics exposition
//!
//! The harvester is a batch job, so metrics are not served. When
//! `output.metrics_textfile` is set the rendered exposition is written there
//! at the end of each run, for node_exporter's text-file collector.
//!
//! Counters are emitted by the libraries:
//!
//! - `mp_http_requests_total` (counter): label `outcome`
//! - `mp_http_retries_total` (counter)
//! - `mp_token_refresh_total` (counter): label `result`
//! - `mp_crawl_pages_total` (counter)
//! - `mp_enrich_items_total` (counter): label `result`
//! - `mp_run_total` (counter): labels `command`, `exit_code`

use std::path::Path;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_recorder() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Record how a command finished.
pub fn record_run(command: &'static str, exit_code: u8) {
    metrics::counter!("mp_run_total", "command" => command, "exit_code" => exit_code.to_string())
        .increment(1);
}

/// Write the current exposition to `path` via a sibling temp file and a
/// rename, so the collector never reads a partial file.
pub async fn write_textfile(handle: &PrometheusHandle, path: &Path) -> std::io::Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "metrics.prom".into());
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));
    tokio::fs::write(&tmp, handle.render()).await?;
    tokio::fs::rename(&tmp, path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusRecorder;

    /// Create an isolated recorder/handle pair for unit tests.
    /// Uses build_recorder() instead of install_recorder() to avoid the
    /// global recorder singleton constraint.
    fn isolated_recorder() -> (PrometheusRecorder, PrometheusHandle) {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        (recorder, handle)
    }

    #[test]
    fn record_run_does_not_panic_without_recorder() {
        record_run("run", 0);
    }

    #[tokio::test]
    async fn textfile_contains_rendered_counters() {
        let (recorder, handle) = isolated_recorder();
        metrics::with_local_recorder(&recorder, || {
            record_run("check-session", 1);
            mp_harvest::metrics::record_page();
        });

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mp_harvest.prom");
        write_textfile(&handle, &path).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("mp_run_total{command=\"check-session\",exit_code=\"1\"} 1"));
        assert!(text.contains("mp_crawl_pages_total 1"));
        assert!(!dir.path().join(".mp_harvest.prom.tmp").exists());
    }

    #[tokio::test]
    async fn textfile_write_fails_for_missing_directory() {
        let (_recorder, handle) = isolated_recorder();
        let result = write_textfile(&handle, Path::new("/nonexistent/dir/mp.prom")).await;
        assert!(result.is_err());
    }
}
