use crate::constants::METRICS_PORT_ENV_VAR;
use std::net::SocketAddr;
use tracing::{info, warn};

/// Install the Prometheus exporter when `COVID_ETL_METRICS_PORT` is set.
/// Without a recorder the metric macros below are no-ops.
pub fn init() {
    let port: u16 = match std::env::var(METRICS_PORT_ENV_VAR)
        .ok()
        .and_then(|s| s.trim().parse().ok())
    {
        Some(p) => p,
        None => {
            info!("Metrics exporter disabled ({} not set)", METRICS_PORT_ENV_VAR);
            return;
        }
    };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr);
    match builder.install() {
        Ok(()) => info!("Prometheus exporter listening on http://{}/metrics", addr),
        Err(e) => warn!("Prometheus exporter install failed (possibly already installed): {}", e),
    }
}

// ============================================================================
// Extract Metrics
// ============================================================================

pub mod extract {
    pub fn records_extracted(source: &str, count: usize) {
        ::metrics::counter!("covid_etl_extract_records_total", "source" => source.to_string())
            .increment(count as u64);
    }

    pub fn extract_error(source: &str) {
        ::metrics::counter!("covid_etl_extract_errors_total", "source" => source.to_string())
            .increment(1);
    }
}

// ============================================================================
// Stage Metrics
// ============================================================================

pub mod stages {
    pub fn transformed(stage: &str) {
        ::metrics::counter!("covid_etl_stage_runs_total", "stage" => stage.to_string(), "outcome" => "transformed")
            .increment(1);
    }

    pub fn unchanged(stage: &str) {
        ::metrics::counter!("covid_etl_stage_runs_total", "stage" => stage.to_string(), "outcome" => "unchanged")
            .increment(1);
    }

    /// The stage failed and its input was kept
    pub fn fallback(stage: &str) {
        ::metrics::counter!("covid_etl_stage_fallbacks_total", "stage" => stage.to_string())
            .increment(1);
    }
}

// ============================================================================
// Validation Metrics
// ============================================================================

pub mod validation {
    pub fn dataset_validated(dataset: &str, passed: bool) {
        let outcome = if passed { "passed" } else { "failed" };
        ::metrics::counter!("covid_etl_validations_total", "dataset" => dataset.to_string(), "outcome" => outcome)
            .increment(1);
    }

    pub fn expectations_evaluated(total: usize, failed: usize) {
        ::metrics::histogram!("covid_etl_expectations_per_report").record(total as f64);
        ::metrics::counter!("covid_etl_expectations_failed_total").increment(failed as u64);
    }
}

// ============================================================================
// Load Metrics
// ============================================================================

pub mod load {
    pub fn rows_loaded(table: &str, rows: usize) {
        ::metrics::counter!("covid_etl_rows_loaded_total", "table" => table.to_string())
            .increment(rows as u64);
    }

    pub fn load_error(table: &str) {
        ::metrics::counter!("covid_etl_load_errors_total", "table" => table.to_string()).increment(1);
    }

    pub fn dataset_quarantined(dataset: &str) {
        ::metrics::counter!("covid_etl_datasets_quarantined_total", "dataset" => dataset.to_string())
            .increment(1);
    }
}

// ============================================================================
// Task Metrics
// ============================================================================

pub mod tasks {
    pub fn duration(task: &str, secs: f64) {
        ::metrics::histogram!("covid_etl_task_duration_seconds", "task" => task.to_string()).record(secs);
    }

    pub fn failed(task: &str) {
        ::metrics::counter!("covid_etl_task_failures_total", "task" => task.to_string()).increment(1);
    }

    pub fn pipeline_run(success: bool) {
        let outcome = if success { "success" } else { "error" };
        ::metrics::counter!("covid_etl_pipeline_runs_total", "outcome" => outcome).increment(1);
    }
}
