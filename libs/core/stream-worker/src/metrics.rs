//! Prometheus metrics for stream workers

use crate::error::StreamError;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::time::Duration;
use tracing::info;

static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the global Prometheus recorder. Later calls are no-ops.
pub fn init_metrics() -> Result<(), StreamError> {
    PROMETHEUS_HANDLE
        .get_or_try_init(|| {
            let handle = PrometheusBuilder::new().install_recorder()?;
            info!("Prometheus metrics initialized");
            Ok::<_, metrics_exporter_prometheus::BuildError>(handle)
        })
        .map(|_| ())
        .map_err(|e| StreamError::Config(format!("failed to install Prometheus recorder: {}", e)))
}

pub fn metrics_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

/// How a delivered entry ended. Every status is acked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Success,
    /// The processor returned an error; the job is not retried
    Dropped,
    /// The payload could not be decoded
    Malformed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Success => "success",
            JobStatus::Dropped => "dropped",
            JobStatus::Malformed => "malformed",
        }
    }
}

pub fn record_job_processed(stream: &str, status: JobStatus) {
    counter!(
        "stream_worker_jobs_processed_total",
        "stream" => stream.to_string(),
        "status" => status.as_str()
    )
    .increment(1);
}

pub fn record_job_duration(stream: &str, duration: Duration) {
    histogram!(
        "stream_worker_job_duration_seconds",
        "stream" => stream.to_string()
    )
    .record(duration.as_secs_f64());
}

pub fn record_batch_size(stream: &str, size: usize) {
    histogram!(
        "stream_worker_batch_size",
        "stream" => stream.to_string()
    )
    .record(size as f64);
}

pub fn set_in_flight_jobs(stream: &str, count: usize) {
    gauge!(
        "stream_worker_in_flight_jobs",
        "stream" => stream.to_string()
    )
    .set(count as f64);
}

pub fn record_claimed(stream: &str, count: usize) {
    counter!(
        "stream_worker_entries_claimed_total",
        "stream" => stream.to_string()
    )
    .increment(count as u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_labels() {
        assert_eq!(JobStatus::Success.as_str(), "success");
        assert_eq!(JobStatus::Dropped.as_str(), "dropped");
        assert_eq!(JobStatus::Malformed.as_str(), "malformed");
    }

    #[test]
    fn test_recording_without_recorder_is_harmless() {
        record_job_processed("test:stream", JobStatus::Dropped);
        record_batch_size("test:stream", 3);
        set_in_flight_jobs("test:stream", 1);
    }
}
