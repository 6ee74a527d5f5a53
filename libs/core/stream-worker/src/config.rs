//! Worker configuration

use crate::registry::StreamDef;
use std::time::Duration;
use uuid::Uuid;

const MIN_CLAIM_INTERVAL_MS: u64 = 1_000;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub stream_name: String,
    pub consumer_group: String,
    /// Unique per process; defaults to `worker-<uuid>`
    pub consumer_id: String,
    /// Entries read per `XREADGROUP`
    pub batch_size: usize,
    /// `XREADGROUP BLOCK` timeout; also bounds how long shutdown waits for a read
    pub block_ms: u64,
    pub max_concurrent_jobs: usize,
    /// Minimum idle time before another consumer's pending entry may be claimed
    pub claim_timeout_ms: u64,
}

impl WorkerConfig {
    pub fn from_stream_def<S: StreamDef>() -> Self {
        Self {
            claim_timeout_ms: S::CLAIM_TIMEOUT_MS,
            ..Self::new(S::STREAM_NAME, S::CONSUMER_GROUP)
        }
    }

    pub fn new(stream_name: impl Into<String>, consumer_group: impl Into<String>) -> Self {
        Self {
            stream_name: stream_name.into(),
            consumer_group: consumer_group.into(),
            consumer_id: format!("worker-{}", Uuid::new_v4()),
            batch_size: 10,
            block_ms: 1000,
            max_concurrent_jobs: 1,
            claim_timeout_ms: 60_000,
        }
    }

    pub fn with_consumer_id(mut self, id: impl Into<String>) -> Self {
        self.consumer_id = id.into();
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn with_blocking(mut self, block_ms: u64) -> Self {
        self.block_ms = block_ms;
        self
    }

    pub fn with_max_concurrent_jobs(mut self, count: usize) -> Self {
        self.max_concurrent_jobs = count.max(1);
        self
    }

    pub fn with_claim_timeout_ms(mut self, timeout: u64) -> Self {
        self.claim_timeout_ms = timeout;
        self
    }

    /// How often the pending list is swept for abandoned entries: half the
    /// claim timeout, so an entry waits at most 1.5x the timeout.
    pub fn claim_interval(&self) -> Duration {
        Duration::from_millis((self.claim_timeout_ms / 2).max(MIN_CLAIM_INTERVAL_MS))
    }
}
