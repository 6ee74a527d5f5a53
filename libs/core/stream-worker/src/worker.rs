//! Core worker traits and the generic StreamWorker implementation.

use crate::config::WorkerConfig;
use crate::consumer::{Delivery, StreamConsumer};
use crate::error::StreamError;
use crate::metrics::{self, JobStatus};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use serde::{Serialize, de::DeserializeOwned};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

const MAX_BACKOFF_SECS: u64 = 30;

/// Payload carried in the `job` field of a stream entry.
pub trait StreamJob: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Identifier used in logs.
    fn job_id(&self) -> String;
}

/// Domain handler for one job type.
///
/// ```rust,ignore
/// #[async_trait]
/// impl StreamProcessor<SyncRequest> for SyncDispatcher {
///     async fn process(&self, request: &SyncRequest) -> Result<(), StreamError> {
///         self.dispatch(request).await;
///         Ok(())
///     }
///
///     fn name(&self) -> &'static str {
///         "SyncDispatcher"
///     }
/// }
/// ```
#[async_trait]
pub trait StreamProcessor<J: StreamJob>: Send + Sync {
    /// Handle one job. An `Err` is logged and counted as dropped; the entry
    /// is acked either way and never redelivered.
    async fn process(&self, job: &J) -> Result<(), StreamError>;

    fn name(&self) -> &'static str;

    /// Called for entries that could not be decoded into `J`, before they are acked.
    fn on_malformed(&self, _stream_id: &str, _error: &str) {}
}

/// Reads a stream through a consumer group and runs each entry through a
/// processor exactly once.
///
/// Entries of a batch run concurrently, bounded by `max_concurrent_jobs`.
/// Each entry is acked as soon as it has been handled, success or not.
pub struct StreamWorker<J, P>
where
    J: StreamJob,
    P: StreamProcessor<J>,
{
    consumer: StreamConsumer,
    processor: Arc<P>,
    config: WorkerConfig,
    concurrency: Arc<Semaphore>,
    _job: PhantomData<fn() -> J>,
}

impl<J, P> StreamWorker<J, P>
where
    J: StreamJob,
    P: StreamProcessor<J> + 'static,
{
    pub fn new(redis: ConnectionManager, processor: Arc<P>, config: WorkerConfig) -> Self {
        let consumer = StreamConsumer::new(Arc::new(redis), config.clone());
        let concurrency = Arc::new(Semaphore::new(config.max_concurrent_jobs));

        Self {
            consumer,
            processor,
            config,
            concurrency,
            _job: PhantomData,
        }
    }

    pub fn consumer(&self) -> &StreamConsumer {
        &self.consumer
    }

    /// Run until `shutdown` flips to `true` (or its sender is dropped).
    /// A batch already in progress is finished before returning.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), StreamError> {
        info!(
            consumer_id = %self.config.consumer_id,
            stream = %self.config.stream_name,
            group = %self.config.consumer_group,
            processor = %self.processor.name(),
            block_ms = self.config.block_ms,
            batch_size = self.config.batch_size,
            max_concurrent_jobs = self.config.max_concurrent_jobs,
            claim_interval_secs = self.config.claim_interval().as_secs(),
            "Starting stream worker"
        );

        self.consumer.init_consumer_group().await?;

        let mut claim_schedule = ClaimSchedule::new(self.config.claim_interval());
        let mut consecutive_errors: u32 = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }

            if claim_schedule.is_due(Instant::now()) {
                self.sweep_abandoned(&shutdown).await;
                claim_schedule.mark(Instant::now());
            }

            let read = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                read = self.consumer.read_new::<J>(self.config.batch_size) => read,
            };

            match read {
                Ok(deliveries) => {
                    if consecutive_errors > 0 {
                        info!(consecutive_errors, "Stream connection recovered");
                        consecutive_errors = 0;
                    }
                    if !deliveries.is_empty() {
                        self.process_batch(deliveries).await;
                    }
                }
                Err(e) if e.is_timeout() => {
                    debug!("Read timed out, polling again");
                }
                Err(e) => {
                    consecutive_errors += 1;

                    if e.is_missing_group() {
                        warn!("Consumer group missing, recreating");
                        if let Err(create_err) = self.consumer.init_consumer_group().await {
                            error!(error = %create_err, "Failed to recreate consumer group");
                        }
                    }

                    let backoff =
                        Duration::from_secs(2u64.pow(consecutive_errors.min(5)).min(MAX_BACKOFF_SECS));
                    warn!(
                        error = %e,
                        consecutive_errors,
                        backoff_secs = backoff.as_secs(),
                        "Stream read failed, backing off"
                    );

                    tokio::select! {
                        _ = shutdown.changed() => {}
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        }

        info!(processor = %self.processor.name(), "Stream worker stopped");
        Ok(())
    }

    /// Claim and process every abandoned entry, one page at a time.
    async fn sweep_abandoned(&self, shutdown: &watch::Receiver<bool>) {
        let mut cursor: Option<String> = None;

        loop {
            let page = match self
                .consumer
                .claim_abandoned::<J>(cursor.as_deref(), self.config.batch_size)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    warn!(error = %e, "Failed to claim abandoned entries");
                    return;
                }
            };

            if !page.deliveries.is_empty() {
                metrics::record_claimed(&self.config.stream_name, page.deliveries.len());
                self.process_batch(page.deliveries).await;
            }

            match page.next {
                Some(next) if !*shutdown.borrow() => cursor = Some(next),
                _ => return,
            }
        }
    }

    async fn process_batch(&self, deliveries: Vec<Delivery<J>>) {
        let stream = self.config.stream_name.as_str();
        metrics::record_batch_size(stream, deliveries.len());

        let mut join_set = JoinSet::new();

        for delivery in deliveries {
            let Ok(permit) = Arc::clone(&self.concurrency).acquire_owned().await else {
                error!("Concurrency semaphore closed, abandoning batch");
                break;
            };
            metrics::set_in_flight_jobs(stream, self.in_flight());

            let processor = Arc::clone(&self.processor);
            let consumer = self.consumer.clone();

            join_set.spawn(async move {
                handle_delivery(processor.as_ref(), &consumer, delivery).await;
                drop(permit);
            });
        }

        while let Some(joined) = join_set.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Job task panicked");
            }
        }
        metrics::set_in_flight_jobs(stream, self.in_flight());
    }

    fn in_flight(&self) -> usize {
        self.config.max_concurrent_jobs - self.concurrency.available_permits()
    }
}

/// When the next sweep for abandoned entries is due. The first sweep runs
/// immediately at startup.
#[derive(Debug)]
struct ClaimSchedule {
    interval: Duration,
    last: Option<Instant>,
}

impl ClaimSchedule {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    fn is_due(&self, now: Instant) -> bool {
        match self.last {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        }
    }

    fn mark(&mut self, now: Instant) {
        self.last = Some(now);
    }
}

/// Run one delivery through the processor, record its outcome, then ack it.
pub(crate) async fn handle_delivery<J, P>(processor: &P, consumer: &StreamConsumer, delivery: Delivery<J>)
where
    J: StreamJob,
    P: StreamProcessor<J> + ?Sized,
{
    let stream = consumer.stream_name();

    let stream_id = match delivery {
        Delivery::Malformed { stream_id, error } => {
            warn!(
                stream_id = %stream_id,
                error = %error,
                processor = processor.name(),
                "Discarding undecodable entry"
            );
            processor.on_malformed(&stream_id, &error);
            metrics::record_job_processed(stream, JobStatus::Malformed);
            stream_id
        }
        Delivery::Job(event) => {
            let started = Instant::now();
            debug!(
                stream_id = %event.stream_id,
                job_id = %event.job.job_id(),
                age_ms = event.age_ms(),
                "Processing job"
            );

            let status = match processor.process(&event.job).await {
                Ok(()) => JobStatus::Success,
                Err(e) if e.is_reported_by_processor() => {
                    debug!(
                        stream_id = %event.stream_id,
                        job_id = %event.job.job_id(),
                        error = %e,
                        "Job dropped by processor"
                    );
                    JobStatus::Dropped
                }
                Err(e) => {
                    error!(
                        stream_id = %event.stream_id,
                        job_id = %event.job.job_id(),
                        error = %e,
                        kind = e.kind(),
                        "Job failed; dropping without retry"
                    );
                    JobStatus::Dropped
                }
            };

            metrics::record_job_processed(stream, status);
            metrics::record_job_duration(stream, started.elapsed());
            event.stream_id
        }
    };

    if let Err(e) = consumer.ack(&stream_id).await {
        error!(stream_id = %stream_id, error = %e, "Failed to ack entry");
    }
}
