//! Stream Worker Framework
//!
//! Redis Streams plumbing shared by the background workers.
//!
//! ## Features
//!
//! - **Generic worker**: `StreamWorker<J, P>` feeds any job type to a `StreamProcessor<J>`
//! - **Consumer groups**: horizontal scaling, abandoned entries claimed by a periodic sweep
//! - **At-most-once**: every delivered entry is acked once handled, whether the
//!   processor succeeded, failed or the payload could not be decoded. Failures
//!   are counted, never retried.
//! - **Prometheus metrics** and **health endpoints** for Kubernetes probes
//!
//! ## Example
//!
//! ```ignore
//! use stream_worker::{StreamDef, StreamWorker, WorkerConfig};
//!
//! struct SyncStream;
//! impl StreamDef for SyncStream {
//!     const STREAM_NAME: &'static str = "knowledge:vector_tasks";
//!     const CONSUMER_GROUP: &'static str = "rag_workers";
//! }
//!
//! let config = WorkerConfig::from_stream_def::<SyncStream>();
//! let worker = StreamWorker::new(redis, Arc::new(processor), config);
//! worker.run(shutdown_rx).await?;
//! ```

mod config;
mod consumer;
mod error;
mod event;
mod health;
pub mod metrics;
mod producer;
mod registry;
mod worker;

pub use config::WorkerConfig;
pub use consumer::{ClaimPage, Delivery, StreamConsumer, StreamInfo};
pub use error::StreamError;
pub use event::StreamEvent;
pub use health::{HealthState, ReadinessProbe, health_router};
pub use metrics::{JobStatus, init_metrics};
pub use producer::StreamProducer;
pub use registry::StreamDef;
pub use worker::{StreamJob, StreamProcessor, StreamWorker};
