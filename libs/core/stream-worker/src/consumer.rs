//! Consumer-group reads, claims and acks

use crate::config::WorkerConfig;
use crate::error::StreamError;
use crate::event::StreamEvent;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisResult};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, info, warn};

type StreamEntries = Vec<(String, Vec<(String, String)>)>;
type StreamReply = Vec<(String, StreamEntries)>;

/// One entry handed to the worker.
#[derive(Debug)]
pub enum Delivery<J> {
    Job(StreamEvent<J>),
    /// The entry has no `job` field or its JSON does not decode into `J`.
    /// It is acked like any other entry.
    Malformed { stream_id: String, error: String },
}

impl<J> Delivery<J> {
    pub fn stream_id(&self) -> &str {
        match self {
            Delivery::Job(event) => &event.stream_id,
            Delivery::Malformed { stream_id, .. } => stream_id,
        }
    }
}

#[derive(Clone)]
pub struct StreamConsumer {
    redis: Arc<ConnectionManager>,
    config: WorkerConfig,
}

impl StreamConsumer {
    pub fn new(redis: Arc<ConnectionManager>, config: WorkerConfig) -> Self {
        Self { redis, config }
    }

    pub fn stream_name(&self) -> &str {
        &self.config.stream_name
    }

    pub fn consumer_id(&self) -> &str {
        &self.config.consumer_id
    }

    /// `XGROUP CREATE ... MKSTREAM`; an existing group is fine.
    pub async fn init_consumer_group(&self) -> Result<(), StreamError> {
        let mut conn = (*self.redis).clone();

        let result: RedisResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => {
                info!(
                    stream = %self.config.stream_name,
                    group = %self.config.consumer_group,
                    "Created consumer group"
                );
                Ok(())
            }
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!(
                    stream = %self.config.stream_name,
                    group = %self.config.consumer_group,
                    "Consumer group already exists"
                );
                Ok(())
            }
            Err(e) => Err(StreamError::Redis(e)),
        }
    }

    /// Blocking read of entries never delivered to this group.
    pub async fn read_new<J: DeserializeOwned>(
        &self,
        count: usize,
    ) -> Result<Vec<Delivery<J>>, StreamError> {
        let mut conn = (*self.redis).clone();

        let reply: Option<StreamReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_id)
            .arg("BLOCK")
            .arg(self.config.block_ms)
            .arg("COUNT")
            .arg(count)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">")
            .query_async(&mut conn)
            .await?;

        // None: BLOCK timed out with nothing to read
        Ok(reply
            .into_iter()
            .flatten()
            .flat_map(|(_stream, entries)| decode_entries(entries))
            .collect())
    }

    pub async fn ack(&self, stream_id: &str) -> Result<(), StreamError> {
        let mut conn = (*self.redis).clone();

        let _: i64 = redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(stream_id)
            .query_async(&mut conn)
            .await?;

        debug!(stream_id = %stream_id, "Acknowledged entry");
        Ok(())
    }

    /// Take over one page of entries left unacked longer than the claim
    /// timeout by consumers that died mid-job.
    ///
    /// `after` is the cursor returned by the previous page (`None` starts at
    /// the head of the pending list).
    pub async fn claim_abandoned<J: DeserializeOwned>(
        &self,
        after: Option<&str>,
        count: usize,
    ) -> Result<ClaimPage<J>, StreamError> {
        let mut conn = (*self.redis).clone();

        // (id, consumer, idle ms, delivery count)
        let pending: Vec<(String, String, i64, i64)> = redis::cmd("XPENDING")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("IDLE")
            .arg(self.config.claim_timeout_ms)
            .arg(pending_range_start(after))
            .arg("+")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        let next = next_cursor(&pending, count);
        if pending.is_empty() {
            return Ok(ClaimPage {
                deliveries: vec![],
                next,
            });
        }

        let claim_ids: Vec<&str> = pending.iter().map(|(id, ..)| id.as_str()).collect();

        // Same min-idle as the XPENDING filter: an entry another worker
        // claimed in between is left alone.
        let entries: StreamEntries = redis::cmd("XCLAIM")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_id)
            .arg(self.config.claim_timeout_ms)
            .arg(&claim_ids)
            .query_async(&mut conn)
            .await?;

        let deliveries = decode_entries(entries);
        if !deliveries.is_empty() {
            warn!(
                count = deliveries.len(),
                stream = %self.config.stream_name,
                "Claimed abandoned entries"
            );
        }
        Ok(ClaimPage { deliveries, next })
    }

    /// Length and group backlog, for `/stream/info`.
    pub async fn stream_info(&self) -> Result<StreamInfo, StreamError> {
        let mut conn = (*self.redis).clone();

        let length: i64 = conn.xlen(&self.config.stream_name).await?;

        let summary: RedisResult<(i64, Option<String>, Option<String>, Option<Vec<(String, String)>>)> =
            redis::cmd("XPENDING")
                .arg(&self.config.stream_name)
                .arg(&self.config.consumer_group)
                .query_async(&mut conn)
                .await;

        Ok(StreamInfo {
            stream_name: self.config.stream_name.clone(),
            consumer_group: self.config.consumer_group.clone(),
            length,
            pending_count: summary.map(|(count, ..)| count).unwrap_or(0),
        })
    }
}

/// Entries claimed by one [`StreamConsumer::claim_abandoned`] call.
#[derive(Debug)]
pub struct ClaimPage<J> {
    pub deliveries: Vec<Delivery<J>>,
    /// Cursor for the next page; `None` once the pending list is exhausted
    pub next: Option<String>,
}

/// `-` for the first page, otherwise exclusive of the last id seen.
fn pending_range_start(after: Option<&str>) -> String {
    match after {
        Some(id) => format!("({}", id),
        None => "-".to_string(),
    }
}

/// A full page may have more behind it.
fn next_cursor(pending: &[(String, String, i64, i64)], count: usize) -> Option<String> {
    if pending.len() < count {
        return None;
    }
    pending.last().map(|(id, ..)| id.clone())
}

fn decode_entries<J: DeserializeOwned>(entries: StreamEntries) -> Vec<Delivery<J>> {
    entries
        .into_iter()
        .map(|(stream_id, fields)| decode_entry(stream_id, &fields))
        .collect()
}

fn decode_entry<J: DeserializeOwned>(stream_id: String, fields: &[(String, String)]) -> Delivery<J> {
    let Some((_, json)) = fields.iter().find(|(k, _)| k == "job") else {
        return Delivery::Malformed {
            stream_id,
            error: format!(
                "missing 'job' field (fields: {:?})",
                fields.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>()
            ),
        };
    };

    match serde_json::from_str::<J>(json) {
        Ok(job) => Delivery::Job(StreamEvent::new(stream_id, job)),
        Err(e) => Delivery::Malformed {
            stream_id,
            error: e.to_string(),
        },
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StreamInfo {
    pub stream_name: String,
    pub consumer_group: String,
    pub length: i64,
    pub pending_count: i64,
}
