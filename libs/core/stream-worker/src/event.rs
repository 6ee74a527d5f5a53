//! A decoded job together with its stream entry metadata

use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct StreamEvent<J> {
    /// Redis entry ID, `<ms>-<seq>`
    pub stream_id: String,
    pub job: J,
    /// Enqueue time, taken from the entry ID
    pub timestamp: DateTime<Utc>,
}

impl<J> StreamEvent<J> {
    pub fn new(stream_id: String, job: J) -> Self {
        let timestamp = parse_timestamp(&stream_id);
        Self {
            stream_id,
            job,
            timestamp,
        }
    }

    /// Time spent in the stream before this worker picked the entry up.
    pub fn age_ms(&self) -> i64 {
        (Utc::now() - self.timestamp).num_milliseconds()
    }
}

fn parse_timestamp(stream_id: &str) -> DateTime<Utc> {
    stream_id
        .split('-')
        .next()
        .and_then(|ts| ts.parse::<i64>().ok())
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or_else(Utc::now)
}
