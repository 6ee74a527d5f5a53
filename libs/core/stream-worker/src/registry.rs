//! Stream definitions.

/// Compile-time description of one stream and the group that consumes it.
///
/// Producers and workers both build from the same `StreamDef`, so the
/// stream name and trim length cannot drift apart.
///
/// ```rust,ignore
/// pub struct VectorTaskStream;
///
/// impl StreamDef for VectorTaskStream {
///     const STREAM_NAME: &'static str = "knowledge:vector_tasks";
///     const CONSUMER_GROUP: &'static str = "rag_workers";
/// }
/// ```
pub trait StreamDef: Send + Sync {
    const STREAM_NAME: &'static str;

    const CONSUMER_GROUP: &'static str;

    /// Approximate cap applied on every `XADD` (`MAXLEN ~`).
    const MAX_LENGTH: i64 = 100_000;

    /// Entries pending longer than this are claimed by the periodic sweep.
    const CLAIM_TIMEOUT_MS: u64 = 60_000;

    fn stream_name() -> &'static str {
        Self::STREAM_NAME
    }

    fn consumer_group() -> &'static str {
        Self::CONSUMER_GROUP
    }
}
