//! Domain counters, exported through the worker's Prometheus recorder.

use metrics::counter;

use crate::error::DropReason;

/// An event that was acknowledged without being applied. A non-zero rate
/// means the index is drifting from the relational store.
pub fn record_dropped(action: &str, reason: DropReason) {
    counter!(
        "rag_sync_events_dropped_total",
        "action" => action.to_string(),
        "reason" => reason.as_ref().to_string()
    )
    .increment(1);
}

/// The LLM gave no usable answer and the local heuristic was used.
pub fn record_llm_fallback(operation: &'static str) {
    counter!("rag_llm_fallback_total", "operation" => operation).increment(1);
}
