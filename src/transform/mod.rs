//! Merge step: concatenates per-symbol extracts into one ordered batch.

use crate::models::{PriceRecord, RecordBatch};
use tracing::info;

/// Concatenate per-symbol batches in the order given.
///
/// No dedup and no re-sort: callers pass batches in configured symbol order
/// and the output preserves it verbatim. Total over its input; an empty
/// input list yields an empty batch.
pub fn merge(batches: Vec<RecordBatch>) -> RecordBatch {
    let merged: RecordBatch = batches.into_iter().flatten().collect();
    info!(
        "Merged batch ({} records):\n{}",
        merged.len(),
        render(&merged)
    );
    merged
}

/// Pretty-printed JSON rendering of a batch for run logs.
pub fn render(batch: &[PriceRecord]) -> String {
    serde_json::to_string_pretty(batch).unwrap_or_else(|e| format!("<unrenderable batch: {}>", e))
}
