//! Gesture pipeline metrics.
//!
//! Provides standardized metrics for monitoring the pipeline:
//! - Extraction and embedding latency histograms
//! - Similarity distribution and verdict counters by collection
//! - Model load counters

use metrics::{counter, histogram};

// =============================================================================
// Metric Names
// =============================================================================

/// Metric name constants for consistency.
pub mod names {
    /// Per-frame landmark extraction latency in seconds.
    pub const EXTRACTION_SECONDS: &str = "hearme_extraction_seconds";

    /// Embedding inference latency in seconds by collection.
    pub const EMBEDDING_SECONDS: &str = "hearme_embedding_seconds";

    /// Similarity scores by collection.
    pub const SIMILARITY: &str = "hearme_similarity";

    /// Total evaluations by collection and status.
    pub const EVALUATIONS_TOTAL: &str = "hearme_evaluations_total";

    /// Total model load attempts by collection and result.
    pub const MODEL_LOADS_TOTAL: &str = "hearme_model_loads_total";
}

// =============================================================================
// Recording Functions
// =============================================================================

/// Record one frame extraction.
pub fn record_extraction(latency_secs: f64) {
    histogram!(names::EXTRACTION_SECONDS).record(latency_secs);
}

/// Record one embedding inference.
pub fn record_embedding(collection: &str, latency_secs: f64) {
    histogram!(
        names::EMBEDDING_SECONDS,
        "collection" => collection.to_string()
    )
    .record(latency_secs);
}

/// Record a similarity evaluation and its outcome.
pub fn record_evaluation(collection: &str, similarity: f32, matched: bool) {
    histogram!(
        names::SIMILARITY,
        "collection" => collection.to_string()
    )
    .record(similarity as f64);

    counter!(
        names::EVALUATIONS_TOTAL,
        "collection" => collection.to_string(),
        "status" => if matched { "match" } else { "not_match" }
    )
    .increment(1);
}

/// Record an embedding model load attempt.
pub fn record_model_load(collection: &str, success: bool) {
    counter!(
        names::MODEL_LOADS_TOTAL,
        "collection" => collection.to_string(),
        "result" => if success { "ok" } else { "error" }
    )
    .increment(1);
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names() {
        assert!(names::EXTRACTION_SECONDS.starts_with("hearme_"));
        assert!(names::EVALUATIONS_TOTAL.ends_with("_total"));
        assert!(names::MODEL_LOADS_TOTAL.contains("model_loads"));
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_extraction(0.01);
        record_embedding("asl", 0.2);
        record_evaluation("asl", 0.7, true);
        record_model_load("asl", false);
    }
}
