//! Worker metrics: reference cache outcomes and progress recording.

use metrics::counter;

/// Metric name constants for consistency.
pub mod names {
    /// Reference cache results by outcome.
    pub const CACHE_OUTCOMES_TOTAL: &str = "hearme_cache_outcomes_total";

    /// Progress writes that failed and were swallowed.
    pub const PROGRESS_FAILURES_TOTAL: &str = "hearme_progress_failures_total";

    /// Evaluations discarded after a lesson switch.
    pub const STALE_EVALUATIONS_TOTAL: &str = "hearme_stale_evaluations_total";
}

pub fn record_cache_outcome(outcome: &str) {
    counter!(names::CACHE_OUTCOMES_TOTAL, "outcome" => outcome.to_string()).increment(1);
}

pub fn record_progress_failure() {
    counter!(names::PROGRESS_FAILURES_TOTAL).increment(1);
}

pub fn record_stale_evaluation() {
    counter!(names::STALE_EVALUATIONS_TOTAL).increment(1);
}
