//! Counters exported through the `metrics` facade.
//!
//! Nothing is recorded unless the application installs a recorder.

use metrics::counter;

pub const ITEMS_PROCESSED: &str = "stagewire_stage_items_processed_total";
pub const ITEMS_FAILED: &str = "stagewire_stage_items_failed_total";
pub const ITEMS_EMITTED: &str = "stagewire_source_items_emitted_total";

pub(crate) fn record_processed(stage: &str) {
    counter!(ITEMS_PROCESSED, "stage" => stage.to_string()).increment(1);
}

pub(crate) fn record_failed(stage: &str) {
    counter!(ITEMS_FAILED, "stage" => stage.to_string()).increment(1);
}

pub(crate) fn record_emitted() {
    counter!(ITEMS_EMITTED).increment(1);
}
