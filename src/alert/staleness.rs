/// Preference snapshot staleness detection.
///
/// The evaluator always uses the latest snapshot the poller published. If
/// the backend has been unreachable for a while that snapshot can be old,
/// and alerts are then gated by preferences the user may already have
/// changed. This module measures that window so the pipeline can flag it.
///
/// # Clock injection
/// All functions accept a `now: DateTime<Utc>` parameter rather than calling
/// `Utc::now()` internally, which keeps staleness deterministic in tests.

use chrono::{DateTime, Utc};

use crate::ingest::preferences::PreferenceSnapshot;

/// Age of the snapshot in whole seconds at `now`. A snapshot stamped in the
/// future (clock skew) has age 0.
pub fn snapshot_age_secs(snapshot: &PreferenceSnapshot, now: DateTime<Utc>) -> u64 {
    (now - snapshot.fetched_at).num_seconds().max(0) as u64
}

/// Returns `true` if the snapshot is older than `max_age_secs` at `now`.
///
/// Staleness is strictly greater than the threshold:
///   age > max_age_secs  →  stale
///   age == max_age_secs →  not stale
pub fn is_stale_at(snapshot: &PreferenceSnapshot, max_age_secs: u64, now: DateTime<Utc>) -> bool {
    snapshot_age_secs(snapshot, now) > max_age_secs
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
