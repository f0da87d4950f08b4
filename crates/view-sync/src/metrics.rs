use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
struct Counters {
    injected: AtomicU64,
    duplicates_skipped: AtomicU64,
    anchor_missing: AtomicU64,
    updates_in_place: AtomicU64,
    navigations: AtomicU64,
}

static COUNTERS: Lazy<Counters> = Lazy::new(Counters::default);

fn increment(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

pub fn record_injected() {
    increment(&COUNTERS.injected);
}

pub fn record_duplicate_skipped() {
    increment(&COUNTERS.duplicates_skipped);
}

pub fn record_anchor_missing() {
    increment(&COUNTERS.anchor_missing);
}

pub fn record_update_in_place() {
    increment(&COUNTERS.updates_in_place);
}

pub fn record_navigation() {
    increment(&COUNTERS.navigations);
}

#[derive(Clone, Debug, Default)]
pub struct SyncMetricsSnapshot {
    pub injected: u64,
    pub duplicates_skipped: u64,
    pub anchor_missing: u64,
    pub updates_in_place: u64,
    pub navigations: u64,
}

pub fn snapshot() -> SyncMetricsSnapshot {
    SyncMetricsSnapshot {
        injected: COUNTERS.injected.load(Ordering::Relaxed),
        duplicates_skipped: COUNTERS.duplicates_skipped.load(Ordering::Relaxed),
        anchor_missing: COUNTERS.anchor_missing.load(Ordering::Relaxed),
        updates_in_place: COUNTERS.updates_in_place.load(Ordering::Relaxed),
        navigations: COUNTERS.navigations.load(Ordering::Relaxed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Counters are process-global, so only monotonicity is asserted.
    #[test]
    fn counters_are_monotonic() {
        let before = snapshot();
        record_injected();
        record_duplicate_skipped();
        let after = snapshot();
        assert!(after.injected > before.injected);
        assert!(after.duplicates_skipped > before.duplicates_skipped);
    }
}
