use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

pub const FETCHES: &str = "fetches";
pub const FETCH_FAILURES: &str = "fetch_failures";
pub const BACKGROUND_FAILURES: &str = "background_failures";
pub const DELETES: &str = "deletes";
pub const DELETE_FAILURES: &str = "delete_failures";
pub const TIMERS_STARTED: &str = "timers_started";
pub const ACTIVE_POLLS: &str = "active_polls";

#[derive(Debug, Default)]
struct MetricsInner {
    counters: BTreeMap<&'static str, u64>,
    gauges: BTreeMap<&'static str, i64>,
    gauge_peaks: BTreeMap<&'static str, i64>,
}

/// Shared counters and gauges for the polling controller.
///
/// Sorted maps keep snapshots stable across runs.
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    inner: Arc<Mutex<MetricsInner>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub counters: Vec<(String, u64)>,
    pub gauges: Vec<(String, i64)>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MetricsInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn inc_counter(&self, name: &'static str) {
        *self.lock().counters.entry(name).or_insert(0) += 1;
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.lock().counters.get(name).copied().unwrap_or(0)
    }

    pub fn add_gauge(&self, name: &'static str, delta: i64) {
        let mut inner = self.lock();
        let value = {
            let gauge = inner.gauges.entry(name).or_insert(0);
            *gauge += delta;
            *gauge
        };
        let peak = inner.gauge_peaks.entry(name).or_insert(value);
        *peak = (*peak).max(value);
    }

    pub fn gauge(&self, name: &str) -> i64 {
        self.lock().gauges.get(name).copied().unwrap_or(0)
    }

    /// Highest value the gauge has reached since creation.
    pub fn gauge_peak(&self, name: &str) -> i64 {
        self.lock().gauge_peaks.get(name).copied().unwrap_or(0)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.lock();
        MetricsSnapshot {
            counters: inner
                .counters
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
            gauges: inner
                .gauges
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
        }
    }
}
