use crate::telemetry::{runtime_counters, RuntimeCounters};
use std::sync::OnceLock;

pub use crate::telemetry::{RuntimeCountersSnapshot, SchemaRejectionSnapshot};

/// Collector that wraps the runtime counter APIs with a single entrypoint.
pub struct MetricsCollector {
    counters: &'static RuntimeCounters,
}

impl MetricsCollector {
    fn new() -> Self {
        Self {
            counters: runtime_counters(),
        }
    }

    pub fn global() -> &'static Self {
        static INSTANCE: OnceLock<MetricsCollector> = OnceLock::new();
        INSTANCE.get_or_init(Self::new)
    }

    pub fn snapshot(&self) -> RuntimeCountersSnapshot {
        self.counters.snapshot()
    }

    pub fn record_pass(&self) {
        self.counters.inc_passes();
    }

    pub fn record_cancelled_pass(&self) {
        self.counters.inc_cancelled_passes();
    }

    pub fn record_coalesced_events(&self, count: usize) {
        if count > 0 {
            self.counters.add_coalesced_events(count as u64);
        }
    }

    pub fn record_apply(&self) {
        self.counters.inc_applies();
    }

    pub fn record_apply_failure(&self) {
        self.counters.inc_apply_failures();
    }

    pub fn record_apply_skipped(&self) {
        self.counters.inc_applies_skipped();
    }

    pub fn record_status_publish(&self) {
        self.counters.inc_status_publishes();
    }

    pub fn record_schema_rejection(&self, relation: &str) {
        self.counters.record_schema_rejection(relation);
    }
}

pub fn metrics() -> &'static MetricsCollector {
    MetricsCollector::global()
}
