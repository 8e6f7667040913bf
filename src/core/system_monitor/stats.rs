//! Counters for every error the sampling path recovers from.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Shared, lock-free counters. Cloned as `Arc<MonitorStats>` into each component.
#[derive(Debug, Default)]
pub struct MonitorStats {
    ticks: AtomicU64,
    adapter_failures: AtomicU64,
    adapter_timeouts: AtomicU64,
    store_errors: AtomicU64,
    dropped_samples: AtomicU64,
    alerts_fired: AtomicU64,
    recoveries: AtomicU64,
    alerts_suppressed: AtomicU64,
    dropped_alerts: AtomicU64,
    sink_failures: AtomicU64,
}

/// Point-in-time copy of [`MonitorStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub ticks: u64,
    pub adapter_failures: u64,
    pub adapter_timeouts: u64,
    pub store_errors: u64,
    pub dropped_samples: u64,
    /// Breach alerts only
    pub alerts_fired: u64,
    pub recoveries: u64,
    pub alerts_suppressed: u64,
    pub dropped_alerts: u64,
    pub sink_failures: u64,
}

impl StatsSnapshot {
    /// Total recovered errors, for a one-line status display
    pub fn recovered_errors(&self) -> u64 {
        self.adapter_failures + self.store_errors + self.dropped_alerts + self.sink_failures
    }
}

macro_rules! counter {
    ($inc:ident, $field:ident) => {
        pub fn $inc(&self, n: u64) {
            self.$field.fetch_add(n, Ordering::Relaxed);
        }
    };
}

impl MonitorStats {
    counter!(add_ticks, ticks);
    counter!(add_adapter_failures, adapter_failures);
    counter!(add_adapter_timeouts, adapter_timeouts);
    counter!(add_store_errors, store_errors);
    counter!(add_dropped_samples, dropped_samples);
    counter!(add_alerts_fired, alerts_fired);
    counter!(add_recoveries, recoveries);
    counter!(add_alerts_suppressed, alerts_suppressed);
    counter!(add_dropped_alerts, dropped_alerts);
    counter!(add_sink_failures, sink_failures);

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            adapter_failures: self.adapter_failures.load(Ordering::Relaxed),
            adapter_timeouts: self.adapter_timeouts.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
            dropped_samples: self.dropped_samples.load(Ordering::Relaxed),
            alerts_fired: self.alerts_fired.load(Ordering::Relaxed),
            recoveries: self.recoveries.load(Ordering::Relaxed),
            alerts_suppressed: self.alerts_suppressed.load(Ordering::Relaxed),
            dropped_alerts: self.dropped_alerts.load(Ordering::Relaxed),
            sink_failures: self.sink_failures.load(Ordering::Relaxed),
        }
    }
}
