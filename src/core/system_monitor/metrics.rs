use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metric names produced by the built-in groups.
pub mod names {
    pub const CPU_USAGE_PCT: &str = "cpu.usage_pct";
    pub const CPU_FREQ_MHZ: &str = "cpu.freq_mhz";
    pub const LOAD_AVG_1M: &str = "load.avg_1m";
    pub const LOAD_AVG_5M: &str = "load.avg_5m";
    pub const LOAD_AVG_15M: &str = "load.avg_15m";
    pub const MEM_USED_BYTES: &str = "mem.used_bytes";
    pub const MEM_TOTAL_BYTES: &str = "mem.total_bytes";
    pub const MEM_USAGE_PCT: &str = "mem.usage_pct";
    pub const SWAP_USED_BYTES: &str = "mem.swap_used_bytes";
    pub const SWAP_PCT: &str = "mem.swap_pct";
    pub const DISK_USED_BYTES: &str = "disk.used_bytes";
    pub const DISK_TOTAL_BYTES: &str = "disk.total_bytes";
    pub const DISK_USAGE_PCT: &str = "disk.usage_pct";
    pub const DISK_READ_BPS: &str = "disk.read_bytes_per_s";
    pub const DISK_WRITE_BPS: &str = "disk.write_bytes_per_s";
    pub const NET_RX_BPS: &str = "net.rx_bytes_per_s";
    pub const NET_TX_BPS: &str = "net.tx_bytes_per_s";
    pub const TEMP_CPU_CELSIUS: &str = "temp.cpu_celsius";
    pub const TEMP_MAX_CELSIUS: &str = "temp.max_celsius";
    pub const PROC_COUNT: &str = "proc.count";
}

/// A family of metrics read together from the platform.
///
/// The enabled groups are fixed by configuration, so every sample of a run
/// carries the same metric names (minus whatever failed on that tick).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricGroup {
    Cpu,
    Load,
    Memory,
    Disk,
    Network,
    Temperature,
    Processes,
}

impl MetricGroup {
    pub const ALL: [MetricGroup; 7] = [
        MetricGroup::Cpu,
        MetricGroup::Load,
        MetricGroup::Memory,
        MetricGroup::Disk,
        MetricGroup::Network,
        MetricGroup::Temperature,
        MetricGroup::Processes,
    ];

    pub fn all() -> Vec<MetricGroup> {
        Self::ALL.to_vec()
    }

    pub fn name(self) -> &'static str {
        match self {
            MetricGroup::Cpu => "cpu",
            MetricGroup::Load => "load",
            MetricGroup::Memory => "memory",
            MetricGroup::Disk => "disk",
            MetricGroup::Network => "network",
            MetricGroup::Temperature => "temperature",
            MetricGroup::Processes => "processes",
        }
    }

    /// Metric names this group produces
    pub fn metrics(self) -> &'static [&'static str] {
        use names::*;
        match self {
            MetricGroup::Cpu => &[CPU_USAGE_PCT, CPU_FREQ_MHZ],
            MetricGroup::Load => &[LOAD_AVG_1M, LOAD_AVG_5M, LOAD_AVG_15M],
            MetricGroup::Memory => &[
                MEM_USED_BYTES,
                MEM_TOTAL_BYTES,
                MEM_USAGE_PCT,
                SWAP_USED_BYTES,
                SWAP_PCT,
            ],
            MetricGroup::Disk => &[
                DISK_USED_BYTES,
                DISK_TOTAL_BYTES,
                DISK_USAGE_PCT,
                DISK_READ_BPS,
                DISK_WRITE_BPS,
            ],
            MetricGroup::Network => &[NET_RX_BPS, NET_TX_BPS],
            MetricGroup::Temperature => &[TEMP_CPU_CELSIUS, TEMP_MAX_CELSIUS],
            MetricGroup::Processes => &[PROC_COUNT],
        }
    }

    /// Group that produces the given metric name, if any
    pub fn of_metric(metric: &str) -> Option<MetricGroup> {
        Self::ALL
            .iter()
            .copied()
            .find(|group| group.metrics().contains(&metric))
    }
}

impl fmt::Display for MetricGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MetricGroup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|group| group.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown metric group '{}'", s))
    }
}

/// One timestamped set of metric readings.
///
/// A metric that could not be read on this tick is simply absent from `values`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Wall-clock time of the reading
    pub timestamp: DateTime<Utc>,
    /// Monotonic milliseconds since the sampler started
    pub elapsed_ms: u64,
    pub values: BTreeMap<String, f64>,
}

impl Sample {
    pub fn new(timestamp: DateTime<Utc>, elapsed_ms: u64) -> Self {
        Self {
            timestamp,
            elapsed_ms,
            values: BTreeMap::new(),
        }
    }

    /// Builder-style insert, used heavily by tests and replay tooling
    pub fn with(mut self, metric: &str, value: f64) -> Self {
        self.values.insert(metric.to_string(), value);
        self
    }

    pub fn get(&self, metric: &str) -> Option<f64> {
        self.values.get(metric).copied()
    }

    pub fn has(&self, metric: &str) -> bool {
        self.values.contains_key(metric)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessMetrics {
    pub pid: u32,
    pub name: String,
    pub cpu_usage_percent: f32,
    pub memory_bytes: u64,
    pub memory_percent: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskUsage {
    pub device: String,
    pub mount_point: String,
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
    pub usage_pct: f64,
}

/// Static host facts shown by `status` and the dashboard header
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostInfo {
    pub hostname: String,
    pub os: String,
    pub kernel: String,
    pub cpu_count: usize,
    pub total_memory_bytes: u64,
    pub boot_time: DateTime<Utc>,
}

impl Default for HostInfo {
    fn default() -> Self {
        Self {
            hostname: "localhost".to_string(),
            os: "Unknown".to_string(),
            kernel: "Unknown".to_string(),
            cpu_count: 1,
            total_memory_bytes: 0,
            boot_time: Utc::now(),
        }
    }
}
