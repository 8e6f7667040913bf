use std::time::Instant;

use chrono::{DateTime, Utc};
use sysinfo::{
    Components, CpuRefreshKind, Disks, MemoryRefreshKind, Networks, ProcessRefreshKind,
    ProcessesToUpdate, RefreshKind, System,
};

use crate::error::AdapterError;

use super::metrics::{names, DiskUsage, HostInfo, MetricGroup, ProcessMetrics};
use super::source::{MetricSource, Reading};

/// Label fragments that identify a CPU package/core temperature sensor
const CPU_SENSOR_HINTS: [&str; 7] = ["cpu", "core", "package", "tctl", "tdie", "k10temp", "coretemp"];

type GroupResult = Result<Vec<(&'static str, f64)>, AdapterError>;

/// [`MetricSource`] backed by the `sysinfo` crate
pub struct SysinfoSource {
    system: System,
    components: Components,
    disks: Disks,
    networks: Networks,
    last_disk_refresh: Instant,
    last_network_refresh: Instant,
}

impl SysinfoSource {
    pub fn new() -> Self {
        let refresh_kind = RefreshKind::nothing()
            .with_cpu(CpuRefreshKind::everything())
            .with_memory(MemoryRefreshKind::everything());

        let now = Instant::now();
        Self {
            system: System::new_with_specifics(refresh_kind),
            components: Components::new_with_refreshed_list(),
            disks: Disks::new_with_refreshed_list(),
            networks: Networks::new_with_refreshed_list(),
            last_disk_refresh: now,
            last_network_refresh: now,
        }
    }

    /// Static facts about the host
    pub fn host_info(&self) -> HostInfo {
        let boot_time = DateTime::<Utc>::from_timestamp(System::boot_time() as i64, 0)
            .unwrap_or_else(Utc::now);

        HostInfo {
            hostname: System::host_name().unwrap_or_else(|| "localhost".to_string()),
            os: System::long_os_version()
                .or_else(System::name)
                .unwrap_or_else(|| "Unknown".to_string()),
            kernel: System::kernel_version().unwrap_or_else(|| "Unknown".to_string()),
            cpu_count: self.system.cpus().len().max(1),
            total_memory_bytes: self.system.total_memory(),
            boot_time,
        }
    }

    /// Per-mount space usage, for reports that list disks individually
    pub fn disk_usage(&mut self) -> Vec<DiskUsage> {
        self.disks.refresh(true);
        self.disks
            .iter()
            .filter(|disk| disk.total_space() > 0)
            .map(|disk| {
                let total = disk.total_space();
                let free = disk.available_space();
                let used = total.saturating_sub(free);
                DiskUsage {
                    device: disk.name().to_string_lossy().to_string(),
                    mount_point: disk.mount_point().display().to_string(),
                    total_bytes: total,
                    used_bytes: used,
                    free_bytes: free,
                    usage_pct: percent(used, total),
                }
            })
            .collect()
    }

    fn read_cpu(&mut self) -> GroupResult {
        self.system.refresh_cpu_usage();
        self.system.refresh_cpu_frequency();

        let cpus = self.system.cpus();
        if cpus.is_empty() {
            return Err(AdapterError::missing_sensor(MetricGroup::Cpu.name()));
        }

        let avg_freq = cpus.iter().map(|cpu| cpu.frequency()).sum::<u64>() / cpus.len() as u64;

        Ok(vec![
            (
                names::CPU_USAGE_PCT,
                self.system.global_cpu_usage().clamp(0.0, 100.0) as f64,
            ),
            (names::CPU_FREQ_MHZ, avg_freq as f64),
        ])
    }

    fn read_load(&self) -> GroupResult {
        if cfg!(windows) {
            // sysinfo reports zeros on Windows rather than an error
            return Err(AdapterError::missing_sensor(MetricGroup::Load.name()));
        }

        let load = System::load_average();
        Ok(vec![
            (names::LOAD_AVG_1M, load.one),
            (names::LOAD_AVG_5M, load.five),
            (names::LOAD_AVG_15M, load.fifteen),
        ])
    }

    fn read_memory(&mut self) -> GroupResult {
        self.system.refresh_memory();

        let total = self.system.total_memory();
        if total == 0 {
            return Err(AdapterError::io(
                MetricGroup::Memory.name(),
                "total memory reported as zero",
            ));
        }

        let used = self.system.used_memory();
        let swap_total = self.system.total_swap();
        let swap_used = self.system.used_swap();

        Ok(vec![
            (names::MEM_USED_BYTES, used as f64),
            (names::MEM_TOTAL_BYTES, total as f64),
            (names::MEM_USAGE_PCT, percent(used, total)),
            (names::SWAP_USED_BYTES, swap_used as f64),
            (names::SWAP_PCT, percent(swap_used, swap_total)),
        ])
    }

    fn read_disks(&mut self) -> GroupResult {
        self.disks.refresh(true);
        let now = Instant::now();
        let elapsed_secs = now
            .duration_since(self.last_disk_refresh)
            .as_secs_f64()
            .max(f64::EPSILON);
        self.last_disk_refresh = now;

        let mut used_total = 0u64;
        let mut space_total = 0u64;
        let mut worst_pct = 0.0f64;
        let mut read_bytes = 0u64;
        let mut written_bytes = 0u64;
        let mut seen = 0usize;

        for disk in self.disks.iter() {
            let total = disk.total_space();
            if total == 0 {
                continue;
            }
            let used = total.saturating_sub(disk.available_space());
            let usage = disk.usage();

            seen += 1;
            used_total += used;
            space_total += total;
            worst_pct = worst_pct.max(percent(used, total));
            read_bytes += usage.read_bytes;
            written_bytes += usage.written_bytes;
        }

        if seen == 0 {
            return Err(AdapterError::missing_sensor(MetricGroup::Disk.name()));
        }

        Ok(vec![
            (names::DISK_USED_BYTES, used_total as f64),
            (names::DISK_TOTAL_BYTES, space_total as f64),
            (names::DISK_USAGE_PCT, worst_pct),
            (names::DISK_READ_BPS, read_bytes as f64 / elapsed_secs),
            (names::DISK_WRITE_BPS, written_bytes as f64 / elapsed_secs),
        ])
    }

    fn read_network(&mut self) -> GroupResult {
        self.networks.refresh(true);
        let now = Instant::now();
        let elapsed_secs = now
            .duration_since(self.last_network_refresh)
            .as_secs_f64()
            .max(f64::EPSILON);
        self.last_network_refresh = now;

        if self.networks.is_empty() {
            return Err(AdapterError::missing_sensor(MetricGroup::Network.name()));
        }

        let (rx, tx) = self
            .networks
            .values()
            .fold((0u64, 0u64), |(rx, tx), data| {
                (rx + data.received(), tx + data.transmitted())
            });

        Ok(vec![
            (names::NET_RX_BPS, rx as f64 / elapsed_secs),
            (names::NET_TX_BPS, tx as f64 / elapsed_secs),
        ])
    }

    fn read_temperatures(&mut self) -> GroupResult {
        self.components.refresh(true);

        let readings: Vec<(String, f32)> = self
            .components
            .iter()
            .filter_map(|comp| {
                comp.temperature()
                    .filter(|t| t.is_finite() && *t >= 0.0)
                    .map(|t| (comp.label().to_lowercase(), t))
            })
            .collect();

        if readings.is_empty() {
            // Typical without root or on virtual machines
            return Err(AdapterError::missing_sensor(MetricGroup::Temperature.name()));
        }

        let max = readings.iter().map(|(_, t)| *t).fold(0.0f32, f32::max);
        let cpu = readings
            .iter()
            .filter(|(label, _)| CPU_SENSOR_HINTS.iter().any(|hint| label.contains(hint)))
            .map(|(_, t)| *t)
            .reduce(f32::max)
            .unwrap_or(max);

        Ok(vec![
            (names::TEMP_CPU_CELSIUS, cpu as f64),
            (names::TEMP_MAX_CELSIUS, max as f64),
        ])
    }

    fn read_processes(&mut self, limit: usize) -> (GroupResult, Vec<ProcessMetrics>) {
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().with_cpu().with_memory(),
        );

        let total_memory = self.system.total_memory();
        let processes = self.system.processes();
        if processes.is_empty() {
            return (
                Err(AdapterError::PermissionDenied {
                    group: MetricGroup::Processes.name().to_string(),
                }),
                Vec::new(),
            );
        }

        let mut top: Vec<ProcessMetrics> = processes
            .values()
            .map(|proc| {
                let mem = proc.memory();
                ProcessMetrics {
                    pid: proc.pid().as_u32(),
                    name: proc.name().to_string_lossy().to_string(),
                    cpu_usage_percent: proc.cpu_usage(),
                    memory_bytes: mem,
                    memory_percent: percent(mem, total_memory) as f32,
                }
            })
            .collect();

        // Sort by CPU usage descending
        top.sort_by(|a, b| {
            b.cpu_usage_percent
                .partial_cmp(&a.cpu_usage_percent)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        top.truncate(limit);

        (Ok(vec![(names::PROC_COUNT, processes.len() as f64)]), top)
    }
}

impl Default for SysinfoSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricSource for SysinfoSource {
    fn name(&self) -> &str {
        "sysinfo"
    }

    fn read(&mut self, groups: &[MetricGroup], top_processes: usize) -> Reading {
        let mut reading = Reading::default();

        for &group in groups {
            let outcome = match group {
                MetricGroup::Cpu => self.read_cpu(),
                MetricGroup::Load => self.read_load(),
                MetricGroup::Memory => self.read_memory(),
                MetricGroup::Disk => self.read_disks(),
                MetricGroup::Network => self.read_network(),
                MetricGroup::Temperature => self.read_temperatures(),
                MetricGroup::Processes => {
                    let (outcome, processes) = self.read_processes(top_processes);
                    reading.processes = processes;
                    outcome
                }
            };
            reading.record(outcome);
        }

        reading
    }
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole > 0 {
        (part as f64 / whole as f64) * 100.0
    } else {
        0.0
    }
}
