//! Turns one adapter call per tick into a timestamped [`Sample`].

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::error::AdapterError;

use super::metrics::{MetricGroup, ProcessMetrics, Sample};
use super::source::{MetricSource, Reading};
use super::stats::MonitorStats;

type SharedSource = Arc<Mutex<Box<dyn MetricSource>>>;

pub struct Sampler {
    source: SharedSource,
    groups: Vec<MetricGroup>,
    allowed: BTreeSet<&'static str>,
    top_processes: usize,
    started: Instant,
    last_timestamp: Option<DateTime<Utc>>,
    failing: BTreeSet<String>,
    last_errors: Vec<AdapterError>,
    processes: Vec<ProcessMetrics>,
    stats: Arc<MonitorStats>,
}

impl Sampler {
    pub fn new(source: Box<dyn MetricSource>, groups: Vec<MetricGroup>, top_processes: usize) -> Self {
        let allowed = groups
            .iter()
            .flat_map(|group| group.metrics().iter().copied())
            .collect();

        Self {
            source: Arc::new(Mutex::new(source)),
            groups,
            allowed,
            top_processes,
            started: Instant::now(),
            last_timestamp: None,
            failing: BTreeSet::new(),
            last_errors: Vec::new(),
            processes: Vec::new(),
            stats: Arc::new(MonitorStats::default()),
        }
    }

    pub fn with_stats(mut self, stats: Arc<MonitorStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Never stamp a sample earlier than `floor`, e.g. the newest stored record
    pub fn resume_after(mut self, floor: Option<DateTime<Utc>>) -> Self {
        self.last_timestamp = floor;
        self
    }

    pub fn groups(&self) -> &[MetricGroup] {
        &self.groups
    }

    /// Errors from the most recent tick
    pub fn last_errors(&self) -> &[AdapterError] {
        &self.last_errors
    }

    /// Process list from the most recent successful process read
    pub fn processes(&self) -> &[ProcessMetrics] {
        &self.processes
    }

    /// Read the source once on the calling thread.
    ///
    /// Blocks for as long as the adapter does; the runtime uses
    /// [`Sampler::tick_with_budget`] instead.
    pub fn tick(&mut self) -> Sample {
        let reading = self.source.lock().read(&self.groups, self.top_processes);
        self.finish(reading)
    }

    /// Read the source on the blocking pool, giving up after `budget`.
    ///
    /// A read that overruns keeps the source locked until it returns; later
    /// ticks see it busy and time out immediately instead of queueing behind it.
    pub async fn tick_with_budget(&mut self, budget: Duration) -> Sample {
        let source = Arc::clone(&self.source);
        let groups = self.groups.clone();
        let top = self.top_processes;

        let read = tokio::task::spawn_blocking(move || {
            source.try_lock().map(|mut guard| guard.read(&groups, top))
        });

        let reading = match tokio::time::timeout(budget, read).await {
            Ok(Ok(Some(reading))) => reading,
            Ok(Ok(None)) => {
                log::debug!("Metric source still busy with an earlier read");
                Reading::timed_out(&self.groups, budget)
            }
            Ok(Err(join_err)) => {
                log::error!("Metric source read panicked: {}", join_err);
                let message = join_err.to_string();
                Reading::failed(&self.groups, |group| {
                    AdapterError::io(group.name(), message.clone())
                })
            }
            Err(_) => {
                log::warn!("Metric source exceeded its {:?} budget", budget);
                Reading::timed_out(&self.groups, budget)
            }
        };

        self.finish(reading)
    }

    fn finish(&mut self, reading: Reading) -> Sample {
        let Reading {
            values,
            mut errors,
            processes,
        } = reading;

        let mut sample = Sample::new(self.next_timestamp(), self.started.elapsed().as_millis() as u64);

        for (metric, value) in values {
            if !self.allowed.contains(metric.as_str()) {
                continue;
            }
            if !value.is_finite() || value < 0.0 {
                let group = MetricGroup::of_metric(&metric).map_or("unknown", MetricGroup::name);
                errors.push(AdapterError::io(
                    group,
                    format!("{} produced invalid value {}", metric, value),
                ));
                continue;
            }
            sample.values.insert(metric, value);
        }

        if self.groups.contains(&MetricGroup::Processes)
            && !errors.iter().any(|e| e.group() == MetricGroup::Processes.name())
        {
            self.processes = processes;
        }

        self.track_failures(&errors);
        self.stats.add_ticks(1);
        self.stats.add_adapter_failures(errors.len() as u64);
        if errors.iter().any(AdapterError::is_timeout) {
            self.stats.add_adapter_timeouts(1);
        }
        self.last_errors = errors;

        sample
    }

    /// Wall clock never goes backwards across ticks, so history appends stay ordered
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let ts = match self.last_timestamp {
            Some(last) if last > now => last,
            _ => now,
        };
        self.last_timestamp = Some(ts);
        ts
    }

    /// Warn once when a group starts failing and once when it recovers
    fn track_failures(&mut self, errors: &[AdapterError]) {
        let now_failing: BTreeSet<String> = errors.iter().map(|e| e.group().to_string()).collect();

        for err in errors {
            if !self.failing.contains(err.group()) {
                log::warn!("Metric read failed: {}", err);
            } else {
                log::debug!("Metric read still failing: {}", err);
            }
        }
        for group in self.failing.difference(&now_failing) {
            log::info!("Metric group '{}' readable again", group);
        }

        self.failing = now_failing;
    }
}
