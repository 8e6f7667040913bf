//! Tokio runtime and pipeline for the sampling loop.
//!
//! One task owns the [`Monitor`] and drives sampler → evaluator → history on
//! every tick. Readers go through a cloneable [`MonitorHandle`] and only ever
//! see immutable `Arc` snapshots. Alerts are delivered by a second task.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;

use crate::error::{AdapterError, HealthError, Result};

use super::alerts::{Alert, AlertLog, RuleStatus, ThresholdEvaluator, ThresholdRule};
use super::history::{HistoryLog, HistoryRecord, HistoryStore, RetentionPolicy, TAG_ALERTED};
use super::metrics::{MetricGroup, ProcessMetrics, Sample};
use super::sampler::Sampler;
use super::sinks::{AlertDelivery, AlertDispatcher, AlertSink};
use super::source::MetricSource;
use super::stats::{MonitorStats, StatsSnapshot};

/// Upper bound on a single adapter call
pub const MAX_SAMPLING_BUDGET: Duration = Duration::from_secs(5);

/// Per-subscriber queue depth for live samples
const LIVE_QUEUE_CAPACITY: usize = 64;

/// Half the interval, capped at [`MAX_SAMPLING_BUDGET`]
pub fn sampling_budget(interval: Duration) -> Duration {
    (interval / 2).min(MAX_SAMPLING_BUDGET)
}

/// Everything the pipeline needs, fixed at construction
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub interval: Duration,
    pub budget: Duration,
    pub groups: Vec<MetricGroup>,
    pub top_processes: usize,
    /// Minimum spacing between history records. Alerted samples are always recorded.
    pub record_every: Duration,
    pub rules: Vec<ThresholdRule>,
}

impl MonitorSettings {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            budget: sampling_budget(interval),
            groups: MetricGroup::all(),
            top_processes: 0,
            record_every: Duration::ZERO,
            rules: Vec::new(),
        }
    }

    pub fn with_groups(mut self, groups: Vec<MetricGroup>) -> Self {
        self.groups = groups;
        self
    }

    pub fn with_rules(mut self, rules: Vec<ThresholdRule>) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_top_processes(mut self, count: usize) -> Self {
        self.top_processes = count;
        self
    }

    pub fn with_record_every(mut self, every: Duration) -> Self {
        self.record_every = every;
        self
    }
}

/// State readers share with the sampling task
struct Shared {
    interval: Duration,
    history: RwLock<HistoryStore>,
    alerts: RwLock<AlertLog>,
    rules: RwLock<Vec<RuleStatus>>,
    processes: RwLock<Vec<ProcessMetrics>>,
    errors: RwLock<Vec<AdapterError>>,
    stats: Arc<MonitorStats>,
    current: watch::Sender<Option<Arc<Sample>>>,
    live: broadcast::Sender<Arc<Sample>>,
}

/// What one tick produced
#[derive(Debug, Clone)]
pub struct TickOutcome {
    pub sample: Arc<Sample>,
    pub alerts: Vec<Arc<Alert>>,
}

/// The sampling pipeline. Owned by exactly one driver: the runtime task, or a test.
pub struct Monitor {
    sampler: Sampler,
    evaluator: ThresholdEvaluator,
    dispatcher: Option<AlertDispatcher>,
    delivery: Option<AlertDelivery>,
    /// Written outside the history lock
    history_log: Option<HistoryLog>,
    retention: RetentionPolicy,
    budget: Duration,
    record_every_ms: u64,
    last_recorded_ms: Option<u64>,
    shared: Arc<Shared>,
}

impl Monitor {
    pub fn new(
        source: Box<dyn MetricSource>,
        settings: MonitorSettings,
        mut history: HistoryStore,
        sinks: Vec<Box<dyn AlertSink>>,
    ) -> Result<Self> {
        if settings.interval.is_zero() {
            return Err(HealthError::config("sampling interval must be greater than zero"));
        }

        let stats = Arc::new(MonitorStats::default());
        let source_name = source.name().to_string();

        let history_log = history.detach_log();
        let retention = history.policy();
        // Stored records may be stamped ahead of this host's clock
        let sampler = Sampler::new(source, settings.groups.clone(), settings.top_processes)
            .with_stats(Arc::clone(&stats))
            .resume_after(history.latest().map(|record| record.timestamp()));
        let evaluator = ThresholdEvaluator::new(settings.rules).with_stats(Arc::clone(&stats));

        let (dispatcher, delivery) = if sinks.is_empty() {
            (None, None)
        } else {
            let (dispatcher, delivery) = AlertDispatcher::new(sinks, Arc::clone(&stats));
            (Some(dispatcher), Some(delivery))
        };

        let (current, _) = watch::channel(None);
        let (live, _) = broadcast::channel(LIVE_QUEUE_CAPACITY);

        let shared = Arc::new(Shared {
            interval: settings.interval,
            history: RwLock::new(history),
            alerts: RwLock::new(AlertLog::new()),
            rules: RwLock::new(evaluator.statuses()),
            processes: RwLock::new(Vec::new()),
            errors: RwLock::new(Vec::new()),
            stats,
            current,
            live,
        });

        log::info!(
            "Monitor ready: source={}, interval={:?}, budget={:?}, groups={}, rules={}",
            source_name,
            settings.interval,
            settings.budget,
            settings
                .groups
                .iter()
                .map(|g| g.name())
                .collect::<Vec<_>>()
                .join(","),
            evaluator.rules().len()
        );

        Ok(Self {
            sampler,
            evaluator,
            dispatcher,
            delivery,
            history_log,
            retention,
            budget: settings.budget,
            record_every_ms: u64::try_from(settings.record_every.as_millis()).unwrap_or(u64::MAX),
            last_recorded_ms: None,
            shared,
        })
    }

    pub fn handle(&self) -> MonitorHandle {
        MonitorHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Sample on the calling thread and run the rest of the pipeline
    pub fn tick(&mut self) -> TickOutcome {
        let sample = self.sampler.tick();
        self.process(sample)
    }

    /// Sample on the blocking pool within the configured budget
    pub async fn tick_with_budget(&mut self) -> TickOutcome {
        let sample = self.sampler.tick_with_budget(self.budget).await;
        self.process(sample)
    }

    fn process(&mut self, sample: Sample) -> TickOutcome {
        let alerts: Vec<Arc<Alert>> = self
            .evaluator
            .evaluate(&sample)
            .into_iter()
            .map(Arc::new)
            .collect();

        if !alerts.is_empty() {
            let mut log = self.shared.alerts.write();
            for alert in &alerts {
                log.push(Arc::clone(alert));
            }
        }
        if let Some(dispatcher) = &self.dispatcher {
            for alert in &alerts {
                dispatcher.dispatch(Arc::clone(alert));
            }
        }

        *self.shared.rules.write() = self.evaluator.statuses();
        *self.shared.errors.write() = self.sampler.last_errors().to_vec();
        if self.sampler.groups().contains(&MetricGroup::Processes) {
            *self.shared.processes.write() = self.sampler.processes().to_vec();
        }

        if self.should_record(&sample, !alerts.is_empty()) {
            self.record(&sample, !alerts.is_empty());
        }

        let sample = Arc::new(sample);
        self.shared.current.send_replace(Some(Arc::clone(&sample)));
        // No live subscribers is fine
        let _ = self.shared.live.send(Arc::clone(&sample));

        TickOutcome { sample, alerts }
    }

    fn should_record(&self, sample: &Sample, alerted: bool) -> bool {
        alerted
            || self.record_every_ms == 0
            || self
                .last_recorded_ms
                .map_or(true, |last| sample.elapsed_ms.saturating_sub(last) >= self.record_every_ms)
    }

    fn record(&mut self, sample: &Sample, alerted: bool) {
        let tag = alerted.then(|| TAG_ALERTED.to_string());
        let inserted = match self.shared.history.write().insert(sample.clone(), tag) {
            Ok(inserted) => inserted,
            Err(e) => {
                self.shared.stats.add_store_errors(1);
                log::warn!("History append rejected: {}", e);
                return;
            }
        };
        self.last_recorded_ms = Some(sample.elapsed_ms);

        let Some(log) = self.history_log.as_mut() else {
            return;
        };
        if let Err(e) = log.record(inserted.record, inserted.pruned, self.retention) {
            // Kept in memory, written on a later append
            self.shared.stats.add_store_errors(1);
            log::warn!("History persistence failed: {}", e);
        }
        if log.needs_compaction(inserted.kept) {
            let retained = self.shared.history.read().all();
            if let Err(e) = log.compact(&retained) {
                self.shared.stats.add_store_errors(1);
                log::warn!("History compaction in {} failed: {}", log.directory().display(), e);
            }
        }
    }

    /// Flush pending history writes and deliver queued alerts.
    ///
    /// Must not be called from inside a tokio runtime when alerts are still
    /// queued for a monitor that was never started.
    pub fn finish(mut self) {
        if let Some(log) = self.history_log.as_mut() {
            if let Err(e) = log.flush() {
                self.shared.stats.add_store_errors(1);
                log::error!("Failed to flush history on shutdown: {}", e);
            }
        }

        // Closing the queue lets delivery finish once it is drained
        drop(self.dispatcher.take());
        if let Some(delivery) = self.delivery.take() {
            match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                Ok(runtime) => runtime.block_on(delivery.run()),
                Err(e) => log::error!("Queued alerts not delivered: {}", e),
            }
        }
        log::info!("Monitor stopped after {} ticks", self.shared.stats.snapshot().ticks);
    }
}

/// Cloneable read access to a running [`Monitor`]
#[derive(Clone)]
pub struct MonitorHandle {
    shared: Arc<Shared>,
}

impl MonitorHandle {
    pub fn interval(&self) -> Duration {
        self.shared.interval
    }

    /// Most recent sample, if any tick has completed
    pub fn current(&self) -> Option<Arc<Sample>> {
        self.shared.current.borrow().clone()
    }

    pub fn history(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Arc<HistoryRecord>> {
        self.shared.history.read().query(start, end)
    }

    pub fn recent_history(&self, count: usize) -> Vec<Arc<HistoryRecord>> {
        self.shared.history.read().last(count)
    }

    pub fn alerts(&self, since: DateTime<Utc>) -> Vec<Arc<Alert>> {
        self.shared.alerts.read().since(since)
    }

    pub fn subscribe(&self) -> SampleSubscription {
        SampleSubscription {
            rx: self.shared.live.subscribe(),
            stats: Arc::clone(&self.shared.stats),
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    pub fn rule_states(&self) -> Vec<RuleStatus> {
        self.shared.rules.read().clone()
    }

    pub fn top_processes(&self) -> Vec<ProcessMetrics> {
        self.shared.processes.read().clone()
    }

    /// Groups that failed on the most recent tick
    pub fn adapter_errors(&self) -> Vec<AdapterError> {
        self.shared.errors.read().clone()
    }
}

/// Live sample feed. A subscriber that falls behind loses the oldest samples;
/// the loss is added to `dropped_samples`.
pub struct SampleSubscription {
    rx: broadcast::Receiver<Arc<Sample>>,
    stats: Arc<MonitorStats>,
}

impl SampleSubscription {
    /// Next sample, or `None` once the monitor is gone
    pub async fn recv(&mut self) -> Option<Arc<Sample>> {
        loop {
            match self.rx.recv().await {
                Ok(sample) => return Some(sample),
                Err(broadcast::error::RecvError::Lagged(missed)) => self.lagged(missed),
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next queued sample without waiting
    pub fn try_recv(&mut self) -> Option<Arc<Sample>> {
        loop {
            match self.rx.try_recv() {
                Ok(sample) => return Some(sample),
                Err(broadcast::error::TryRecvError::Lagged(missed)) => self.lagged(missed),
                Err(_) => return None,
            }
        }
    }

    fn lagged(&self, missed: u64) {
        self.stats.add_dropped_samples(missed);
        log::debug!("Live subscriber lagged, {} samples dropped", missed);
    }
}

/// A [`Monitor`] running on its own tokio runtime
pub struct MonitorRuntime {
    handle: MonitorHandle,
    shutdown_tx: watch::Sender<bool>,
    task: Option<tokio::task::JoinHandle<Monitor>>,
    delivery: Option<tokio::task::JoinHandle<()>>,
    runtime: tokio::runtime::Runtime,
}

impl MonitorRuntime {
    pub fn start(mut monitor: Monitor) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .thread_name("healthdash-sampler")
            .build()
            .map_err(|e| HealthError::runtime(format!("failed to build tokio runtime: {}", e)))?;

        let handle = monitor.handle();
        let interval = handle.interval();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let delivery = monitor.delivery.take().map(|delivery| runtime.spawn(delivery.run()));
        let task = runtime.spawn(sampling_loop(monitor, interval, shutdown_rx));

        Ok(Self {
            handle,
            shutdown_tx,
            task: Some(task),
            delivery,
            runtime,
        })
    }

    /// Drive `future` to completion on the monitor's runtime from a synchronous caller
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    pub fn handle(&self) -> MonitorHandle {
        self.handle.clone()
    }

    /// Stop sampling after the in-flight tick, then flush history and pending alerts
    pub fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);

        if let Some(task) = self.task.take() {
            match self.runtime.block_on(task) {
                Ok(monitor) => monitor.finish(),
                Err(e) => log::error!("Sampling task ended abnormally: {}", e),
            }
        }
        if let Some(delivery) = self.delivery.take() {
            if let Err(e) = self.runtime.block_on(delivery) {
                log::error!("Alert delivery task ended abnormally: {}", e);
            }
        }
    }
}

async fn sampling_loop(mut monitor: Monitor, interval: Duration, mut shutdown: watch::Receiver<bool>) -> Monitor {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let outcome = monitor.tick_with_budget().await;
                log::trace!(
                    "Tick complete: {} metrics, {} alerts",
                    outcome.sample.values.len(),
                    outcome.alerts.len()
                );
            }
            _ = shutdown.changed() => {
                log::debug!("Sampling loop received shutdown");
                break;
            }
        }
    }

    monitor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::system_monitor::alerts::{Comparison, RuleState};
    use crate::core::system_monitor::metrics::names;
    use crate::core::system_monitor::source::Reading;
    use crate::error::SinkError;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Replays queued CPU values, repeating the last one when the queue runs dry
    struct CpuScript {
        values: Arc<Mutex<VecDeque<f64>>>,
        last: f64,
    }

    impl CpuScript {
        fn new(values: &[f64]) -> (Self, Arc<Mutex<VecDeque<f64>>>) {
            let queue = Arc::new(Mutex::new(values.iter().copied().collect()));
            (
                Self {
                    values: Arc::clone(&queue),
                    last: 0.0,
                },
                queue,
            )
        }
    }

    impl MetricSource for CpuScript {
        fn name(&self) -> &str {
            "cpu-script"
        }

        fn read(&mut self, groups: &[MetricGroup], _top: usize) -> Reading {
            if let Some(next) = self.values.lock().pop_front() {
                self.last = next;
            }
            let mut reading = Reading::default();
            for &group in groups {
                reading.record(match group {
                    MetricGroup::Cpu => Ok(vec![(names::CPU_USAGE_PCT, self.last)]),
                    MetricGroup::Memory => Ok(vec![(names::MEM_USAGE_PCT, 40.0)]),
                    _ => Err(AdapterError::missing_sensor(group.name())),
                });
            }
            reading
        }
    }

    struct Collect(Arc<Mutex<Vec<u64>>>);

    #[async_trait]
    impl AlertSink for Collect {
        fn name(&self) -> &str {
            "collect"
        }

        async fn deliver(&mut self, alert: &Alert) -> std::result::Result<(), SinkError> {
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.0.lock().push(alert.seq);
            Ok(())
        }
    }

    fn settings() -> MonitorSettings {
        MonitorSettings::new(Duration::from_millis(20))
            .with_groups(vec![MetricGroup::Cpu, MetricGroup::Memory])
            .with_rules(vec![ThresholdRule::new(
                names::CPU_USAGE_PCT,
                Comparison::Greater,
                80.0,
                Duration::ZERO,
            )])
    }

    fn monitor(values: &[f64], settings: MonitorSettings) -> Monitor {
        let (source, _) = CpuScript::new(values);
        Monitor::new(
            Box::new(source),
            settings,
            HistoryStore::in_memory(RetentionPolicy::unbounded()),
            Vec::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_budget_is_half_interval_capped() {
        assert_eq!(sampling_budget(Duration::from_secs(2)), Duration::from_secs(1));
        assert_eq!(sampling_budget(Duration::from_secs(60)), MAX_SAMPLING_BUDGET);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let (source, _) = CpuScript::new(&[]);
        let result = Monitor::new(
            Box::new(source),
            MonitorSettings::new(Duration::ZERO),
            HistoryStore::in_memory(RetentionPolicy::unbounded()),
            Vec::new(),
        );
        assert!(matches!(result, Err(HealthError::Config(_))));
    }

    #[test]
    fn test_tick_feeds_every_reader() {
        let mut monitor = monitor(&[50.0, 90.0], settings());
        let handle = monitor.handle();
        assert!(handle.current().is_none());

        let first = monitor.tick();
        assert!(first.alerts.is_empty());
        let second = monitor.tick();
        assert_eq!(second.alerts.len(), 1);

        let current = handle.current().unwrap();
        assert_eq!(current.get(names::CPU_USAGE_PCT), Some(90.0));

        let history = handle.recent_history(10);
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].tag.as_deref(), Some(TAG_ALERTED));

        assert_eq!(handle.alerts(DateTime::<Utc>::MIN_UTC).len(), 1);
        assert_eq!(handle.rule_states()[0].state, RuleState::Breached);
        assert_eq!(handle.stats().ticks, 2);
        assert_eq!(handle.stats().alerts_fired, 1);
    }

    #[test]
    fn test_record_spacing_still_keeps_alerted_samples() {
        let mut monitor = monitor(
            &[10.0, 20.0, 95.0, 30.0],
            settings().with_record_every(Duration::from_secs(3600)),
        );
        let handle = monitor.handle();
        for _ in 0..4 {
            monitor.tick();
        }

        let history = handle.recent_history(10);
        let cpu: Vec<f64> = history
            .iter()
            .filter_map(|r| r.sample.get(names::CPU_USAGE_PCT))
            .collect();
        assert_eq!(cpu, vec![10.0, 95.0]);
    }

    #[test]
    fn test_failed_group_reported_without_blocking_rules() {
        let mut monitor = monitor(
            &[99.0],
            settings().with_groups(vec![MetricGroup::Cpu, MetricGroup::Temperature]),
        );
        let outcome = monitor.tick();

        assert_eq!(outcome.alerts.len(), 1);
        let errors = monitor.handle().adapter_errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].group(), "temperature");
    }

    #[test]
    fn test_lagging_subscriber_counts_drops() {
        let mut monitor = monitor(&[1.0], settings());
        let handle = monitor.handle();
        let mut sub = handle.subscribe();

        for _ in 0..(LIVE_QUEUE_CAPACITY + 6) {
            monitor.tick();
        }

        let mut received = 0;
        while sub.try_recv().is_some() {
            received += 1;
        }
        assert_eq!(received, LIVE_QUEUE_CAPACITY);
        assert_eq!(handle.stats().dropped_samples, 6);
    }

    #[test]
    fn test_runtime_samples_until_shutdown() {
        let monitor = monitor(&[10.0], settings());
        let runtime = MonitorRuntime::start(monitor).unwrap();
        let handle = runtime.handle();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while handle.stats().ticks < 3 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        runtime.shutdown();

        let ticks = handle.stats().ticks;
        assert!(ticks >= 3);
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(handle.stats().ticks, ticks);
        assert!(handle.current().is_some());
    }

    #[test]
    fn test_runtime_delivers_queued_alerts_before_shutdown_returns() {
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let (source, _) = CpuScript::new(&[90.0, 10.0, 95.0, 10.0, 99.0]);
        let monitor = Monitor::new(
            Box::new(source),
            settings(),
            HistoryStore::in_memory(RetentionPolicy::unbounded()),
            vec![Box::new(Collect(Arc::clone(&delivered)))],
        )
        .unwrap();
        let runtime = MonitorRuntime::start(monitor).unwrap();
        let handle = runtime.handle();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while handle.stats().alerts_fired < 3 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        runtime.shutdown();

        let fired: Vec<u64> = handle
            .alerts(DateTime::<Utc>::MIN_UTC)
            .iter()
            .map(|alert| alert.seq)
            .collect();
        assert!(fired.len() >= 3);
        assert_eq!(*delivered.lock(), fired);
        assert_eq!(handle.stats().dropped_alerts, 0);
    }

    #[test]
    fn test_block_on_runs_on_monitor_runtime() {
        let runtime = MonitorRuntime::start(monitor(&[10.0], settings())).unwrap();
        let mut live = runtime.handle().subscribe();

        let sample = runtime.block_on(live.recv());
        assert_eq!(sample.unwrap().get(names::CPU_USAGE_PCT), Some(10.0));
        runtime.shutdown();
    }
}
