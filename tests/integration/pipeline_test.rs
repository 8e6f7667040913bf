use std::fs;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use healthdash::core::system_monitor::{
    read_alert_log, AlertKind, AlertSink, Comparison, FileSink, HistoryRecord, HistoryStore,
    MetricGroup, Monitor, MonitorSettings, RetentionPolicy, RuleState, Sample, ThresholdEvaluator,
    ThresholdRule, TAG_ALERTED,
};
use healthdash::HealthError;
use tempfile::TempDir;

use super::scripted::{cpu, ScriptedSource, Step};

const CPU: &str = "cpu.usage_pct";

fn epoch() -> DateTime<Utc> {
    Utc.timestamp_opt(0, 0).unwrap()
}

fn cpu_rule(limit: f64, cool_down_secs: u64) -> ThresholdRule {
    ThresholdRule::new(CPU, Comparison::Greater, limit, Duration::from_secs(cool_down_secs))
}

fn monitor_with(
    steps: Vec<Step>,
    settings: MonitorSettings,
    history: HistoryStore,
    sinks: Vec<Box<dyn AlertSink>>,
) -> Monitor {
    Monitor::new(Box::new(ScriptedSource::new(steps)), settings, history, sinks).unwrap()
}

#[test]
fn test_breach_scenario_tags_alerted_records() {
    let base = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    let mut evaluator = ThresholdEvaluator::new(vec![cpu_rule(80.0, 2)]);
    let mut history = HistoryStore::in_memory(RetentionPolicy::unbounded());

    for (t, value) in [70.0, 82.0, 83.0, 60.0, 85.0].into_iter().enumerate() {
        let secs = t as u64;
        let sample = Sample::new(base + chrono::Duration::seconds(secs as i64), secs * 1000)
            .with(CPU, value);
        let alerts = evaluator.evaluate(&sample);
        let tag = (!alerts.is_empty()).then(|| TAG_ALERTED.to_string());
        history.append_tagged(sample, tag).unwrap();
    }

    let tagged: Vec<usize> = history
        .all()
        .iter()
        .enumerate()
        .filter(|(_, r)| r.tag.is_some())
        .map(|(i, _)| i)
        .collect();
    assert_eq!(tagged, vec![1, 4]);
    assert_eq!(evaluator.state_of(CPU), Some(RuleState::Breached));
}

#[test]
fn test_partial_failure_keeps_other_groups() {
    let steps = vec![
        Step::default()
            .value(CPU, 40.0)
            .value("mem.usage_pct", 55.0)
            .failing(MetricGroup::Temperature),
        Step::default()
            .value(CPU, 95.0)
            .value("mem.usage_pct", 56.0)
            .failing(MetricGroup::Temperature),
    ];
    let settings = MonitorSettings::new(Duration::from_secs(1))
        .with_groups(vec![MetricGroup::Cpu, MetricGroup::Memory, MetricGroup::Temperature])
        .with_rules(vec![cpu_rule(80.0, 0)]);
    let mut monitor = monitor_with(
        steps,
        settings,
        HistoryStore::in_memory(RetentionPolicy::unbounded()),
        Vec::new(),
    );
    let handle = monitor.handle();

    let first = monitor.tick();
    assert!(first.alerts.is_empty());
    assert_eq!(first.sample.get(CPU), Some(40.0));
    assert!(first.sample.has("mem.usage_pct"));
    assert!(!first.sample.has("temp.cpu_celsius"));

    let second = monitor.tick();
    assert_eq!(second.alerts.len(), 1);
    assert_eq!(second.alerts[0].kind, AlertKind::Breach);

    let errors = handle.adapter_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].group(), "temperature");

    let stats = handle.stats();
    assert_eq!(stats.ticks, 2);
    assert_eq!(stats.adapter_failures, 2);
    assert_eq!(stats.alerts_fired, 1);

    assert_eq!(handle.current().unwrap().get(CPU), Some(95.0));
    assert_eq!(handle.alerts(epoch()).len(), 1);
    assert_eq!(handle.rule_states()[0].state, RuleState::Breached);

    let records = handle.recent_history(10);
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].tag.as_deref(), Some(TAG_ALERTED));
}

#[test]
fn test_record_spacing_still_keeps_alerted_samples() {
    let steps = vec![cpu(50.0), cpu(51.0), cpu(90.0), cpu(52.0)];
    let settings = MonitorSettings::new(Duration::from_secs(1))
        .with_groups(vec![MetricGroup::Cpu])
        .with_rules(vec![cpu_rule(80.0, 0)])
        .with_record_every(Duration::from_secs(3600));
    let mut monitor = monitor_with(
        steps,
        settings,
        HistoryStore::in_memory(RetentionPolicy::unbounded()),
        Vec::new(),
    );

    for _ in 0..4 {
        monitor.tick();
    }

    let records = monitor.handle().recent_history(10);
    let values: Vec<f64> = records.iter().filter_map(|r| r.sample.get(CPU)).collect();
    assert_eq!(values, vec![50.0, 90.0]);
    assert_eq!(records[1].tag.as_deref(), Some(TAG_ALERTED));
}

#[test]
fn test_file_channel_receives_every_alert() {
    let dir = TempDir::new().unwrap();
    let alerts_path = dir.path().join("alerts.jsonl");

    let steps = vec![cpu(90.0), cpu(50.0), cpu(95.0), cpu(96.0)];
    let settings = MonitorSettings::new(Duration::from_secs(1))
        .with_groups(vec![MetricGroup::Cpu])
        .with_rules(vec![cpu_rule(80.0, 0)]);
    let history = HistoryStore::open(dir.path().join("history"), RetentionPolicy::unbounded()).unwrap();
    let mut monitor = monitor_with(
        steps,
        settings,
        history,
        vec![Box::new(FileSink::new(&alerts_path))],
    );

    for _ in 0..4 {
        monitor.tick();
    }
    monitor.finish();

    let alerts = read_alert_log(&alerts_path, None).unwrap();
    let values: Vec<f64> = alerts.iter().map(|a| a.value).collect();
    assert_eq!(values, vec![90.0, 95.0]);
    assert!(alerts[0].seq < alerts[1].seq);

    let reopened = HistoryStore::open(dir.path().join("history"), RetentionPolicy::unbounded()).unwrap();
    assert_eq!(reopened.len(), 4);
}

#[test]
fn test_zero_interval_is_rejected() {
    let result = Monitor::new(
        Box::new(ScriptedSource::new(vec![cpu(1.0)])),
        MonitorSettings::new(Duration::ZERO),
        HistoryStore::in_memory(RetentionPolicy::unbounded()),
        Vec::new(),
    );

    assert!(matches!(result, Err(HealthError::Config(_))));
}

#[test]
fn test_history_ahead_of_clock_does_not_block_appends() {
    let dir = TempDir::new().unwrap();
    let ahead = Utc::now() + chrono::Duration::hours(1);
    {
        let mut store = HistoryStore::open(dir.path(), RetentionPolicy::unbounded()).unwrap();
        store.append(Sample::new(ahead, 0).with(CPU, 12.0)).unwrap();
    }

    let history = HistoryStore::open(dir.path(), RetentionPolicy::unbounded()).unwrap();
    let settings = MonitorSettings::new(Duration::from_secs(1)).with_groups(vec![MetricGroup::Cpu]);
    let mut monitor = monitor_with(vec![cpu(20.0)], settings, history, Vec::new());
    let handle = monitor.handle();

    for _ in 0..5 {
        monitor.tick();
    }

    let records = handle.recent_history(10);
    assert_eq!(records.len(), 6);
    assert!(records.iter().all(|r| r.timestamp() >= ahead));
    assert_eq!(handle.stats().store_errors, 0);
}

#[cfg(unix)]
#[test]
fn test_failed_history_write_is_retried_by_monitor() {
    let dir = TempDir::new().unwrap();
    let history = HistoryStore::open(dir.path(), RetentionPolicy::unbounded()).unwrap();
    let settings = MonitorSettings::new(Duration::from_secs(1)).with_groups(vec![MetricGroup::Cpu]);
    let mut monitor = monitor_with(vec![cpu(1.0), cpu(2.0), cpu(3.0)], settings, history, Vec::new());
    let handle = monitor.handle();

    // A directory where today's file belongs makes every append fail
    let today = dir
        .path()
        .join(format!("history-{}.jsonl", Utc::now().format("%Y-%m-%d")));
    fs::create_dir(&today).unwrap();

    monitor.tick();
    monitor.tick();
    assert_eq!(handle.stats().store_errors, 2);
    assert_eq!(handle.recent_history(10).len(), 2);

    fs::remove_dir(&today).unwrap();
    monitor.tick();
    assert_eq!(handle.stats().store_errors, 2);
    assert_eq!(handle.stats().ticks, 3);

    let written: Vec<f64> = fs::read_to_string(&today)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str::<HistoryRecord>(line).unwrap())
        .filter_map(|record| record.sample.get(CPU))
        .collect();
    assert_eq!(written, vec![1.0, 2.0, 3.0]);
    monitor.finish();
}
