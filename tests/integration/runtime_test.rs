use std::thread;
use std::time::{Duration, Instant};

use healthdash::core::system_monitor::{
    HistoryStore, MetricGroup, Monitor, MonitorRuntime, MonitorSettings, RetentionPolicy,
};

use super::scripted::{cpu, reads_started, ScriptedSource};

fn start(source: ScriptedSource, interval: Duration) -> MonitorRuntime {
    let settings = MonitorSettings::new(interval).with_groups(vec![MetricGroup::Cpu]);
    let monitor = Monitor::new(
        Box::new(source),
        settings,
        HistoryStore::in_memory(RetentionPolicy::unbounded()),
        Vec::new(),
    )
    .unwrap();
    MonitorRuntime::start(monitor).unwrap()
}

fn wait_until<F: Fn() -> bool>(limit: Duration, done: F) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    done()
}

#[test]
fn test_runtime_publishes_samples() {
    let runtime = start(
        ScriptedSource::new(vec![cpu(10.0), cpu(20.0), cpu(30.0)]),
        Duration::from_millis(20),
    );
    let handle = runtime.handle();
    let mut live = handle.subscribe();
    let baseline = handle.stats().ticks;

    assert!(wait_until(Duration::from_secs(5), || handle.stats().ticks >= baseline + 3));
    assert!(handle.current().is_some());

    let received = std::iter::from_fn(|| live.try_recv()).count();
    assert!(received >= 1);

    runtime.shutdown();
    let history = handle.recent_history(100);
    assert!(history.len() >= 3);
    assert!(history.windows(2).all(|w| w[0].timestamp() <= w[1].timestamp()));
}

#[test]
fn test_slow_source_times_out_without_stalling() {
    let source = ScriptedSource::new(vec![cpu(42.0)]).with_delay(Duration::from_millis(300));
    let runtime = start(source, Duration::from_millis(100));
    let handle = runtime.handle();

    assert!(wait_until(Duration::from_secs(5), || {
        let stats = handle.stats();
        stats.ticks >= 4 && stats.adapter_timeouts >= 1
    }));

    let errors = handle.adapter_errors();
    assert!(errors.iter().all(|e| e.is_timeout()));

    let started = Instant::now();
    runtime.shutdown();
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[test]
fn test_shutdown_stops_ticking() {
    let runtime = start(ScriptedSource::new(vec![cpu(5.0)]), Duration::from_millis(10));
    let handle = runtime.handle();

    assert!(wait_until(Duration::from_secs(5), || handle.stats().ticks >= 2));
    runtime.shutdown();

    let after_shutdown = handle.stats().ticks;
    thread::sleep(Duration::from_millis(100));
    assert_eq!(handle.stats().ticks, after_shutdown);
}

#[test]
fn test_shutdown_waits_for_in_flight_tick() {
    let source = ScriptedSource::new(vec![cpu(64.0)]).with_delay(Duration::from_millis(150));
    let reads = source.reads();
    let runtime = start(source, Duration::from_secs(1));
    let handle = runtime.handle();

    assert!(wait_until(Duration::from_secs(5), || reads_started(&reads) >= 1));
    runtime.shutdown();

    let stats = handle.stats();
    assert_eq!(stats.ticks, 1);
    assert_eq!(stats.adapter_timeouts, 0);
    let history = handle.recent_history(10);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].sample.get("cpu.usage_pct"), Some(64.0));
    assert_eq!(reads_started(&reads), 1);
}
