use std::fs;
use std::time::Duration;

use healthdash::core::system_monitor::{ChannelSpec, Comparison, MetricGroup};
use healthdash::{Config, HealthError};
use tempfile::TempDir;

#[test]
fn test_missing_file_is_created_with_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.json");

    let config = Config::load_from(&path).unwrap();

    assert!(path.exists());
    assert_eq!(config.refresh().unwrap(), Duration::from_secs(2));
    let reloaded = Config::load_from(&path).unwrap();
    assert_eq!(reloaded.refresh_interval, config.refresh_interval);
    assert_eq!(reloaded.alerts.channels, config.alerts.channels);
}

#[test]
fn test_minimal_legacy_file_loads() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");
    fs::write(
        &path,
        r#"{
            "refresh_interval": 1,
            "alerts": { "cpu_threshold": 75, "ram_threshold": 90 },
            "logging": { "enabled": true, "interval": 30 }
        }"#,
    )
    .unwrap();

    let config = Config::load_from(&path).unwrap();
    let rules = config.threshold_rules().unwrap();

    assert_eq!(rules.len(), 2);
    let cpu = rules.iter().find(|r| r.metric == "cpu.usage_pct").unwrap();
    assert_eq!(cpu.limit, 75.0);
    assert_eq!(cpu.op, Comparison::Greater);
    assert_eq!(cpu.cool_down, Duration::from_secs(60));
    assert_eq!(config.metrics, MetricGroup::all());
}

#[test]
fn test_invalid_values_are_config_errors() {
    let dir = TempDir::new().unwrap();
    let cases = [
        r#"{ "refresh_interval": 0 }"#,
        r#"{ "refresh_interval": -1.5 }"#,
        r#"{ "alerts": { "cool_down": -1 } }"#,
        r#"{ "alerts": { "channels": ["pager"] } }"#,
        r#"{ "alerts": { "gpu_threshold": 50 } }"#,
        r#"{ "alerts": { "cpu_threshold": "high" } }"#,
        r#"{ "metrics": [] }"#,
        r#"{ "logging": { "max_records": 0 } }"#,
        r#"{ "refresh_interval": 1e30 }"#,
        r#"{ "alerts": { "cool_down": 1e30 } }"#,
        r#"{ "logging": { "interval": 1e25 } }"#,
    ];

    for (index, body) in cases.iter().enumerate() {
        let path = dir.path().join(format!("bad-{}.json", index));
        fs::write(&path, body).unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(
            matches!(err.downcast_ref::<HealthError>(), Some(HealthError::Config(_))),
            "case {} should be a config error, got {:?}",
            body,
            err
        );
    }
}

#[test]
fn test_malformed_json_is_config_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");
    fs::write(&path, "{ refresh_interval: 2").unwrap();

    let err = Config::load_from(&path).unwrap_err();
    assert!(matches!(err.downcast_ref::<HealthError>(), Some(HealthError::Config(_))));
}

#[test]
fn test_monitor_settings_follow_config() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");
    fs::write(
        &path,
        r#"{
            "refresh_interval": 0.5,
            "metrics": ["cpu", "memory", "processes"],
            "display": { "show_processes": false },
            "alerts": {
                "cpu_threshold": 90,
                "channels": ["log", "script:/usr/local/bin/notify"],
                "rules": [
                    { "metric": "mem.usage_pct", "op": ">=", "limit": 95, "cool_down": 5 }
                ]
            },
            "logging": { "interval": 10, "retention_days": 7, "max_records": 500 }
        }"#,
    )
    .unwrap();

    let config = Config::load_from(&path).unwrap();
    let settings = config.monitor_settings().unwrap();

    assert_eq!(settings.interval, Duration::from_millis(500));
    assert_eq!(settings.budget, Duration::from_millis(250));
    assert_eq!(settings.groups, vec![MetricGroup::Cpu, MetricGroup::Memory]);
    assert_eq!(settings.top_processes, 0);
    assert_eq!(settings.record_every, Duration::from_secs(10));
    assert_eq!(settings.rules.len(), 2);

    let mem = settings.rules.iter().find(|r| r.metric == "mem.usage_pct").unwrap();
    assert_eq!(mem.op, Comparison::GreaterOrEqual);
    assert_eq!(mem.cool_down, Duration::from_secs(5));

    assert_eq!(
        config.channels().unwrap(),
        vec![
            ChannelSpec::Log,
            ChannelSpec::Script("/usr/local/bin/notify".into())
        ]
    );

    let retention = config.retention();
    assert_eq!(retention.max_records, Some(500));
    assert_eq!(retention.max_age, Some(Duration::from_secs(7 * 86_400)));
}

#[test]
fn test_save_then_load_keeps_explicit_rules() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");

    let mut config = Config::default();
    config.refresh_interval = 5.0;
    config.alerts.notify_recovery = true;
    config.save_to(&path).unwrap();

    let loaded = Config::load_from(&path).unwrap();
    assert_eq!(loaded.refresh().unwrap(), Duration::from_secs(5));
    assert!(loaded.alerts.notify_recovery);
    assert!(loaded.threshold_rules().unwrap().iter().all(|r| r.notify_recovery));
}

#[test]
fn test_oversized_intervals_never_panic() {
    let mut config = Config::default();
    config.refresh_interval = 1e30;
    assert!(matches!(config.validate(), Err(HealthError::Config(_))));
    assert!(matches!(config.monitor_settings(), Err(HealthError::Config(_))));
    assert!(matches!(config.sampling_budget(), Err(HealthError::Config(_))));

    let mut config = Config::default();
    config.alerts.cool_down = 1e30;
    assert!(matches!(config.threshold_rules(), Err(HealthError::Config(_))));
    assert!(matches!(config.validate(), Err(HealthError::Config(_))));
}
