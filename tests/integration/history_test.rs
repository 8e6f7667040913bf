use std::fs;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use healthdash::core::system_monitor::{HistoryStore, RetentionPolicy, Sample, TAG_ALERTED};
use tempfile::TempDir;

fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, hour, minute, 0).unwrap()
}

fn sample(ts: DateTime<Utc>, cpu: f64) -> Sample {
    Sample::new(ts, 0).with("cpu.usage_pct", cpu)
}

#[test]
fn test_history_survives_reopen() {
    let dir = TempDir::new().unwrap();

    {
        let mut store = HistoryStore::open(dir.path(), RetentionPolicy::unbounded()).unwrap();
        store.append(sample(at(1, 23, 58), 10.0)).unwrap();
        store
            .append_tagged(sample(at(1, 23, 59), 91.0), Some(TAG_ALERTED.to_string()))
            .unwrap();
        store.append(sample(at(2, 0, 1), 12.0)).unwrap();
        assert_eq!(store.pending_writes(), 0);
    }

    assert!(dir.path().join("history-2024-03-01.jsonl").exists());
    assert!(dir.path().join("history-2024-03-02.jsonl").exists());

    let store = HistoryStore::open(dir.path(), RetentionPolicy::unbounded()).unwrap();
    let all = store.all();
    assert_eq!(all.len(), 3);
    assert_eq!(all[1].tag.as_deref(), Some(TAG_ALERTED));
    assert_eq!(all[1].sample.get("cpu.usage_pct"), Some(91.0));
    assert_eq!(store.latest().unwrap().timestamp(), at(2, 0, 1));
}

#[test]
fn test_query_spans_day_files() {
    let dir = TempDir::new().unwrap();
    let mut store = HistoryStore::open(dir.path(), RetentionPolicy::unbounded()).unwrap();
    for (day, hour) in [(1, 22), (1, 23), (2, 0), (2, 1)] {
        store.append(sample(at(day, hour, 0), f64::from(hour))).unwrap();
    }
    drop(store);

    let store = HistoryStore::open(dir.path(), RetentionPolicy::unbounded()).unwrap();
    let window = store.query(at(1, 23, 0), at(2, 0, 0));

    let hours: Vec<f64> = window
        .iter()
        .filter_map(|r| r.sample.get("cpu.usage_pct"))
        .collect();
    assert_eq!(hours, vec![23.0, 0.0]);
    assert!(store.query(at(3, 0, 0), at(4, 0, 0)).is_empty());
}

#[test]
fn test_age_retention_drops_records_and_day_files() {
    let dir = TempDir::new().unwrap();
    let policy = RetentionPolicy::max_age(Duration::from_secs(86_400));
    let mut store = HistoryStore::open(dir.path(), policy).unwrap();

    store.append(sample(at(1, 12, 0), 1.0)).unwrap();
    store.append(sample(at(2, 12, 0), 2.0)).unwrap();
    store.append(sample(at(3, 12, 0), 3.0)).unwrap();

    let kept: Vec<f64> = store
        .all()
        .iter()
        .filter_map(|r| r.sample.get("cpu.usage_pct"))
        .collect();
    assert_eq!(kept, vec![2.0, 3.0]);
    assert!(!dir.path().join("history-2024-03-01.jsonl").exists());
    assert!(dir.path().join("history-2024-03-03.jsonl").exists());
}

#[test]
fn test_reopen_applies_record_limit() {
    let dir = TempDir::new().unwrap();
    {
        let mut store = HistoryStore::open(dir.path(), RetentionPolicy::unbounded()).unwrap();
        for minute in 0..10 {
            store.append(sample(at(5, 8, minute), f64::from(minute))).unwrap();
        }
    }

    let store = HistoryStore::open(dir.path(), RetentionPolicy::max_records(4)).unwrap();
    assert_eq!(store.len(), 4);
    assert_eq!(store.all()[0].timestamp(), at(5, 8, 6));
    assert_eq!(store.last(2).len(), 2);
}

#[test]
fn test_unrelated_files_are_ignored() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("notes.txt"), "not history").unwrap();
    fs::write(dir.path().join("history-latest.jsonl"), "{}").unwrap();

    let mut store = HistoryStore::open(dir.path(), RetentionPolicy::unbounded()).unwrap();
    assert!(store.is_empty());

    store.append(sample(at(1, 0, 0), 5.0)).unwrap();
    assert_eq!(store.len(), 1);
    assert!(dir.path().join("notes.txt").exists());
}

fn lines_on_disk(dir: &std::path::Path) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("history-"))
        .map(|entry| fs::read_to_string(entry.path()).unwrap().lines().count())
        .sum()
}

#[test]
fn test_record_limit_keeps_files_bounded() {
    let dir = TempDir::new().unwrap();
    let mut store = HistoryStore::open(dir.path(), RetentionPolicy::max_records(2)).unwrap();
    let start = at(1, 0, 0);

    for i in 0..1000 {
        store
            .append(sample(start + chrono::Duration::seconds(i), 1.0))
            .unwrap();
        assert!(lines_on_disk(dir.path()) <= 2 + 256);
    }
    drop(store);

    let reopened = HistoryStore::open(dir.path(), RetentionPolicy::max_records(2)).unwrap();
    assert_eq!(reopened.len(), 2);
    assert_eq!(
        reopened.latest().unwrap().timestamp(),
        start + chrono::Duration::seconds(999)
    );

    let everything = HistoryStore::open(dir.path(), RetentionPolicy::unbounded()).unwrap();
    assert!(everything.len() <= 2 + 256);
}

#[test]
fn test_open_compacts_oversized_history() {
    let dir = TempDir::new().unwrap();
    {
        let mut store = HistoryStore::open(dir.path(), RetentionPolicy::unbounded()).unwrap();
        for i in 0..600 {
            store
                .append(sample(at(2, 0, 0) + chrono::Duration::seconds(i), 1.0))
                .unwrap();
        }
    }
    assert_eq!(lines_on_disk(dir.path()), 600);

    let store = HistoryStore::open(dir.path(), RetentionPolicy::max_records(10)).unwrap();
    assert_eq!(store.len(), 10);
    assert_eq!(lines_on_disk(dir.path()), 10);
    assert!(!dir.path().join("history-2024-03-02.jsonl.tmp").exists());
}
