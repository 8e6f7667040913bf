//! Retained, timestamp-ordered sample history.
//!
//! Records live in memory as `Arc`s so readers copy out cheaply. When a
//! directory is configured, each record is also appended to a per-day JSON
//! lines file (`history-YYYY-MM-DD.jsonl`).

use std::collections::{BTreeMap, VecDeque};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

use super::metrics::Sample;

const FILE_PREFIX: &str = "history-";
const FILE_SUFFIX: &str = ".jsonl";

/// Upper bound on records waiting to be written after persistence failures
const MAX_PENDING: usize = 10_000;

/// Dropped lines tolerated on disk before the day files are rewritten
const COMPACTION_SLACK: usize = 256;

/// Tag applied to samples that triggered at least one alert
pub const TAG_ALERTED: &str = "alerted";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub sample: Sample,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl HistoryRecord {
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.sample.timestamp
    }
}

/// How much history is kept. When both bounds are set, whichever removes more wins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_age: Option<Duration>,
    pub max_records: Option<usize>,
}

impl RetentionPolicy {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn max_records(count: usize) -> Self {
        Self {
            max_age: None,
            max_records: Some(count),
        }
    }

    pub fn max_age(age: Duration) -> Self {
        Self {
            max_age: Some(age),
            max_records: None,
        }
    }

    /// `days == 0` means no age limit
    pub fn from_days(days: u32) -> Self {
        if days == 0 {
            Self::unbounded()
        } else {
            Self::max_age(Duration::from_secs(u64::from(days) * 86_400))
        }
    }

    pub fn with_max_records(mut self, count: Option<usize>) -> Self {
        self.max_records = count;
        self
    }

    /// Oldest timestamp kept when the newest record is at `newest`
    fn cutoff(&self, newest: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let age = chrono::Duration::from_std(self.max_age?).ok()?;
        newest.checked_sub_signed(age)
    }
}

pub struct HistoryStore {
    records: VecDeque<Arc<HistoryRecord>>,
    policy: RetentionPolicy,
    log: Option<HistoryLog>,
}

/// Result of an in-memory insert
pub(super) struct Inserted {
    pub record: Arc<HistoryRecord>,
    /// Records retention dropped to make room
    pub pruned: usize,
    /// Records held after the insert
    pub kept: usize,
}

impl HistoryStore {
    /// Memory-only store
    pub fn in_memory(policy: RetentionPolicy) -> Self {
        Self {
            records: VecDeque::new(),
            policy,
            log: None,
        }
    }

    /// Store persisted under `dir`, preloaded with whatever is already there
    pub fn open<P: Into<PathBuf>>(dir: P, policy: RetentionPolicy) -> Result<Self, StoreError> {
        let mut log = HistoryLog::new(dir.into())?;
        let mut records = log.load()?;
        records.sort_by_key(HistoryRecord::timestamp);

        let mut store = Self {
            records: records.into_iter().map(Arc::new).collect(),
            policy,
            log: None,
        };
        log.stale = store.prune();
        if log.needs_compaction(store.len()) {
            if let Err(e) = log.compact(&store.all()) {
                log::warn!("Could not compact history in {}: {}", log.dir.display(), e);
            }
        }
        log::debug!("Loaded {} history records from {}", store.len(), log.dir.display());

        store.log = Some(log);
        Ok(store)
    }

    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    pub fn append(&mut self, sample: Sample) -> Result<(), StoreError> {
        self.append_tagged(sample, None)
    }

    /// Append a sample. The record is kept in memory even when persisting it
    /// fails; the write is retried on the next append or [`HistoryStore::flush`].
    pub fn append_tagged(&mut self, sample: Sample, tag: Option<String>) -> Result<(), StoreError> {
        let inserted = self.insert(sample, tag)?;
        let Some(log) = self.log.as_mut() else {
            return Ok(());
        };

        let result = log.record(inserted.record, inserted.pruned, self.policy);
        if log.needs_compaction(inserted.kept) {
            let snapshot: Vec<_> = self.records.iter().cloned().collect();
            log.compact(&snapshot)?;
        }
        result
    }

    /// Add a record to memory only. Persisting it is the caller's job.
    pub(super) fn insert(&mut self, sample: Sample, tag: Option<String>) -> Result<Inserted, StoreError> {
        if let Some(newest) = self.records.back() {
            if sample.timestamp < newest.timestamp() {
                return Err(StoreError::OutOfOrder {
                    got: sample.timestamp.to_rfc3339(),
                    newest: newest.timestamp().to_rfc3339(),
                });
            }
        }

        let record = Arc::new(HistoryRecord { sample, tag });
        self.records.push_back(Arc::clone(&record));
        let pruned = self.prune();

        Ok(Inserted {
            record,
            pruned,
            kept: self.records.len(),
        })
    }

    /// Hand the on-disk log to the caller so writes can happen outside any lock
    /// around this store
    pub(super) fn detach_log(&mut self) -> Option<HistoryLog> {
        self.log.take()
    }

    /// Records with `start <= timestamp <= end`, oldest first
    pub fn query(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Arc<HistoryRecord>> {
        if start > end {
            return Vec::new();
        }
        let from = self.records.partition_point(|r| r.timestamp() < start);
        let to = self.records.partition_point(|r| r.timestamp() <= end);
        self.records.range(from..to).cloned().collect()
    }

    pub fn all(&self) -> Vec<Arc<HistoryRecord>> {
        self.records.iter().cloned().collect()
    }

    /// Most recent `count` records, oldest first
    pub fn last(&self, count: usize) -> Vec<Arc<HistoryRecord>> {
        let skip = self.records.len().saturating_sub(count);
        self.records.iter().skip(skip).cloned().collect()
    }

    pub fn latest(&self) -> Option<Arc<HistoryRecord>> {
        self.records.back().cloned()
    }

    /// Apply the retention policy. Returns how many records were dropped.
    pub fn prune(&mut self) -> usize {
        let before = self.records.len();

        if let Some(cutoff) = self
            .records
            .back()
            .and_then(|newest| self.policy.cutoff(newest.timestamp()))
        {
            let expired = self.records.partition_point(|r| r.timestamp() < cutoff);
            self.records.drain(..expired);
        }

        if let Some(max) = self.policy.max_records {
            let excess = self.records.len().saturating_sub(max);
            self.records.drain(..excess);
        }

        before - self.records.len()
    }

    /// Retry any records whose write previously failed
    pub fn flush(&mut self) -> Result<(), StoreError> {
        match self.log.as_mut() {
            Some(log) => log.flush(),
            None => Ok(()),
        }
    }

    /// Records accepted in memory but not yet written to disk
    pub fn pending_writes(&self) -> usize {
        self.log.as_ref().map_or(0, HistoryLog::pending_writes)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Per-day JSON lines files, appended to and periodically rewritten
/// so they hold no more than the retained records plus a bounded backlog
pub(super) struct HistoryLog {
    dir: PathBuf,
    pending: VecDeque<Arc<HistoryRecord>>,
    pruned_through: Option<NaiveDate>,
    /// Lines on disk whose records retention already dropped
    stale: usize,
}

impl HistoryLog {
    fn new(dir: PathBuf) -> Result<Self, StoreError> {
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        Ok(Self {
            dir,
            pending: VecDeque::new(),
            pruned_through: None,
            stale: 0,
        })
    }

    pub(super) fn directory(&self) -> &Path {
        &self.dir
    }

    pub(super) fn pending_writes(&self) -> usize {
        self.pending.len()
    }

    fn file_for(&self, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{}{}{}", FILE_PREFIX, date.format("%Y-%m-%d"), FILE_SUFFIX))
    }

    fn day_files(&self) -> Result<Vec<(NaiveDate, PathBuf)>, StoreError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| StoreError::io(&self.dir, e))?;
        let mut files: Vec<(NaiveDate, PathBuf)> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let path = entry.path();
                let name = path.file_name()?.to_str()?;
                let date = name.strip_prefix(FILE_PREFIX)?.strip_suffix(FILE_SUFFIX)?;
                let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
                Some((date, path))
            })
            .collect();
        files.sort();
        Ok(files)
    }

    fn load(&self) -> Result<Vec<HistoryRecord>, StoreError> {
        let mut records = Vec::new();

        for (_, path) in self.day_files()? {
            let file = fs::File::open(&path).map_err(|e| StoreError::io(&path, e))?;
            for (index, line) in BufReader::new(file).lines().enumerate() {
                let line = line.map_err(|e| StoreError::io(&path, e))?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<HistoryRecord>(&line) {
                    Ok(record) => records.push(record),
                    Err(e) => {
                        // A torn final line after a crash is expected
                        log::warn!("Skipping malformed history line {}:{}: {}", path.display(), index + 1, e)
                    }
                }
            }
        }

        Ok(records)
    }

    /// Write `record` (and anything still pending). `pruned` is how many
    /// records the in-memory insert dropped.
    pub(super) fn record(
        &mut self,
        record: Arc<HistoryRecord>,
        pruned: usize,
        policy: RetentionPolicy,
    ) -> Result<(), StoreError> {
        let date = record.timestamp().date_naive();
        self.stale += pruned;
        self.pending.push_back(record);
        if self.pending.len() > MAX_PENDING {
            self.pending.pop_front();
            log::warn!("History write backlog full, oldest unwritten record discarded");
        }

        self.flush()?;
        self.remove_expired(date, policy)
    }

    pub(super) fn flush(&mut self) -> Result<(), StoreError> {
        while let Some(record) = self.pending.front() {
            let path = self.file_for(record.timestamp().date_naive());
            let line = serde_json::to_string(record.as_ref())?;

            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|e| StoreError::io(&path, e))?;
            writeln!(file, "{}", line).map_err(|e| StoreError::io(&path, e))?;

            self.pending.pop_front();
        }
        Ok(())
    }

    /// Whether dropped lines outnumber both the kept records and the fixed slack
    pub(super) fn needs_compaction(&self, kept: usize) -> bool {
        self.stale > kept.max(COMPACTION_SLACK)
    }

    /// Rewrite the day files so they hold exactly `retained`, oldest first.
    ///
    /// Every new file is written beside the old one before any rename, so a
    /// failure leaves the previous files untouched.
    pub(super) fn compact(&mut self, retained: &[Arc<HistoryRecord>]) -> Result<(), StoreError> {
        let mut days: BTreeMap<NaiveDate, String> = BTreeMap::new();
        for record in retained {
            let day = days.entry(record.timestamp().date_naive()).or_default();
            day.push_str(&serde_json::to_string(record.as_ref())?);
            day.push('\n');
        }

        let mut staged = Vec::with_capacity(days.len());
        for (date, contents) in &days {
            let path = self.file_for(*date);
            let tmp = path.with_extension("jsonl.tmp");
            if let Err(e) = fs::write(&tmp, contents) {
                for (tmp, _) in &staged {
                    let _ = fs::remove_file(tmp);
                }
                let _ = fs::remove_file(&tmp);
                return Err(StoreError::io(&tmp, e));
            }
            staged.push((tmp, path));
        }

        for (date, path) in self.day_files()? {
            if !days.contains_key(&date) {
                fs::remove_file(&path).map_err(|e| StoreError::io(&path, e))?;
            }
        }
        for (tmp, path) in staged {
            fs::rename(&tmp, &path).map_err(|e| StoreError::io(&path, e))?;
        }

        log::debug!(
            "Compacted history in {}: {} stale lines dropped",
            self.dir.display(),
            self.stale
        );
        self.pending.clear();
        self.stale = 0;
        Ok(())
    }

    /// Delete day files entirely older than the age cutoff. Runs at most once per day.
    fn remove_expired(&mut self, today: NaiveDate, policy: RetentionPolicy) -> Result<(), StoreError> {
        if self.pruned_through == Some(today) {
            return Ok(());
        }
        let Some(max_age) = policy.max_age else {
            self.pruned_through = Some(today);
            return Ok(());
        };

        let keep_days = i64::try_from(max_age.as_secs() / 86_400).unwrap_or(i64::MAX);
        let Some(oldest_kept) = chrono::Duration::try_days(keep_days)
            .and_then(|keep| today.checked_sub_signed(keep))
        else {
            self.pruned_through = Some(today);
            return Ok(());
        };

        for (date, path) in self.day_files()? {
            if date < oldest_kept {
                fs::remove_file(&path).map_err(|e| StoreError::io(&path, e))?;
                log::info!("Removed expired history file {}", path.display());
            }
        }

        self.pruned_through = Some(today);
        Ok(())
    }
}
