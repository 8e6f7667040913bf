//! Query persisted history.

use std::io;
use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use clap::ArgMatches;

use crate::core::system_monitor::{HistoryRecord, HistoryStore, RetentionPolicy};
use crate::core::timespec::parse_time_bound;
use crate::core::Config;
use crate::ui::system_formatters::{print_history_table, write_history_csv};

/// Execute the history command
pub fn execute(matches: &ArgMatches) -> Result<()> {
    let config = Config::load()?;
    let dir = config.history_dir()?;
    let now = Utc::now();

    let start = match matches.get_one::<String>("since") {
        Some(since) => parse_time_bound(since, now)?,
        None => DateTime::<Utc>::MIN_UTC,
    };
    let end = match matches.get_one::<String>("until") {
        Some(until) => parse_time_bound(until, now)?,
        None => DateTime::<Utc>::MAX_UTC,
    };
    if start > end {
        bail!("--since must not be later than --until");
    }

    // Reading only: nothing is appended, so no files are pruned
    let store = HistoryStore::open(&dir, RetentionPolicy::unbounded())?;
    let mut records = store.query(start, end);
    if let Some(&last) = matches.get_one::<usize>("last") {
        let skip = records.len().saturating_sub(last);
        records.drain(..skip);
    }

    let format = matches
        .get_one::<String>("format")
        .map(String::as_str)
        .unwrap_or("table");
    output(&records, format)
}

fn output(records: &[Arc<HistoryRecord>], format: &str) -> Result<()> {
    match format {
        "json" => {
            for record in records {
                println!("{}", serde_json::to_string(record.as_ref())?);
            }
        }
        "csv" => write_history_csv(records, &mut io::stdout().lock())?,
        _ => print_history_table(records),
    }
    Ok(())
}
