//! Replay the persisted alert log.

use anyhow::Result;
use chrono::Utc;
use clap::ArgMatches;

use crate::core::system_monitor::read_alert_log;
use crate::core::timespec::parse_time_bound;
use crate::core::Config;
use crate::ui::dimmed;
use crate::ui::system_formatters::print_alert;

/// Execute the alerts command
pub fn execute(matches: &ArgMatches) -> Result<()> {
    let since = matches
        .get_one::<String>("since")
        .map(|s| parse_time_bound(s, Utc::now()))
        .transpose()?;

    let path = Config::alerts_log_path()?;
    let alerts = read_alert_log(&path, since)?;

    if matches.get_flag("json") {
        for alert in &alerts {
            println!("{}", serde_json::to_string(alert)?);
        }
        return Ok(());
    }

    if alerts.is_empty() {
        dimmed(&format!("No alerts recorded in {}", path.display()));
        return Ok(());
    }
    for alert in &alerts {
        print_alert(alert);
    }
    Ok(())
}
