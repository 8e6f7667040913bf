//! Live dashboard command.

use anyhow::{Context, Result};
use clap::ArgMatches;

use crate::core::timespec::parse_duration;
use crate::core::Config;
use crate::ui::monitor_tui::run_dashboard;

use super::start_monitor;

/// Execute the dashboard command
pub fn execute(matches: Option<&ArgMatches>) -> Result<()> {
    let mut config = Config::load()?;

    let detailed = matches.is_some_and(|m| m.get_flag("detailed"));
    if let Some(refresh) = matches.and_then(|m| m.get_one::<String>("refresh")) {
        config.refresh_interval = parse_duration(refresh)?.as_secs_f64();
    }
    if detailed {
        config.display.show_processes = true;
    }
    config.validate()?;

    let (runtime, host) = start_monitor(&config)?;
    let result = run_dashboard(runtime.handle(), host, detailed).context("Failed to run dashboard");
    runtime.shutdown();

    result
}
