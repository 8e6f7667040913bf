// Command handlers module
pub mod alerts;
pub mod completions;
pub mod config;
pub mod dashboard;
pub mod history;
pub mod status;
pub mod watch;

use anyhow::{Context, Result};

use crate::core::system_monitor::{
    AlertSink, HistoryStore, HostInfo, Monitor, MonitorRuntime, SysinfoSource,
};
use crate::core::Config;

/// History store for `config`: on disk when logging is enabled, memory otherwise.
///
/// An unusable history directory is logged and sampling continues in memory.
pub fn open_history(config: &Config) -> Result<HistoryStore> {
    let policy = config.retention();
    if !config.logging.enabled {
        return Ok(HistoryStore::in_memory(policy));
    }

    let dir = config.history_dir()?;
    match HistoryStore::open(&dir, policy) {
        Ok(store) => Ok(store),
        Err(e) => {
            log::warn!("History disabled, cannot open {}: {}", dir.display(), e);
            Ok(HistoryStore::in_memory(policy))
        }
    }
}

/// Alert sinks for every configured channel
pub fn build_sinks(config: &Config) -> Result<Vec<Box<dyn AlertSink>>> {
    let alerts_log = Config::alerts_log_path()?;
    Ok(config
        .channels()?
        .iter()
        .map(|channel| channel.build(&alerts_log))
        .collect())
}

/// Start sampling in the background with everything `config` asks for
pub fn start_monitor(config: &Config) -> Result<(MonitorRuntime, HostInfo)> {
    let source = SysinfoSource::new();
    let host = source.host_info();

    let monitor = Monitor::new(
        Box::new(source),
        config.monitor_settings()?,
        open_history(config)?,
        build_sinks(config)?,
    )?;

    let runtime = MonitorRuntime::start(monitor).context("Failed to start sampling runtime")?;
    Ok((runtime, host))
}
