//! Alert delivery channels.
//!
//! Sinks run on a delivery task fed by a bounded queue, so a slow script or
//! notification daemon never stalls sampling.

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::process::Command;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::error::SinkError;

use super::alerts::{Alert, AlertKind, AlertSeverity};
use super::stats::MonitorStats;

const DEFAULT_QUEUE_CAPACITY: usize = 64;
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait AlertSink: Send {
    fn name(&self) -> &str;

    async fn deliver(&mut self, alert: &Alert) -> Result<(), SinkError>;
}

/// Configured delivery channel, as written in the config file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelSpec {
    /// Through the `log` facade
    Log,
    /// Appended as JSON lines to the alerts log file
    File,
    /// Desktop notification
    Desktop,
    /// External program run once per alert
    Script(PathBuf),
}

impl FromStr for ChannelSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "log" => Ok(ChannelSpec::Log),
            "file" => Ok(ChannelSpec::File),
            "desktop" => Ok(ChannelSpec::Desktop),
            _ => match s.strip_prefix("script:") {
                Some(path) if !path.trim().is_empty() => {
                    Ok(ChannelSpec::Script(PathBuf::from(path.trim())))
                }
                Some(_) => Err("script channel needs a path: 'script:/path/to/program'".to_string()),
                None => Err(format!(
                    "unknown alert channel '{}' (expected log, file, desktop or script:<path>)",
                    s
                )),
            },
        }
    }
}

impl ChannelSpec {
    pub fn build(&self, alerts_log: &Path) -> Box<dyn AlertSink> {
        match self {
            ChannelSpec::Log => Box::new(LogSink),
            ChannelSpec::File => Box::new(FileSink::new(alerts_log)),
            ChannelSpec::Desktop => Box::new(DesktopSink::default()),
            ChannelSpec::Script(program) => Box::new(ScriptSink::new(program)),
        }
    }
}

/// Writes alerts through the `log` facade
pub struct LogSink;

#[async_trait]
impl AlertSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&mut self, alert: &Alert) -> Result<(), SinkError> {
        match alert.severity {
            AlertSeverity::Critical => log::error!("[{}] {}", alert.severity, alert.message),
            AlertSeverity::Warning => log::warn!("[{}] {}", alert.severity, alert.message),
            AlertSeverity::Info => log::info!("[{}] {}", alert.severity, alert.message),
        }
        Ok(())
    }
}

/// Appends one JSON object per alert to a file
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    fn append(&self, alert: &Alert) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let line = serde_json::to_string(alert)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", line)
    }
}

#[async_trait]
impl AlertSink for FileSink {
    fn name(&self) -> &str {
        "file"
    }

    async fn deliver(&mut self, alert: &Alert) -> Result<(), SinkError> {
        self.append(alert).map_err(|e| {
            SinkError::delivery("file", format!("{}: {}", self.path.display(), e))
        })
    }
}

/// Read alerts written by [`FileSink`] at or after `since`, oldest first.
///
/// Malformed lines are skipped with a warning.
pub fn read_alert_log(path: &Path, since: Option<DateTime<Utc>>) -> crate::error::Result<Vec<Alert>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = fs::File::open(path)?;
    let mut alerts = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Alert>(&line) {
            Ok(alert) if since.map_or(true, |since| alert.timestamp >= since) => alerts.push(alert),
            Ok(_) => {}
            Err(e) => log::warn!("Skipping malformed alert at {}:{}: {}", path.display(), index + 1, e),
        }
    }

    alerts.sort_by_key(|alert| alert.timestamp);
    Ok(alerts)
}

/// Runs an external program per alert, passing the alert through environment variables
pub struct ScriptSink {
    program: PathBuf,
    timeout: Duration,
}

impl ScriptSink {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Self {
            program: program.into(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl AlertSink for ScriptSink {
    fn name(&self) -> &str {
        "script"
    }

    async fn deliver(&mut self, alert: &Alert) -> Result<(), SinkError> {
        let kind = match alert.kind {
            AlertKind::Breach => "breach",
            AlertKind::Recovery => "recovery",
        };

        let mut command = Command::new(&self.program);
        command
            .env("HEALTHDASH_METRIC", &alert.metric)
            .env("HEALTHDASH_VALUE", alert.value.to_string())
            .env("HEALTHDASH_LIMIT", alert.limit.to_string())
            .env("HEALTHDASH_OPERATOR", alert.op.symbol())
            .env("HEALTHDASH_SEVERITY", alert.severity.to_string())
            .env("HEALTHDASH_KIND", kind)
            .env("HEALTHDASH_TIMESTAMP", alert.timestamp.to_rfc3339())
            .env("HEALTHDASH_MESSAGE", &alert.message);

        run_with_timeout(command, "script", self.timeout).await
    }
}

/// Desktop notification through the platform's notifier
pub struct DesktopSink {
    timeout: Duration,
}

impl Default for DesktopSink {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

impl DesktopSink {
    #[cfg(target_os = "linux")]
    fn command(alert: &Alert) -> Option<Command> {
        let urgency = match alert.severity {
            AlertSeverity::Critical => "critical",
            AlertSeverity::Warning => "normal",
            AlertSeverity::Info => "low",
        };
        let mut cmd = Command::new("notify-send");
        cmd.args(["-u", urgency, "System Health Dashboard", alert.message.as_str()]);
        Some(cmd)
    }

    #[cfg(target_os = "macos")]
    fn command(alert: &Alert) -> Option<Command> {
        let script = format!(
            "display notification \"{}\" with title \"System Health Dashboard\"",
            alert.message.replace('"', "'")
        );
        let mut cmd = Command::new("osascript");
        cmd.args(["-e", script.as_str()]);
        Some(cmd)
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    fn command(_alert: &Alert) -> Option<Command> {
        None
    }
}

#[async_trait]
impl AlertSink for DesktopSink {
    fn name(&self) -> &str {
        "desktop"
    }

    async fn deliver(&mut self, alert: &Alert) -> Result<(), SinkError> {
        match Self::command(alert) {
            Some(command) => run_with_timeout(command, "desktop", self.timeout).await,
            None => Err(SinkError::delivery(
                "desktop",
                "desktop notifications are not supported on this platform",
            )),
        }
    }
}

/// Run `command` to completion. On timeout the child is killed and reaped.
async fn run_with_timeout(mut command: Command, sink: &str, timeout: Duration) -> Result<(), SinkError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .map_err(|e| SinkError::delivery(sink, format!("failed to start: {}", e)))?;

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) if status.success() => Ok(()),
        Ok(Ok(status)) => Err(SinkError::delivery(sink, format!("exited with {}", status))),
        Ok(Err(e)) => Err(SinkError::delivery(sink, e.to_string())),
        Err(_) => {
            if let Err(e) = child.kill().await {
                log::debug!("Could not kill timed out {} command: {}", sink, e);
            }
            Err(SinkError::Timeout {
                sink: sink.to_string(),
                timeout,
            })
        }
    }
}

/// Hands alerts to the delivery task without ever blocking the caller
pub struct AlertDispatcher {
    tx: mpsc::Sender<Arc<Alert>>,
    stats: Arc<MonitorStats>,
}

/// Receiving end of an [`AlertDispatcher`]. Runs until every dispatcher is dropped
/// and the queue is drained.
pub struct AlertDelivery {
    rx: mpsc::Receiver<Arc<Alert>>,
    sinks: Vec<Box<dyn AlertSink>>,
    stats: Arc<MonitorStats>,
}

impl AlertDispatcher {
    pub fn new(sinks: Vec<Box<dyn AlertSink>>, stats: Arc<MonitorStats>) -> (Self, AlertDelivery) {
        Self::with_capacity(sinks, DEFAULT_QUEUE_CAPACITY, stats)
    }

    pub fn with_capacity(
        sinks: Vec<Box<dyn AlertSink>>,
        capacity: usize,
        stats: Arc<MonitorStats>,
    ) -> (Self, AlertDelivery) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let delivery = AlertDelivery {
            rx,
            sinks,
            stats: Arc::clone(&stats),
        };
        (Self { tx, stats }, delivery)
    }

    /// Queue an alert for delivery. Drops it (and counts the drop) when the queue is full.
    pub fn dispatch(&self, alert: Arc<Alert>) {
        match self.tx.try_send(alert) {
            Ok(()) => {}
            Err(TrySendError::Full(alert)) => {
                self.stats.add_dropped_alerts(1);
                log::warn!("Alert queue full, dropped: {}", alert.message);
            }
            Err(TrySendError::Closed(alert)) => {
                self.stats.add_dropped_alerts(1);
                log::error!("Alert delivery stopped, dropped: {}", alert.message);
            }
        }
    }
}

impl AlertDelivery {
    pub async fn run(mut self) {
        while let Some(alert) = self.rx.recv().await {
            for sink in self.sinks.iter_mut() {
                if let Err(e) = sink.deliver(&alert).await {
                    self.stats.add_sink_failures(1);
                    log::warn!("Alert delivery via {} failed: {}", sink.name(), e);
                }
            }
        }
        log::debug!("Alert delivery drained");
    }
}
