use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::system_monitor::{
    names, sampling_budget, ChannelSpec, Comparison, MetricGroup, MonitorSettings,
    RetentionPolicy, ThresholdRule,
};
use crate::error::HealthError;

const APP_DIR: &str = "health-dashboard";
const CONFIG_FILE: &str = "config.json";
const THRESHOLD_SUFFIX: &str = "_threshold";

/// Dashboard configuration, stored as JSON.
///
/// Loaded once at startup and handed to each component by value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Seconds between samples
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: f64,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Enabled metric groups
    #[serde(default = "MetricGroup::all")]
    pub metrics: Vec<MetricGroup>,
    #[serde(default)]
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertsConfig {
    /// Seconds a rule stays quiet after firing
    #[serde(default = "default_cool_down")]
    pub cool_down: f64,
    #[serde(default)]
    pub repeat_while_breached: bool,
    #[serde(default)]
    pub notify_recovery: bool,
    /// Explicit rules, applied after the `<name>_threshold` shorthands
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
    /// `log`, `file`, `desktop` or `script:<path>`
    #[serde(default = "default_channels")]
    pub channels: Vec<String>,
    /// `<name>_threshold` shorthands such as `cpu_threshold: 80`
    #[serde(flatten)]
    pub thresholds: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    pub metric: String,
    #[serde(default)]
    pub op: Comparison,
    pub limit: f64,
    /// Overrides `alerts.cool_down`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cool_down: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notify_recovery: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_while_breached: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Persist history to disk
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds between recorded samples
    #[serde(default = "default_log_interval")]
    pub interval: f64,
    /// 0 keeps history regardless of age
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// `null` removes the count bound
    #[serde(default = "default_max_records")]
    pub max_records: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_true")]
    pub show_processes: bool,
    #[serde(default = "default_process_count")]
    pub process_count: usize,
}

fn default_refresh_interval() -> f64 {
    2.0
}

fn default_cool_down() -> f64 {
    60.0
}

fn default_channels() -> Vec<String> {
    vec!["log".to_string(), "file".to_string()]
}

fn default_true() -> bool {
    true
}

fn default_log_interval() -> f64 {
    60.0
}

fn default_retention_days() -> u32 {
    30
}

fn default_max_records() -> Option<usize> {
    Some(50_000)
}

fn default_process_count() -> usize {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            refresh_interval: default_refresh_interval(),
            alerts: AlertsConfig::default(),
            logging: LoggingConfig::default(),
            metrics: MetricGroup::all(),
            display: DisplayConfig::default(),
        }
    }
}

impl Default for AlertsConfig {
    fn default() -> Self {
        let thresholds = [("cpu_threshold", 80), ("ram_threshold", 85), ("disk_threshold", 90)]
            .into_iter()
            .map(|(key, limit)| (key.to_string(), serde_json::Value::from(limit)))
            .collect();

        Self {
            cool_down: default_cool_down(),
            repeat_while_breached: false,
            notify_recovery: false,
            rules: Vec::new(),
            channels: default_channels(),
            thresholds,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: default_log_interval(),
            retention_days: default_retention_days(),
            max_records: default_max_records(),
            directory: None,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            show_processes: true,
            process_count: default_process_count(),
        }
    }
}

/// Non-negative seconds as a [`Duration`], rejecting values too large to represent
fn seconds(field: &str, value: f64) -> crate::error::Result<Duration> {
    if value < 0.0 {
        return Err(HealthError::config(format!("{} must be >= 0, got {}", field, value)));
    }
    Duration::try_from_secs_f64(value)
        .map_err(|e| HealthError::config(format!("{} = {} is not a usable duration: {}", field, value, e)))
}

/// Metric a `<name>_threshold` shorthand refers to
pub fn threshold_metric(name: &str) -> Option<&'static str> {
    match name.to_ascii_lowercase().as_str() {
        "cpu" => Some(names::CPU_USAGE_PCT),
        "ram" | "mem" | "memory" => Some(names::MEM_USAGE_PCT),
        "swap" => Some(names::SWAP_PCT),
        "disk" => Some(names::DISK_USAGE_PCT),
        "temp" | "temperature" => Some(names::TEMP_CPU_CELSIUS),
        "load" => Some(names::LOAD_AVG_1M),
        _ => None,
    }
}

impl Config {
    /// Load from the default location, writing the default file first if none exists
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            let config = Config::default();
            config.save_to(config_path)?;
            log::info!("Created default configuration at {}", config_path.display());
            return Ok(config);
        }

        let data = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;
        let config: Config = serde_json::from_str(&data)
            .map_err(|e| HealthError::config(format!("{}: {}", config_path.display(), e)))?;

        config.validate()?;
        log::debug!("Loaded configuration from {}", config_path.display());
        Ok(config)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let data = serde_json::to_string_pretty(self).with_context(|| "Failed to serialize config")?;

        fs::write(config_path, data)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        Ok(())
    }

    /// Reject anything the monitor could not run with
    pub fn validate(&self) -> crate::error::Result<()> {
        self.refresh()?;
        seconds("alerts.cool_down", self.alerts.cool_down)?;
        self.record_every()?;
        if self.logging.max_records == Some(0) {
            return Err(HealthError::config("logging.max_records must be at least 1"));
        }
        if self.metrics.is_empty() {
            return Err(HealthError::config("metrics must enable at least one group"));
        }
        for channel in &self.alerts.channels {
            channel.parse::<ChannelSpec>().map_err(HealthError::config)?;
        }

        // Building the rules checks shorthands and explicit rules
        self.threshold_rules()?;
        Ok(())
    }

    pub fn refresh(&self) -> crate::error::Result<Duration> {
        let refresh = seconds("refresh_interval", self.refresh_interval)?;
        if refresh.is_zero() {
            return Err(HealthError::config(format!(
                "refresh_interval must be a positive number of seconds, got {}",
                self.refresh_interval
            )));
        }
        Ok(refresh)
    }

    /// Minimum spacing between recorded history samples
    pub fn record_every(&self) -> crate::error::Result<Duration> {
        seconds("logging.interval", self.logging.interval)
    }

    pub fn sampling_budget(&self) -> crate::error::Result<Duration> {
        Ok(sampling_budget(self.refresh()?))
    }

    /// Shorthands first, then explicit rules; the last rule for a metric wins
    pub fn threshold_rules(&self) -> crate::error::Result<Vec<ThresholdRule>> {
        let alerts = &self.alerts;
        let mut rules = Vec::new();

        for (key, value) in &alerts.thresholds {
            let Some(name) = key.strip_suffix(THRESHOLD_SUFFIX) else {
                return Err(HealthError::config(format!("unknown alerts key '{}'", key)));
            };
            let metric = match threshold_metric(name) {
                Some(metric) => metric.to_string(),
                None if name.contains('.') => name.to_string(),
                None => {
                    return Err(HealthError::config(format!(
                        "alerts.{} does not name a known metric",
                        key
                    )))
                }
            };
            let limit = value.as_f64().ok_or_else(|| {
                HealthError::config(format!("alerts.{} must be a number, got {}", key, value))
            })?;

            rules.push(self.rule(metric, Comparison::Greater, limit, None, None, None)?);
        }

        for rule in &alerts.rules {
            rules.push(self.rule(
                rule.metric.clone(),
                rule.op,
                rule.limit,
                rule.cool_down,
                rule.notify_recovery,
                rule.repeat_while_breached,
            )?);
        }

        Ok(rules)
    }

    fn rule(
        &self,
        metric: String,
        op: Comparison,
        limit: f64,
        cool_down: Option<f64>,
        notify_recovery: Option<bool>,
        repeat: Option<bool>,
    ) -> crate::error::Result<ThresholdRule> {
        if metric.trim().is_empty() {
            return Err(HealthError::config("alert rule has an empty metric name"));
        }
        if !limit.is_finite() {
            return Err(HealthError::config(format!("limit for {} must be finite", metric)));
        }
        let cool_down = seconds(
            &format!("cool_down for {}", metric),
            cool_down.unwrap_or(self.alerts.cool_down),
        )?;
        if MetricGroup::of_metric(&metric).is_none() {
            log::warn!("Alert rule on '{}' matches no collected metric", metric);
        }

        Ok(
            ThresholdRule::new(metric, op, limit, cool_down)
                .with_recovery(notify_recovery.unwrap_or(self.alerts.notify_recovery))
                .repeating(repeat.unwrap_or(self.alerts.repeat_while_breached)),
        )
    }

    pub fn channels(&self) -> crate::error::Result<Vec<ChannelSpec>> {
        self.alerts
            .channels
            .iter()
            .map(|c| c.parse::<ChannelSpec>().map_err(HealthError::config))
            .collect()
    }

    pub fn retention(&self) -> RetentionPolicy {
        RetentionPolicy::from_days(self.logging.retention_days)
            .with_max_records(self.logging.max_records)
    }

    pub fn process_count(&self) -> usize {
        if self.display.show_processes {
            self.display.process_count
        } else {
            0
        }
    }

    /// Settings for a [`crate::core::system_monitor::Monitor`] built from this config
    pub fn monitor_settings(&self) -> crate::error::Result<MonitorSettings> {
        let mut groups = self.metrics.clone();
        if self.process_count() == 0 {
            groups.retain(|g| *g != MetricGroup::Processes);
        }

        Ok(MonitorSettings::new(self.refresh()?)
            .with_groups(groups)
            .with_rules(self.threshold_rules()?)
            .with_top_processes(self.process_count())
            .with_record_every(self.record_every()?))
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir =
            dirs::config_dir().with_context(|| "Could not determine config directory")?;

        Ok(config_dir.join(APP_DIR).join(CONFIG_FILE))
    }

    pub fn data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_dir().with_context(|| "Could not determine data directory")?;

        Ok(data_dir.join(APP_DIR))
    }

    pub fn history_dir(&self) -> Result<PathBuf> {
        match &self.logging.directory {
            Some(dir) => Ok(dir.clone()),
            None => Ok(Self::data_dir()?.join("history")),
        }
    }

    pub fn alerts_log_path() -> Result<PathBuf> {
        Ok(Self::data_dir()?.join("alerts.jsonl"))
    }
}
