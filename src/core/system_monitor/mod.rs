//! System monitoring core functionality.
//!
//! Metric collection, threshold evaluation, retained history and alert
//! delivery. The platform library only appears in [`collector`]; everything
//! else works on [`Sample`]s.

pub mod alerts;
mod collector;
pub mod history;
pub mod metrics;
mod runtime;
mod sampler;
pub mod sinks;
mod source;
mod stats;

pub use alerts::{
    Alert, AlertKind, AlertLog, AlertSeverity, Comparison, RuleState, RuleStatus,
    ThresholdEvaluator, ThresholdRule,
};
pub use collector::SysinfoSource;
pub use history::{HistoryRecord, HistoryStore, RetentionPolicy, TAG_ALERTED};
pub use metrics::{names, DiskUsage, HostInfo, MetricGroup, ProcessMetrics, Sample};
pub use runtime::{
    sampling_budget, Monitor, MonitorHandle, MonitorRuntime, MonitorSettings, SampleSubscription,
    TickOutcome, MAX_SAMPLING_BUDGET,
};
pub use sampler::Sampler;
pub use sinks::{
    read_alert_log, AlertDelivery, AlertDispatcher, AlertSink, ChannelSpec, DesktopSink, FileSink, LogSink,
    ScriptSink,
};
pub use source::{MetricSource, Reading};
pub use stats::{MonitorStats, StatsSnapshot};
