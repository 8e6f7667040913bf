//! Threshold evaluation with per-rule edge triggering and cool-down.
//!
//! Each rule walks a small state machine:
//!
//! ```text
//!            breach, cooled          recover
//!   Ok ──────────────────────▶ Breached ─────────▶ Ok
//!    │                            ▲
//!    │ breach, cooling down       │ cool-down elapsed, still breaching
//!    ▼                            │
//!   Suppressed ───────────────────┘
//!    │ recover
//!    ▼
//!   Ok
//! ```
//!
//! An alert is emitted on `Ok → Breached` and `Suppressed → Breached` only.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::metrics::Sample;
use super::stats::MonitorStats;

const DEFAULT_ALERT_LOG_CAPACITY: usize = 1024;

/// Exceeding the limit by this fraction of its magnitude escalates to critical
const CRITICAL_EXCESS_RATIO: f64 = 0.10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Comparison {
    #[default]
    #[serde(rename = ">")]
    Greater,
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "<")]
    Less,
}

impl Comparison {
    /// Whether `value` breaches `limit`. `value == limit` only breaches `>=`.
    pub fn is_breached(self, value: f64, limit: f64) -> bool {
        match self {
            Comparison::Greater => value > limit,
            Comparison::GreaterOrEqual => value >= limit,
            Comparison::Less => value < limit,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Comparison::Greater => ">",
            Comparison::GreaterOrEqual => ">=",
            Comparison::Less => "<",
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Comparison {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            ">" | "gt" => Ok(Comparison::Greater),
            ">=" | "ge" | "gte" => Ok(Comparison::GreaterOrEqual),
            "<" | "lt" => Ok(Comparison::Less),
            other => Err(format!("unsupported operator '{}'", other)),
        }
    }
}

/// A configured `(metric, operator, limit, cool-down)` rule
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdRule {
    pub metric: String,
    pub op: Comparison,
    pub limit: f64,
    pub cool_down: Duration,
    /// Emit an info alert when the value returns to normal
    pub notify_recovery: bool,
    /// Fire again each time the cool-down elapses while still breaching
    pub repeat_while_breached: bool,
}

impl ThresholdRule {
    pub fn new<S: Into<String>>(metric: S, op: Comparison, limit: f64, cool_down: Duration) -> Self {
        Self {
            metric: metric.into(),
            op,
            limit,
            cool_down,
            notify_recovery: false,
            repeat_while_breached: false,
        }
    }

    pub fn with_recovery(mut self, notify: bool) -> Self {
        self.notify_recovery = notify;
        self
    }

    pub fn repeating(mut self, repeat: bool) -> Self {
        self.repeat_while_breached = repeat;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl AlertSeverity {
    /// Severity from how far past the limit `value` is, relative to the limit
    pub fn from_excess(op: Comparison, value: f64, limit: f64) -> Self {
        let excess = match op {
            Comparison::Less => limit - value,
            Comparison::Greater | Comparison::GreaterOrEqual => value - limit,
        };
        let scale = if limit.abs() > f64::EPSILON { limit.abs() } else { 1.0 };

        if excess / scale >= CRITICAL_EXCESS_RATIO {
            AlertSeverity::Critical
        } else {
            AlertSeverity::Warning
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AlertSeverity::Info => "INFO",
            AlertSeverity::Warning => "WARNING",
            AlertSeverity::Critical => "CRITICAL",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Breach,
    Recovery,
}

/// An individual alert. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Position in the evaluator's firing order
    pub seq: u64,
    pub kind: AlertKind,
    pub metric: String,
    pub op: Comparison,
    pub limit: f64,
    pub value: f64,
    pub severity: AlertSeverity,
    /// Timestamp of the triggering sample
    pub timestamp: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleState {
    Ok,
    Breached,
    /// Breached, but the edge arrived during cool-down
    Suppressed,
}

#[derive(Debug, Clone)]
struct RuleEntry {
    state: RuleState,
    last_fired_ms: Option<u64>,
    last_fired_at: Option<DateTime<Utc>>,
    last_value: Option<f64>,
    fired: u64,
    suppressed: u64,
}

impl RuleEntry {
    fn new() -> Self {
        Self {
            state: RuleState::Ok,
            last_fired_ms: None,
            last_fired_at: None,
            last_value: None,
            fired: 0,
            suppressed: 0,
        }
    }

    fn cooled(&self, now_ms: u64, cool_down: Duration) -> bool {
        self.last_fired_ms
            .map_or(true, |fired| {
                now_ms.saturating_sub(fired) >= cool_down.as_millis() as u64
            })
    }
}

/// Read-only view of one rule for the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleStatus {
    pub metric: String,
    pub op: Comparison,
    pub limit: f64,
    pub state: RuleState,
    pub last_value: Option<f64>,
    pub last_fired: Option<DateTime<Utc>>,
    pub fired: u64,
    pub suppressed: u64,
}

pub struct ThresholdEvaluator {
    rules: Vec<ThresholdRule>,
    states: BTreeMap<String, RuleEntry>,
    next_seq: u64,
    stats: Arc<MonitorStats>,
}

impl ThresholdEvaluator {
    /// Later rules for the same metric replace earlier ones
    pub fn new(rules: Vec<ThresholdRule>) -> Self {
        let mut by_metric: BTreeMap<String, ThresholdRule> = BTreeMap::new();
        for rule in rules {
            by_metric.insert(rule.metric.clone(), rule);
        }

        let states = by_metric
            .keys()
            .map(|metric| (metric.clone(), RuleEntry::new()))
            .collect();

        Self {
            rules: by_metric.into_values().collect(),
            states,
            next_seq: 1,
            stats: Arc::new(MonitorStats::default()),
        }
    }

    pub fn with_stats(mut self, stats: Arc<MonitorStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn rules(&self) -> &[ThresholdRule] {
        &self.rules
    }

    /// Evaluate every rule against `sample`. Rules whose metric is absent are skipped
    /// and keep their state.
    pub fn evaluate(&mut self, sample: &Sample) -> Vec<Alert> {
        let mut alerts = Vec::new();
        let now_ms = sample.elapsed_ms;

        for rule in &self.rules {
            let Some(value) = sample.get(&rule.metric).filter(|v| v.is_finite()) else {
                continue;
            };
            let Some(entry) = self.states.get_mut(&rule.metric) else {
                continue;
            };
            entry.last_value = Some(value);

            let breached = rule.op.is_breached(value, rule.limit);
            let cooled = entry.cooled(now_ms, rule.cool_down);

            let emit = match (entry.state, breached) {
                (RuleState::Ok, true) | (RuleState::Suppressed, true) if cooled => {
                    entry.state = RuleState::Breached;
                    Some(AlertKind::Breach)
                }
                (RuleState::Ok, true) => {
                    entry.state = RuleState::Suppressed;
                    entry.suppressed += 1;
                    self.stats.add_alerts_suppressed(1);
                    log::debug!(
                        "{} breached during cool-down, alert suppressed",
                        rule.metric
                    );
                    None
                }
                (RuleState::Breached, true) if rule.repeat_while_breached && cooled => {
                    Some(AlertKind::Breach)
                }
                (RuleState::Breached, false) => {
                    entry.state = RuleState::Ok;
                    rule.notify_recovery.then_some(AlertKind::Recovery)
                }
                (RuleState::Suppressed, false) => {
                    entry.state = RuleState::Ok;
                    None
                }
                _ => None,
            };

            let Some(kind) = emit else {
                continue;
            };

            if kind == AlertKind::Breach {
                entry.last_fired_ms = Some(now_ms);
                entry.last_fired_at = Some(sample.timestamp);
                entry.fired += 1;
            }

            let alert = build_alert(self.next_seq, kind, rule, value, sample);
            self.next_seq += 1;
            match kind {
                AlertKind::Breach => self.stats.add_alerts_fired(1),
                AlertKind::Recovery => self.stats.add_recoveries(1),
            }
            alerts.push(alert);
        }

        alerts
    }

    /// Snapshot of every rule's state
    pub fn statuses(&self) -> Vec<RuleStatus> {
        self.rules
            .iter()
            .filter_map(|rule| {
                let entry = self.states.get(&rule.metric)?;
                Some(RuleStatus {
                    metric: rule.metric.clone(),
                    op: rule.op,
                    limit: rule.limit,
                    state: entry.state,
                    last_value: entry.last_value,
                    last_fired: entry.last_fired_at,
                    fired: entry.fired,
                    suppressed: entry.suppressed,
                })
            })
            .collect()
    }

    pub fn state_of(&self, metric: &str) -> Option<RuleState> {
        self.states.get(metric).map(|entry| entry.state)
    }
}

fn build_alert(seq: u64, kind: AlertKind, rule: &ThresholdRule, value: f64, sample: &Sample) -> Alert {
    let (severity, message) = match kind {
        AlertKind::Breach => (
            AlertSeverity::from_excess(rule.op, value, rule.limit),
            format!(
                "{} at {:.1} (threshold {} {:.1})",
                rule.metric, value, rule.op, rule.limit
            ),
        ),
        AlertKind::Recovery => (
            AlertSeverity::Info,
            format!(
                "{} back to normal at {:.1} (threshold {} {:.1})",
                rule.metric, value, rule.op, rule.limit
            ),
        ),
    };

    Alert {
        seq,
        kind,
        metric: rule.metric.clone(),
        op: rule.op,
        limit: rule.limit,
        value,
        severity,
        timestamp: sample.timestamp,
        elapsed_ms: sample.elapsed_ms,
        message,
    }
}

/// Ordered, replayable record of fired alerts, bounded to the most recent entries
#[derive(Debug, Clone)]
pub struct AlertLog {
    capacity: usize,
    entries: VecDeque<Arc<Alert>>,
}

impl AlertLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_ALERT_LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity.min(DEFAULT_ALERT_LOG_CAPACITY)),
        }
    }

    pub fn push(&mut self, alert: Arc<Alert>) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(alert);
    }

    /// Alerts whose triggering sample is at or after `since`, oldest first
    pub fn since(&self, since: DateTime<Utc>) -> Vec<Arc<Alert>> {
        let start = self.entries.partition_point(|alert| alert.timestamp < since);
        self.entries.range(start..).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for AlertLog {
    fn default() -> Self {
        Self::new()
    }
}
