//! The narrow seam between the monitor and the platform.
//!
//! Everything platform-specific lives behind [`MetricSource`]; the sampler,
//! evaluator and history store only ever see a [`Reading`].

use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::AdapterError;

use super::metrics::{MetricGroup, ProcessMetrics};

/// What one call to a [`MetricSource`] produced.
///
/// Groups either contribute values or an error, never both.
#[derive(Debug, Clone, Default)]
pub struct Reading {
    pub values: BTreeMap<String, f64>,
    pub errors: Vec<AdapterError>,
    pub processes: Vec<ProcessMetrics>,
}

impl Reading {
    /// Record the outcome of reading one group
    pub fn record(&mut self, outcome: Result<Vec<(&'static str, f64)>, AdapterError>) {
        match outcome {
            Ok(values) => {
                for (metric, value) in values {
                    self.values.insert(metric.to_string(), value);
                }
            }
            Err(err) => self.errors.push(err),
        }
    }

    /// A reading where every requested group failed with the same cause
    pub fn failed<F>(groups: &[MetricGroup], cause: F) -> Self
    where
        F: Fn(MetricGroup) -> AdapterError,
    {
        Self {
            errors: groups.iter().map(|&group| cause(group)).collect(),
            ..Default::default()
        }
    }

    pub fn timed_out(groups: &[MetricGroup], budget: Duration) -> Self {
        Self::failed(groups, |group| AdapterError::timeout(group.name(), budget))
    }
}

/// Produces point-in-time readings for the requested metric groups.
///
/// Implementations must not fail the whole read because one group failed:
/// a missing temperature sensor is an [`AdapterError`] for that group only.
pub trait MetricSource: Send {
    /// Short identifier used in log lines
    fn name(&self) -> &str;

    /// Read every group in `groups` once. `top_processes` bounds the
    /// process list when [`MetricGroup::Processes`] is requested.
    fn read(&mut self, groups: &[MetricGroup], top_processes: usize) -> Reading;
}
