// Deterministic metric source shared by the integration tests

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use healthdash::core::system_monitor::{MetricGroup, MetricSource, Reading};
use healthdash::error::AdapterError;
use parking_lot::Mutex;

/// One scripted read: metric values plus groups that should fail
#[derive(Debug, Clone, Default)]
pub struct Step {
    pub values: BTreeMap<String, f64>,
    pub failing: Vec<MetricGroup>,
}

impl Step {
    pub fn value(mut self, metric: &str, value: f64) -> Self {
        self.values.insert(metric.to_string(), value);
        self
    }

    pub fn failing(mut self, group: MetricGroup) -> Self {
        self.failing.push(group);
        self
    }
}

/// Replays queued steps. The last step repeats once the queue is empty.
pub struct ScriptedSource {
    steps: Arc<Mutex<VecDeque<Step>>>,
    last: Step,
    delay: Duration,
    reads: Arc<AtomicUsize>,
}

impl ScriptedSource {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Arc::new(Mutex::new(steps.into())),
            last: Step::default(),
            delay: Duration::ZERO,
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Sleep this long inside every read
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Counts reads as they start, shared with clones taken before the source is boxed
    pub fn reads(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.reads)
    }
}

pub fn reads_started(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}

impl MetricSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    fn read(&mut self, groups: &[MetricGroup], _top_processes: usize) -> Reading {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if let Some(step) = self.steps.lock().pop_front() {
            self.last = step;
        }

        let mut reading = Reading::default();
        for &group in groups {
            if self.last.failing.contains(&group) {
                reading.errors.push(AdapterError::missing_sensor(group.name()));
                continue;
            }
            for (metric, value) in &self.last.values {
                if MetricGroup::of_metric(metric) == Some(group) {
                    reading.values.insert(metric.clone(), *value);
                }
            }
        }
        reading
    }
}

pub fn cpu(value: f64) -> Step {
    Step::default().value("cpu.usage_pct", value)
}
