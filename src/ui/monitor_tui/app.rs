use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};

use crate::core::system_monitor::{
    names, Alert, HostInfo, MonitorHandle, ProcessMetrics, RuleStatus, Sample,
    SampleSubscription, StatsSnapshot,
};
use crate::error::AdapterError;

use super::event_handler::MonitorEvent;
use super::render::render_ui;

const TREND_CAPACITY: usize = 60;
const RECENT_ALERTS: usize = 5;
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Fixed-size window of recent values for a sparkline
#[derive(Debug, Clone)]
pub struct Trend {
    capacity: usize,
    values: VecDeque<f64>,
}

impl Trend {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            values: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, value: f64) {
        if self.values.len() >= self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Values scaled by 10 for bar charts (0-1000 for percentages)
    pub fn as_u64(&self) -> Vec<u64> {
        self.values.iter().map(|&v| (v * 10.0) as u64).collect()
    }
}

/// Dashboard state, rebuilt from the monitor handle every frame
pub struct DashboardApp {
    pub host: HostInfo,
    pub interval: Duration,
    pub current: Option<Arc<Sample>>,
    pub cpu_trend: Trend,
    pub mem_trend: Trend,
    pub rules: Vec<RuleStatus>,
    pub recent_alerts: Vec<Arc<Alert>>,
    pub processes: Vec<ProcessMetrics>,
    pub adapter_errors: Vec<AdapterError>,
    pub stats: StatsSnapshot,
    pub detailed: bool,
    pub should_quit: bool,
    pub show_help: bool,
    pub process_sort_by_memory: bool,
    pub selected_process_index: usize,
    handle: MonitorHandle,
    subscription: SampleSubscription,
    started: DateTime<Utc>,
}

impl DashboardApp {
    pub fn new(handle: MonitorHandle, host: HostInfo, detailed: bool) -> Self {
        let mut cpu_trend = Trend::new(TREND_CAPACITY);
        let mut mem_trend = Trend::new(TREND_CAPACITY);
        for record in handle.recent_history(TREND_CAPACITY) {
            if let Some(cpu) = record.sample.get(names::CPU_USAGE_PCT) {
                cpu_trend.push(cpu);
            }
            if let Some(mem) = record.sample.get(names::MEM_USAGE_PCT) {
                mem_trend.push(mem);
            }
        }

        Self {
            host,
            interval: handle.interval(),
            current: None,
            cpu_trend,
            mem_trend,
            rules: Vec::new(),
            recent_alerts: Vec::new(),
            processes: Vec::new(),
            adapter_errors: Vec::new(),
            stats: StatsSnapshot::default(),
            detailed,
            should_quit: false,
            show_help: false,
            process_sort_by_memory: false,
            selected_process_index: 0,
            subscription: handle.subscribe(),
            handle,
            started: Utc::now(),
        }
    }

    /// Pull everything new from the monitor
    pub fn refresh(&mut self) {
        while let Some(sample) = self.subscription.try_recv() {
            if let Some(cpu) = sample.get(names::CPU_USAGE_PCT) {
                self.cpu_trend.push(cpu);
            }
            if let Some(mem) = sample.get(names::MEM_USAGE_PCT) {
                self.mem_trend.push(mem);
            }
        }

        self.current = self.handle.current();
        self.rules = self.handle.rule_states();
        self.adapter_errors = self.handle.adapter_errors();
        self.stats = self.handle.stats();

        let alerts = self.handle.alerts(self.started);
        let skip = alerts.len().saturating_sub(RECENT_ALERTS);
        self.recent_alerts = alerts.into_iter().skip(skip).rev().collect();

        let mut processes = self.handle.top_processes();
        if self.process_sort_by_memory {
            processes.sort_by(|a, b| b.memory_bytes.cmp(&a.memory_bytes));
        }
        self.processes = processes;
        self.selected_process_index = self
            .selected_process_index
            .min(self.processes.len().saturating_sub(1));
    }

    pub fn value(&self, metric: &str) -> Option<f64> {
        self.current.as_ref().and_then(|s| s.get(metric))
    }

    /// Handle keyboard events
    pub fn handle_event(&mut self, event: MonitorEvent) {
        if self.show_help && event != MonitorEvent::None {
            self.show_help = false;
            if event != MonitorEvent::Quit {
                return;
            }
        }

        match event {
            MonitorEvent::Quit => self.should_quit = true,
            MonitorEvent::ToggleHelp => self.show_help = !self.show_help,
            MonitorEvent::ToggleDetails => self.detailed = !self.detailed,
            MonitorEvent::ToggleProcessSort => {
                self.process_sort_by_memory = !self.process_sort_by_memory;
                self.selected_process_index = 0;
            }
            MonitorEvent::ProcessUp => {
                self.selected_process_index = self.selected_process_index.saturating_sub(1);
            }
            MonitorEvent::ProcessDown => {
                let max_index = self.processes.len().saturating_sub(1);
                if self.selected_process_index < max_index {
                    self.selected_process_index += 1;
                }
            }
            MonitorEvent::None => {}
        }
    }
}

/// Run the dashboard until the user quits. Sampling keeps running on the
/// monitor's own runtime; this loop only reads.
pub fn run_dashboard(handle: MonitorHandle, host: HostInfo, detailed: bool) -> Result<()> {
    // Setup terminal
    enable_raw_mode().context("Failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)
        .context("Failed to enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("Failed to create terminal")?;

    let mut app = DashboardApp::new(handle, host, detailed);
    let result = event_loop(&mut terminal, &mut app);

    // Restore terminal even when the loop failed
    disable_raw_mode().context("Failed to disable raw mode")?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )
    .context("Failed to leave alternate screen")?;
    terminal.show_cursor().context("Failed to show cursor")?;

    result
}

fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut DashboardApp,
) -> Result<()> {
    loop {
        app.refresh();
        terminal.draw(|frame| render_ui(frame, app))?;

        if event::poll(POLL_INTERVAL).context("Event poll failed")? {
            if let Event::Key(key) = event::read().context("Event read failed")? {
                app.handle_event(MonitorEvent::from_key(key));
            }
        }

        if app.should_quit {
            return Ok(());
        }
    }
}
