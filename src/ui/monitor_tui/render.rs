use humansize::{format_size as human_format_size, DECIMAL};
use ratatui::{
    prelude::*,
    widgets::{BarChart, Block, Borders, Cell, Clear, Paragraph, Row, Table},
};

use super::app::DashboardApp;
use super::widgets::{colored_gauge, severity_color, state_style, temp_color};
use crate::core::system_monitor::{names, RuleState};
use crate::ui::formatters::{format_bytes, format_metric, format_rate, format_time, uptime_since};

fn format_size(bytes: u64) -> String {
    human_format_size(bytes, DECIMAL)
}

/// Main render function
pub fn render_ui(frame: &mut Frame, app: &DashboardApp) {
    let area = frame.area();

    let alert_height = if app.recent_alerts.is_empty() {
        0
    } else {
        (app.recent_alerts.len().min(3) + 2) as u16
    };
    let rules_height = (app.rules.len().min(6) + 3) as u16;

    let mut constraints = vec![Constraint::Length(3)]; // Header
    if alert_height > 0 {
        constraints.push(Constraint::Length(alert_height));
    }
    constraints.push(Constraint::Length(8)); // Gauges + CPU history
    constraints.push(Constraint::Length(1)); // I/O + temperatures
    constraints.push(Constraint::Length(rules_height));
    if app.detailed {
        constraints.push(Constraint::Min(5)); // Processes
    } else {
        constraints.push(Constraint::Min(0));
    }
    constraints.push(Constraint::Length(1)); // Footer

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(area);

    let mut next = 0;
    let mut take = || {
        let rect = chunks[next];
        next += 1;
        rect
    };

    render_header(frame, take(), app);
    if alert_height > 0 {
        render_alerts_banner(frame, take(), app);
    }
    render_usage_section(frame, take(), app);
    render_io_line(frame, take(), app);
    render_rules_section(frame, take(), app);
    let process_area = take();
    if app.detailed {
        render_processes_section(frame, process_area, app);
    }
    render_footer(frame, take(), app);

    if app.show_help {
        render_help_overlay(frame, area);
    }
}

/// Host, uptime, load and refresh rate
fn render_header(frame: &mut Frame, area: Rect, app: &DashboardApp) {
    let load = app
        .value(names::LOAD_AVG_1M)
        .map(|l| format!("{:.2}", l))
        .unwrap_or_else(|| "-".to_string());

    let errors = app.stats.recovered_errors();
    let title = format!(
        " {} │ {} │ Uptime: {} │ Load: {} │ Refresh: {:.1}s │ Errors: {} ",
        app.host.hostname,
        app.host.os,
        uptime_since(app.host.boot_time),
        load,
        app.interval.as_secs_f64(),
        errors
    );

    let border = if errors > 0 {
        Color::Yellow
    } else {
        Color::Cyan
    };

    let status = match &app.current {
        Some(sample) => format!(
            " Last sample {} │ {} cores │ {} RAM",
            format_time(sample.timestamp),
            app.host.cpu_count,
            format_bytes(app.host.total_memory_bytes as f64)
        ),
        None => " Waiting for first sample...".to_string(),
    };

    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border));
    let para = Paragraph::new(status)
        .style(Style::default().fg(Color::DarkGray))
        .block(block);

    frame.render_widget(para, area);
}

/// Most recent alerts, newest first
fn render_alerts_banner(frame: &mut Frame, area: Rect, app: &DashboardApp) {
    let block = Block::default()
        .title(" ⚠ ALERTS ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let shown: Vec<_> = app.recent_alerts.iter().take(3).collect();
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints(vec![Constraint::Length(1); shown.len()])
        .split(inner);

    for (i, alert) in shown.iter().enumerate() {
        let text = Paragraph::new(format!(
            "{} [{}] {}",
            format_time(alert.timestamp),
            alert.severity,
            alert.message
        ))
        .style(
            Style::default()
                .fg(severity_color(alert.severity))
                .add_modifier(Modifier::BOLD),
        );

        frame.render_widget(text, layout[i]);
    }
}

/// Usage gauges on the left, CPU history on the right
fn render_usage_section(frame: &mut Frame, area: Rect, app: &DashboardApp) {
    let block = Block::default().title(" Usage ").borders(Borders::ALL);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let split = if inner.width >= 60 {
        Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(inner)
    } else {
        Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(100), Constraint::Length(0)])
            .split(inner)
    };

    let gauges = [
        ("CPU", names::CPU_USAGE_PCT, cpu_detail(app)),
        ("Memory", names::MEM_USAGE_PCT, memory_detail(app)),
        ("Swap", names::SWAP_PCT, String::new()),
        ("Disk", names::DISK_USAGE_PCT, disk_detail(app)),
    ];

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints(vec![Constraint::Length(1); gauges.len()])
        .split(split[0]);

    for (i, (label, metric, detail)) in gauges.into_iter().enumerate() {
        match app.value(metric) {
            Some(pct) => {
                let text = format!("{:<7}{:>5.1}%  {}", label, pct, detail);
                frame.render_widget(colored_gauge(pct, text), rows[i]);
            }
            None => {
                let text = Paragraph::new(format!("{:<7}  n/a", label))
                    .style(Style::default().fg(Color::DarkGray));
                frame.render_widget(text, rows[i]);
            }
        }
    }

    render_cpu_history(frame, split[1], app);
}

fn cpu_detail(app: &DashboardApp) -> String {
    app.value(names::CPU_FREQ_MHZ)
        .map(|mhz| format!("{:.0} MHz", mhz))
        .unwrap_or_default()
}

fn memory_detail(app: &DashboardApp) -> String {
    match (app.value(names::MEM_USED_BYTES), app.value(names::MEM_TOTAL_BYTES)) {
        (Some(used), Some(total)) => format!("{} / {}", format_bytes(used), format_bytes(total)),
        _ => String::new(),
    }
}

fn disk_detail(app: &DashboardApp) -> String {
    match (app.value(names::DISK_USED_BYTES), app.value(names::DISK_TOTAL_BYTES)) {
        (Some(used), Some(total)) => format!("{} / {}", format_bytes(used), format_bytes(total)),
        _ => String::new(),
    }
}

fn render_cpu_history(frame: &mut Frame, area: Rect, app: &DashboardApp) {
    let history_data = app.cpu_trend.as_u64();
    if history_data.is_empty() || area.width <= 4 {
        return;
    }

    let bar_width: u16 = 1;
    let bar_gap: u16 = 1;
    let inner_width = area.width.saturating_sub(2) as usize;
    let max_bars = (inner_width / (bar_width + bar_gap) as usize).min(history_data.len());

    let start_idx = history_data.len().saturating_sub(max_bars);
    let data_to_show: Vec<(&str, u64)> = history_data[start_idx..]
        .iter()
        .map(|&val| ("", val))
        .collect();

    let chart = BarChart::default()
        .block(Block::default().title("CPU History").borders(Borders::ALL))
        .direction(Direction::Vertical)
        .bar_width(bar_width)
        .bar_gap(bar_gap)
        .bar_style(Style::default().fg(Color::Cyan))
        .value_style(Style::default().fg(Color::Black).bg(Color::Cyan))
        .data(&data_to_show)
        .max(1000);

    frame.render_widget(chart, area);
}

/// Network and disk throughput plus temperatures on one line
fn render_io_line(frame: &mut Frame, area: Rect, app: &DashboardApp) {
    let rate = |metric| {
        app.value(metric)
            .map(format_rate)
            .unwrap_or_else(|| "-".to_string())
    };

    let mut spans = vec![Span::raw(format!(
        " Net ↓ {} ↑ {} │ Disk R {} W {} │ ",
        rate(names::NET_RX_BPS),
        rate(names::NET_TX_BPS),
        rate(names::DISK_READ_BPS),
        rate(names::DISK_WRITE_BPS),
    ))];

    match app.value(names::TEMP_CPU_CELSIUS) {
        Some(temp) => spans.push(Span::styled(
            format!("CPU {:.0}°C", temp),
            Style::default().fg(temp_color(temp)),
        )),
        None => spans.push(Span::styled(
            "No temperature sensors",
            Style::default().fg(Color::DarkGray),
        )),
    }

    if !app.adapter_errors.is_empty() {
        let failed: Vec<&str> = app.adapter_errors.iter().map(|e| e.group()).collect();
        spans.push(Span::styled(
            format!(" │ unavailable: {}", failed.join(", ")),
            Style::default().fg(Color::DarkGray),
        ));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

/// One row per threshold rule with its current state
fn render_rules_section(frame: &mut Frame, area: Rect, app: &DashboardApp) {
    let breached = app
        .rules
        .iter()
        .filter(|r| r.state != RuleState::Ok)
        .count();

    let block = Block::default()
        .title(format!(" Thresholds ({} breached) ", breached))
        .borders(Borders::ALL)
        .border_style(if breached > 0 {
            Style::default().fg(Color::Red)
        } else {
            Style::default()
        });
    let inner = block.inner(area);
    frame.render_widget(block, area);

    if inner.height < 2 {
        return;
    }

    let bold = Style::default().add_modifier(Modifier::BOLD);
    let header = Row::new(vec![
        Cell::from("Metric").style(bold),
        Cell::from("Rule").style(bold),
        Cell::from("Value").style(bold),
        Cell::from("State").style(bold),
        Cell::from("Fired").style(bold),
    ])
    .height(1);

    let rows: Vec<Row> = app
        .rules
        .iter()
        .map(|rule| {
            let value = rule
                .last_value
                .map(|v| format_metric(&rule.metric, v))
                .unwrap_or_else(|| "-".to_string());
            let state = format!("{:?}", rule.state).to_uppercase();

            Row::new(vec![
                Cell::from(rule.metric.clone()),
                Cell::from(format!("{} {}", rule.op, format_metric(&rule.metric, rule.limit))),
                Cell::from(value),
                Cell::from(state).style(state_style(rule.state)),
                Cell::from(format!("{} ({} suppressed)", rule.fired, rule.suppressed)),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(22),
            Constraint::Length(14),
            Constraint::Length(12),
            Constraint::Length(12),
            Constraint::Min(10),
        ],
    )
    .header(header);

    frame.render_widget(table, inner);
}

fn render_processes_section(frame: &mut Frame, area: Rect, app: &DashboardApp) {
    let sort = if app.process_sort_by_memory {
        "memory"
    } else {
        "CPU"
    };

    let block = Block::default()
        .title(format!(" Top Processes (by {}) [s:sort ↑↓:nav] ", sort))
        .borders(Borders::ALL);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    if inner.height < 2 {
        return;
    }

    let bold = Style::default().add_modifier(Modifier::BOLD);
    let header = Row::new(vec![
        Cell::from("PID").style(bold),
        Cell::from("Name").style(bold),
        Cell::from("CPU %").style(bold),
        Cell::from("Mem %").style(bold),
        Cell::from("Memory").style(bold),
    ])
    .height(1);

    let rows: Vec<Row> = app
        .processes
        .iter()
        .enumerate()
        .map(|(i, proc)| {
            let style = if i == app.selected_process_index {
                Style::default()
                    .bg(Color::DarkGray)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };

            Row::new(vec![
                Cell::from(proc.pid.to_string()),
                Cell::from(proc.name.chars().take(24).collect::<String>()),
                Cell::from(format!("{:.1}", proc.cpu_usage_percent)),
                Cell::from(format!("{:.1}", proc.memory_percent)),
                Cell::from(format_size(proc.memory_bytes)),
            ])
            .style(style)
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(8),
            Constraint::Percentage(40),
            Constraint::Length(8),
            Constraint::Length(8),
            Constraint::Length(12),
        ],
    )
    .header(header);

    frame.render_widget(table, inner);
}

fn render_footer(frame: &mut Frame, area: Rect, app: &DashboardApp) {
    let details = if app.detailed {
        "hide processes"
    } else {
        "show processes"
    };
    let help = format!(" q: Quit │ ?: Help │ d: {} │ s: Sort processes ", details);
    let para = Paragraph::new(help).style(Style::default().fg(Color::DarkGray));
    frame.render_widget(para, area);
}

fn render_help_overlay(frame: &mut Frame, area: Rect) {
    let help_text = r#"
    System Health Dashboard - Help

    Keyboard Shortcuts:
    ─────────────────────────────────────
    q / Esc     Quit the dashboard
    ? / h       Toggle this help screen
    d           Show or hide top processes
    s           Toggle process sort (CPU/Memory)
    ↑↓ / k j    Move through the process list

    Press any key to close this help
    "#;

    let block = Block::default()
        .title(" Help ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .style(Style::default().bg(Color::DarkGray));

    let paragraph = Paragraph::new(help_text)
        .block(block)
        .alignment(Alignment::Left);

    let popup_area = centered_rect(60, 50, area);
    frame.render_widget(Clear, popup_area);
    frame.render_widget(paragraph, popup_area);
}

/// Helper function to create a centered rect
fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
