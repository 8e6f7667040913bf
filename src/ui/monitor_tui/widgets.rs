use ratatui::{prelude::*, widgets::Gauge};

use crate::core::system_monitor::{AlertSeverity, RuleState};

/// Create a gauge with color based on value thresholds
pub fn colored_gauge<'a>(value: f64, label: String) -> Gauge<'a> {
    let value = value.clamp(0.0, 100.0);
    let color = match value {
        v if v < 50.0 => Color::Cyan,
        v if v < 75.0 => Color::LightYellow,
        v if v < 90.0 => Color::LightRed,
        _ => Color::Red,
    };

    Gauge::default()
        .gauge_style(Style::default().fg(color).bg(Color::Black))
        .ratio(value / 100.0)
        .label(label)
}

/// Get color for temperature value
pub fn temp_color(temp: f64) -> Color {
    match temp {
        t if t < 50.0 => Color::Cyan,
        t if t < 70.0 => Color::LightYellow,
        t if t < 85.0 => Color::LightRed,
        _ => Color::Red,
    }
}

pub fn severity_color(severity: AlertSeverity) -> Color {
    match severity {
        AlertSeverity::Critical => Color::Red,
        AlertSeverity::Warning => Color::Yellow,
        AlertSeverity::Info => Color::Cyan,
    }
}

pub fn state_style(state: RuleState) -> Style {
    match state {
        RuleState::Ok => Style::default().fg(Color::Green),
        RuleState::Breached => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        RuleState::Suppressed => Style::default().fg(Color::Yellow),
    }
}
