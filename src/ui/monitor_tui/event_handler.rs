use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

/// Events that can occur in the dashboard TUI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorEvent {
    /// Quit the application
    Quit,
    /// Toggle help overlay
    ToggleHelp,
    /// Show or hide the process table
    ToggleDetails,
    /// Toggle process sort mode
    ToggleProcessSort,
    /// Navigate process list up
    ProcessUp,
    /// Navigate process list down
    ProcessDown,
    /// No action
    None,
}

impl MonitorEvent {
    pub fn from_key(key: KeyEvent) -> Self {
        if key.kind != KeyEventKind::Press {
            return MonitorEvent::None;
        }

        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => MonitorEvent::Quit,
            KeyCode::Char('q') | KeyCode::Esc => MonitorEvent::Quit,
            KeyCode::Char('?') | KeyCode::Char('h') => MonitorEvent::ToggleHelp,
            KeyCode::Char('d') => MonitorEvent::ToggleDetails,
            KeyCode::Char('s') => MonitorEvent::ToggleProcessSort,
            KeyCode::Up | KeyCode::Char('k') => MonitorEvent::ProcessUp,
            KeyCode::Down | KeyCode::Char('j') => MonitorEvent::ProcessDown,
            _ => MonitorEvent::None,
        }
    }
}
