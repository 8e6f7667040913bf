//! Terminal dashboard.
//!
//! Reads snapshots from a [`crate::core::system_monitor::MonitorHandle`]
//! and renders them with ratatui. Never samples on its own.

mod app;
mod event_handler;
mod render;
mod widgets;

pub use app::{run_dashboard, DashboardApp, Trend};
pub use event_handler::MonitorEvent;
