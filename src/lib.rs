// healthdash library - public API

// Re-export error types
pub mod error;
pub use error::{HealthError, Result};

// Module declarations
pub mod commands;
pub mod core;
pub mod ui;

// Re-export commonly used types
pub use core::config::Config;

/// Initialize logging. `RUST_LOG` overrides `default_filter`.
///
/// The dashboard passes `"off"` so log lines never land on top of the TUI.
pub fn init_logging(default_filter: &str) {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_secs()
        .try_init();
}
