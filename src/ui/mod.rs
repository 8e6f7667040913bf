// UI and formatting module

pub mod formatters;
pub mod monitor_tui;
pub mod prompts;
pub mod system_formatters;

// Re-export commonly used items for cleaner imports
pub use formatters::{format_bytes, format_metric, format_rate, format_time, format_uptime};
pub use prompts::{confirm, dimmed, info, success};
