// Core business logic module

pub mod config;
pub mod system_monitor;
pub mod timespec;

// Re-export commonly used items
pub use config::Config;
pub use system_monitor::{MonitorHandle, MonitorRuntime, Sample};
