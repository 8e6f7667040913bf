use chrono::{DateTime, Local, Utc};

const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Format a byte count in 1024-based units with one decimal (`1.0 KB`)
pub fn format_bytes(bytes: f64) -> String {
    let mut value = bytes;
    for unit in UNITS {
        if value < 1024.0 {
            return format!("{:.1} {}", value, unit);
        }
        value /= 1024.0;
    }
    format!("{:.1} PB", value)
}

/// Format a byte rate (`12.5 KB/s`)
pub fn format_rate(bytes_per_sec: f64) -> String {
    format!("{}/s", format_bytes(bytes_per_sec))
}

/// Format uptime as `Xd Yh Zm`, `Yh Zm` or `Zm`
pub fn format_uptime(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3600;
    let minutes = (secs % 3600) / 60;

    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}

/// Uptime since `boot_time`, clamped at zero
pub fn uptime_since(boot_time: DateTime<Utc>) -> String {
    let secs = (Utc::now() - boot_time).num_seconds().max(0) as u64;
    format_uptime(secs)
}

/// Format timestamp in local time (YYYY-MM-DD HH:MM:SS)
pub fn format_time(ts: DateTime<Utc>) -> String {
    let local: DateTime<Local> = ts.into();
    local.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Render a metric value in the unit its name implies
pub fn format_metric(metric: &str, value: f64) -> String {
    if metric.ends_with("_pct") {
        format!("{:.1}%", value)
    } else if metric.ends_with("_bytes_per_s") {
        format_rate(value)
    } else if metric.ends_with("_bytes") {
        format_bytes(value)
    } else if metric.ends_with("_celsius") {
        format!("{:.0}°C", value)
    } else if metric.ends_with("_mhz") {
        format!("{:.0} MHz", value)
    } else if metric.starts_with("load.") {
        format!("{:.2}", value)
    } else if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{:.2}", value)
    }
}
