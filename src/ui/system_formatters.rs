//! Console reports for the one-shot commands.

use std::collections::BTreeSet;
use std::io::{self, Write};
use std::sync::Arc;

use colored::*;

use crate::core::system_monitor::{
    names, Alert, AlertKind, AlertSeverity, DiskUsage, HistoryRecord, HostInfo, RuleState,
    RuleStatus, Sample, StatsSnapshot,
};
use crate::ui::formatters::{format_bytes, format_metric, format_time, uptime_since};

/// Columns shown in the history table, in order
const HISTORY_COLUMNS: [(&str, &str); 6] = [
    ("CPU", names::CPU_USAGE_PCT),
    ("Memory", names::MEM_USAGE_PCT),
    ("Disk", names::DISK_USAGE_PCT),
    ("Load", names::LOAD_AVG_1M),
    ("Temp", names::TEMP_CPU_CELSIUS),
    ("Net ↓", names::NET_RX_BPS),
];

fn print_section_header(title: &str) {
    println!("\n{}", title.bold().green());
    println!("{}", "-".repeat(title.chars().count()));
}

fn value_or_dash(sample: &Sample, metric: &str) -> String {
    sample
        .get(metric)
        .map(|v| format_metric(metric, v))
        .unwrap_or_else(|| "-".to_string())
}

/// Host facts, current usage and per-mount disk space
pub fn print_status(host: &HostInfo, sample: &Sample, disks: &[DiskUsage]) {
    println!("\n{}", "SYSTEM STATUS".bold().bright_cyan());
    println!("{}", "=".repeat(60));

    print_section_header("System Information");
    println!("  Hostname: {}", host.hostname);
    println!("  OS: {}", host.os);
    println!("  Kernel: {}", host.kernel);
    println!("  Uptime: {}", uptime_since(host.boot_time));
    println!(
        "  CPUs: {} │ Memory: {}",
        host.cpu_count,
        format_bytes(host.total_memory_bytes as f64)
    );

    print_section_header("Performance Metrics");
    println!(
        "  {:<14}{:>10}   {}",
        "CPU",
        value_or_dash(sample, names::CPU_USAGE_PCT),
        value_or_dash(sample, names::CPU_FREQ_MHZ)
    );
    println!(
        "  {:<14}{:>10}   {} / {}",
        "Memory",
        value_or_dash(sample, names::MEM_USAGE_PCT),
        value_or_dash(sample, names::MEM_USED_BYTES),
        value_or_dash(sample, names::MEM_TOTAL_BYTES)
    );
    println!(
        "  {:<14}{:>10}   {}",
        "Swap",
        value_or_dash(sample, names::SWAP_PCT),
        value_or_dash(sample, names::SWAP_USED_BYTES)
    );
    println!(
        "  {:<14}{:>10}   5m {} │ 15m {}",
        "Load Average",
        value_or_dash(sample, names::LOAD_AVG_1M),
        value_or_dash(sample, names::LOAD_AVG_5M),
        value_or_dash(sample, names::LOAD_AVG_15M)
    );
    if sample.has(names::TEMP_CPU_CELSIUS) {
        println!(
            "  {:<14}{:>10}   max {}",
            "Temperature",
            value_or_dash(sample, names::TEMP_CPU_CELSIUS),
            value_or_dash(sample, names::TEMP_MAX_CELSIUS)
        );
    }

    if !disks.is_empty() {
        print_section_header("Disks");
        for disk in disks {
            let pct = format!("{:.1}%", disk.usage_pct);
            let pct = if disk.usage_pct >= 90.0 {
                pct.red().bold()
            } else if disk.usage_pct >= 75.0 {
                pct.yellow()
            } else {
                pct.green()
            };
            println!(
                "  {:<20}{:>8}   Free: {} of {}",
                disk.mount_point,
                pct,
                format_bytes(disk.free_bytes as f64),
                format_bytes(disk.total_bytes as f64)
            );
        }
    }

    println!();
}

/// One colored line per alert
pub fn print_alert(alert: &Alert) {
    let label = match (alert.kind, alert.severity) {
        (AlertKind::Recovery, _) => "RECOVERED".green().bold(),
        (_, AlertSeverity::Critical) => "CRITICAL".red().bold(),
        (_, AlertSeverity::Warning) => "WARNING".yellow().bold(),
        (_, AlertSeverity::Info) => "INFO".cyan(),
    };

    println!(
        "{}  {:<10} {}",
        format_time(alert.timestamp).dimmed(),
        label,
        alert.message
    );
}

pub fn print_rule_states(rules: &[RuleStatus]) {
    if rules.is_empty() {
        return;
    }

    print_section_header("Thresholds");
    for rule in rules {
        let state = match rule.state {
            RuleState::Ok => "ok".green(),
            RuleState::Breached => "BREACHED".red().bold(),
            RuleState::Suppressed => "suppressed".yellow(),
        };
        let value = rule
            .last_value
            .map(|v| format_metric(&rule.metric, v))
            .unwrap_or_else(|| "-".to_string());

        println!(
            "  {:<22} {} {:<10} now {:<10} {}",
            rule.metric,
            rule.op,
            format_metric(&rule.metric, rule.limit),
            value,
            state
        );
    }
}

pub fn print_stats(stats: &StatsSnapshot) {
    print_section_header("Monitor");
    println!(
        "  ticks {} │ alerts {} fired, {} suppressed, {} recovered │ recovered errors {}",
        stats.ticks,
        stats.alerts_fired,
        stats.alerts_suppressed,
        stats.recoveries,
        stats.recovered_errors()
    );
    if stats.dropped_samples > 0 || stats.dropped_alerts > 0 {
        println!(
            "  dropped: {} samples, {} alerts",
            stats.dropped_samples, stats.dropped_alerts
        );
    }
}

pub fn print_history_table(records: &[Arc<HistoryRecord>]) {
    if records.is_empty() {
        println!("{}", "No history recorded in that range".dimmed());
        return;
    }

    let mut header = format!("{:<20}", "Time");
    for (label, _) in HISTORY_COLUMNS {
        header.push_str(&format!("{:>12}", label));
    }
    println!("{}", header.bold());

    for record in records {
        let mut line = format!("{:<20}", format_time(record.timestamp()));
        for (_, metric) in HISTORY_COLUMNS {
            line.push_str(&format!("{:>12}", value_or_dash(&record.sample, metric)));
        }
        if record.tag.is_some() {
            println!("{}  {}", line, "alerted".red());
        } else {
            println!("{}", line);
        }
    }

    println!("{}", format!("{} records", records.len()).dimmed());
}

/// CSV with one column per metric seen in any record. Missing values are empty cells.
pub fn write_history_csv<W: Write>(records: &[Arc<HistoryRecord>], out: &mut W) -> io::Result<()> {
    let metrics: BTreeSet<&str> = records
        .iter()
        .flat_map(|r| r.sample.values.keys().map(String::as_str))
        .collect();

    let mut header = vec!["timestamp", "tag"];
    header.extend(metrics.iter().copied());
    writeln!(out, "{}", header.join(","))?;

    for record in records {
        let mut row = vec![
            record.timestamp().to_rfc3339(),
            csv_field(record.tag.as_deref().unwrap_or("")),
        ];
        for metric in &metrics {
            row.push(
                record
                    .sample
                    .get(metric)
                    .map(|v| v.to_string())
                    .unwrap_or_default(),
            );
        }
        writeln!(out, "{}", row.join(","))?;
    }

    Ok(())
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
