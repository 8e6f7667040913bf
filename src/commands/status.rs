//! One-shot system status report.

use anyhow::Result;
use clap::ArgMatches;
use serde_json::json;

use crate::core::system_monitor::{MetricGroup, Sampler, SysinfoSource, ThresholdEvaluator};
use crate::core::Config;
use crate::ui::system_formatters::{print_rule_states, print_status};

/// Execute the status command
pub fn execute(matches: &ArgMatches) -> Result<()> {
    let config = Config::load()?;
    let json_output = matches.get_flag("json");

    let mut source = SysinfoSource::new();
    let host = source.host_info();
    let disks = source.disk_usage();

    let groups: Vec<MetricGroup> = config
        .metrics
        .iter()
        .copied()
        .filter(|g| *g != MetricGroup::Processes)
        .collect();
    let mut sampler = Sampler::new(Box::new(source), groups, 0);

    // CPU usage is a delta between two refreshes
    sampler.tick();
    std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
    let sample = sampler.tick();

    let mut evaluator = ThresholdEvaluator::new(config.threshold_rules()?);
    evaluator.evaluate(&sample);
    let rules = evaluator.statuses();

    if json_output {
        let report = json!({
            "host": host,
            "sample": sample,
            "disks": disks,
            "rules": rules,
            "unavailable": sampler
                .last_errors()
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_status(&host, &sample, &disks);
    print_rule_states(&rules);
    for err in sampler.last_errors() {
        log::info!("Unavailable: {}", err);
    }
    println!();

    Ok(())
}
