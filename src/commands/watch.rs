//! Headless sampling loop.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::ArgMatches;
use colored::Colorize;
use tokio::sync::watch;

use crate::core::timespec::parse_duration;
use crate::core::Config;
use crate::ui::system_formatters::{print_alert, print_stats};

use super::start_monitor;

/// Execute the watch command
pub fn execute(matches: &ArgMatches) -> Result<()> {
    let mut config = Config::load()?;
    if let Some(refresh) = matches.get_one::<String>("refresh") {
        config.refresh_interval = parse_duration(refresh)?.as_secs_f64();
    }
    config.validate()?;
    let json_output = matches.get_flag("json");

    let (stop_tx, mut stop_rx) = watch::channel(false);
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(true);
    })
    .context("Failed to install Ctrl+C handler")?;

    let (runtime, host) = start_monitor(&config)?;
    let handle = runtime.handle();
    let mut subscription = handle.subscribe();
    let started = Utc::now();
    let mut last_seq = 0;

    if !json_output {
        println!(
            "{}",
            format!(
                "Watching {} every {:.1}s, press Ctrl+C to stop",
                host.hostname, config.refresh_interval
            )
            .cyan()
        );
    }

    let printed: Result<()> = runtime.block_on(async {
        loop {
            tokio::select! {
                next = subscription.recv() => {
                    let Some(sample) = next else {
                        return Ok::<(), anyhow::Error>(());
                    };
                    if json_output {
                        println!("{}", serde_json::to_string(sample.as_ref())?);
                        continue;
                    }
                    for alert in handle.alerts(started) {
                        if alert.seq > last_seq {
                            last_seq = alert.seq;
                            print_alert(&alert);
                        }
                    }
                }
                _ = stop_rx.changed() => return Ok(()),
            }
        }
    });

    runtime.shutdown();

    if !json_output {
        println!();
        print_stats(&handle.stats());
    }
    printed
}
