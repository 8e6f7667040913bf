use anyhow::Result;
use clap::{value_parser, Arg, ArgAction, Command};

use healthdash::commands;
use healthdash::init_logging;

fn build_cli() -> Command {
    Command::new("healthdash")
        .version(env!("CARGO_PKG_VERSION"))
        .about("System Health Dashboard: live metrics, threshold alerts and history")
        .subcommand(
            Command::new("dashboard")
                .about("Launch the real-time dashboard (default)")
                .arg(
                    Arg::new("detailed")
                        .short('d')
                        .long("detailed")
                        .help("Show top processes")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("refresh")
                        .short('r')
                        .long("refresh")
                        .value_name("INTERVAL")
                        .help("Refresh interval, e.g. 2s or 500ms"),
                ),
        )
        .subcommand(
            Command::new("status")
                .about("Show current system status once")
                .arg(
                    Arg::new("json")
                        .long("json")
                        .help("Print as JSON")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("watch")
                .about("Sample in the foreground and print alerts as they fire")
                .arg(
                    Arg::new("json")
                        .long("json")
                        .help("Print every sample as a JSON line instead")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("refresh")
                        .short('r')
                        .long("refresh")
                        .value_name("INTERVAL")
                        .help("Refresh interval, e.g. 2s or 500ms"),
                ),
        )
        .subcommand(
            Command::new("history")
                .about("Query recorded history")
                .arg(
                    Arg::new("since")
                        .long("since")
                        .value_name("TIME")
                        .help("Start time: RFC 3339, YYYY-MM-DD, or an age such as 1h"),
                )
                .arg(
                    Arg::new("until")
                        .long("until")
                        .value_name("TIME")
                        .help("End time, same forms as --since"),
                )
                .arg(
                    Arg::new("last")
                        .short('n')
                        .long("last")
                        .value_name("N")
                        .help("Only the N most recent records")
                        .value_parser(value_parser!(usize)),
                )
                .arg(
                    Arg::new("format")
                        .short('f')
                        .long("format")
                        .value_name("FORMAT")
                        .value_parser(["table", "json", "csv"])
                        .default_value("table")
                        .help("Output format"),
                ),
        )
        .subcommand(
            Command::new("alerts")
                .about("Show alerts recorded by the file channel")
                .arg(
                    Arg::new("since")
                        .long("since")
                        .value_name("TIME")
                        .help("Only alerts at or after TIME"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .help("Print as JSON lines")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("config")
                .about("Show or initialise the configuration file")
                .subcommand(Command::new("show").about("Print the effective configuration"))
                .subcommand(Command::new("path").about("Print the configuration file path"))
                .subcommand(
                    Command::new("init")
                        .about("Write the default configuration")
                        .arg(
                            Arg::new("force")
                                .long("force")
                                .help("Overwrite without asking")
                                .action(ArgAction::SetTrue),
                        ),
                ),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .help("Shell type (bash, zsh, fish, powershell, elvish)")
                        .required(true)
                        .index(1),
                ),
        )
}

fn main() -> Result<()> {
    let matches = build_cli().get_matches();

    // Log lines would corrupt the TUI, so the dashboard stays silent unless RUST_LOG says otherwise
    let default_filter = match matches.subcommand_name() {
        None | Some("dashboard") => "off",
        Some("watch") => "info",
        _ => "warn",
    };
    init_logging(default_filter);

    match matches.subcommand() {
        Some(("dashboard", sub_matches)) => commands::dashboard::execute(Some(sub_matches)),
        Some(("status", sub_matches)) => commands::status::execute(sub_matches),
        Some(("watch", sub_matches)) => commands::watch::execute(sub_matches),
        Some(("history", sub_matches)) => commands::history::execute(sub_matches),
        Some(("alerts", sub_matches)) => commands::alerts::execute(sub_matches),
        Some(("config", sub_matches)) => commands::config::execute(sub_matches),
        Some(("completions", sub_matches)) => {
            let mut cli = build_cli();
            commands::completions::execute(sub_matches, &mut cli)
        }
        _ => commands::dashboard::execute(None),
    }
}
