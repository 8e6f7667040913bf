use crate::core::Config;
use crate::ui::{confirm, dimmed, info, success};
use anyhow::Result;
use clap::ArgMatches;

pub fn execute(matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("path", _)) => {
            println!("{}", Config::config_path()?.display());
            Ok(())
        }
        Some(("init", sub_matches)) => init(sub_matches.get_flag("force")),
        _ => show(),
    }
}

/// Print the effective configuration, creating the default file if needed
fn show() -> Result<()> {
    let config = Config::load()?;
    dimmed(&format!("# {}", Config::config_path()?.display()));
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

/// Write the default configuration, asking before overwriting
fn init(force: bool) -> Result<()> {
    let path = Config::config_path()?;

    if path.exists() && !force {
        let question = format!("{} already exists. Overwrite with defaults? [y/N]", path.display());
        if !confirm(&question)? {
            info("Keeping existing configuration");
            return Ok(());
        }
    }

    Config::default().save_to(&path)?;
    success(&format!("Wrote default configuration to {}", path.display()));
    Ok(())
}
