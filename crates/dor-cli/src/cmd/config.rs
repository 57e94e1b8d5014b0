use crate::output::{print_json, print_yaml};
use clap::Subcommand;
use dor_core::config::{Config, WarnLevel};
use std::path::Path;

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Print the effective configuration
    Show,

    /// Validate the config for common mistakes
    Validate,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(
    config: &Config,
    source: Option<&Path>,
    subcmd: ConfigSubcommand,
    json: bool,
) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Show => show(config, source, json),
        ConfigSubcommand::Validate => validate(config, json),
    }
}

// ---------------------------------------------------------------------------
// show
// ---------------------------------------------------------------------------

fn show(config: &Config, source: Option<&Path>, json: bool) -> anyhow::Result<()> {
    if json {
        let value = serde_json::json!({
            "source": source.map(|p| p.display().to_string()),
            "config": config,
        });
        return print_json(&value);
    }
    match source {
        Some(path) => println!("# source: {}", path.display()),
        None => println!("# source: built-in defaults"),
    }
    print_yaml(config)
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

fn validate(config: &Config, json: bool) -> anyhow::Result<()> {
    let warnings = config.validate();

    if json {
        let value = serde_json::json!({
            "warnings": warnings,
        });
        print_json(&value)?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    let has_errors = warnings.iter().any(|w| w.level == WarnLevel::Error);
    if has_errors {
        anyhow::bail!("config validation found errors");
    }

    Ok(())
}
