use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use grouping_core::config::{Config, WarnLevel};
use std::path::Path;

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show the current configuration
    Show,

    /// Set one key, e.g. `group_size 3` or `mode firstcome`
    Set { key: String, value: String },

    /// Validate the config for common mistakes
    Validate,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(root: &Path, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Show => show(root, json),
        ConfigSubcommand::Set { key, value } => set(root, &key, &value, json),
        ConfigSubcommand::Validate => validate(root, json),
    }
}

fn show(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    if json {
        return print_json(&config);
    }
    let policy = &config.policy;
    println!("event.name:             {}", config.event.name);
    println!("policy.mode:            {}", policy.mode);
    println!("policy.group_size:      {}", policy.group_size);
    println!("policy.group_count:     {}", policy.group_count);
    println!("policy.refresh_minutes: {}", policy.refresh_minutes);
    println!("store.poll_interval_ms: {}", config.store.poll_interval_ms);
    Ok(())
}

fn set(root: &Path, key: &str, value: &str, json: bool) -> anyhow::Result<()> {
    let mut config = Config::load(root).context("failed to load config")?;
    config.set(key, value)?;
    config.save(root).context("failed to write config.yaml")?;

    if json {
        print_json(&config)?;
    } else {
        println!("Set {key} = {value}");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

fn validate(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
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

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors");
    }
    Ok(())
}
