//! Configuration view and validation commands: `ale-forge config`.

use anyhow::{Context, Result};
use std::path::Path;

use ale_forge::config::{ENV_SAFE_MODE, ENV_TIMEOUT_SECS, ForgeToml};
use ale_forge::ui::icons::{CHECK, WARN};

use super::super::ConfigCommands;
use super::load_config;

pub fn cmd_config(data_dir: &Path, command: Option<ConfigCommands>) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => {
            let config = load_config(data_dir)?;
            let config_path = config.config_path();

            println!();
            println!("ale-forge Configuration");
            println!("=======================");
            println!();
            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No forge.toml found at {}; using defaults.", config_path.display());
            }
            println!("Targets dir: {}", config.targets_dir().display());
            for key in [ENV_TIMEOUT_SECS, ENV_SAFE_MODE] {
                if let Ok(value) = std::env::var(key) {
                    println!("Override:    {}={}", key, value);
                }
            }
            println!();
            println!("Effective values (with env overrides):");
            println!();
            let rendered =
                toml::to_string_pretty(&config.toml).context("Failed to render configuration")?;
            println!("{}", rendered);
        }
        Some(ConfigCommands::Validate) => {
            let config = load_config(data_dir)?;
            let warnings = config.validate();
            if warnings.is_empty() {
                println!("{}Configuration is valid", CHECK);
            } else {
                for warning in &warnings {
                    println!("{}{}", WARN, warning);
                }
                println!();
                println!("{} warning(s)", warnings.len());
            }
        }
        Some(ConfigCommands::Init { force }) => {
            std::fs::create_dir_all(data_dir)
                .with_context(|| format!("Failed to create {}", data_dir.display()))?;
            let path = data_dir.join(ale_forge::config::CONFIG_FILE_NAME);
            if path.exists() && !force {
                anyhow::bail!(
                    "{} already exists. Use --force to overwrite it.",
                    path.display()
                );
            }
            ForgeToml::default().save(&path)?;
            println!("{}Wrote {}", CHECK, path.display());
        }
    }

    Ok(())
}
