//! Configuration for ale-forge.
//!
//! Settings live in `<data-dir>/forge.toml` and are layered
//! file → environment → CLI. Every section rejects unknown keys.
//!
//! # Configuration File Format
//!
//! ```toml
//! [storage]
//! targets_dir = "targets"
//!
//! [terminal]
//! timeout_secs = 60
//! max_buffer_bytes = 10485760
//! history_limit = 1000
//! shell = "/bin/bash"
//!
//! [session]
//! auto_exploit = false
//! safe_mode = true
//! max_terminals = 4
//! timeout_secs = 60
//!
//! [registry]
//! authorization_max_age_days = 90
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::forge::{DEFAULT_MAX_TERMINALS, SessionConfig};
use crate::target::DEFAULT_AUTHORIZATION_MAX_AGE_DAYS;
use crate::terminal::{DEFAULT_HISTORY_LIMIT, DEFAULT_MAX_BUFFER, ExecOptions};

/// Default data directory, relative to the working directory.
pub const DEFAULT_DATA_DIR: &str = ".ale-forge";
/// Config file name inside the data directory.
pub const CONFIG_FILE_NAME: &str = "forge.toml";

/// Environment variable overriding both command timeouts, in seconds.
pub const ENV_TIMEOUT_SECS: &str = "ALE_FORGE_TIMEOUT_SECS";
/// Environment variable overriding `session.safe_mode`.
pub const ENV_SAFE_MODE: &str = "ALE_FORGE_SAFE_MODE";

/// Where target records are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageSection {
    /// Target record directory, relative to the data dir unless absolute
    #[serde(default = "default_targets_dir")]
    pub targets_dir: PathBuf,
}

fn default_targets_dir() -> PathBuf {
    PathBuf::from("targets")
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            targets_dir: default_targets_dir(),
        }
    }
}

/// Command execution settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TerminalSection {
    /// Per-command timeout for ad-hoc execution
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Per-stream output cap in bytes
    #[serde(default = "default_max_buffer_bytes")]
    pub max_buffer_bytes: usize,
    /// History records kept per terminal session
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Shell overriding the platform default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_buffer_bytes() -> usize {
    DEFAULT_MAX_BUFFER
}

fn default_history_limit() -> usize {
    DEFAULT_HISTORY_LIMIT
}

impl Default for TerminalSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_buffer_bytes: default_max_buffer_bytes(),
            history_limit: default_history_limit(),
            shell: None,
        }
    }
}

/// Defaults for new forge sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionSection {
    #[serde(default)]
    pub auto_exploit: bool,
    /// Suppresses exploit phases regardless of `auto_exploit`
    #[serde(default = "default_safe_mode")]
    pub safe_mode: bool,
    #[serde(default = "default_max_terminals")]
    pub max_terminals: usize,
    /// Per-command timeout inside sessions
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_safe_mode() -> bool {
    true
}

fn default_max_terminals() -> usize {
    DEFAULT_MAX_TERMINALS
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            auto_exploit: false,
            safe_mode: default_safe_mode(),
            max_terminals: default_max_terminals(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Target registry settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistrySection {
    /// Authorizations older than this draw a re-verification warning
    #[serde(default = "default_authorization_max_age_days")]
    pub authorization_max_age_days: i64,
}

fn default_authorization_max_age_days() -> i64 {
    DEFAULT_AUTHORIZATION_MAX_AGE_DAYS
}

impl Default for RegistrySection {
    fn default() -> Self {
        Self {
            authorization_max_age_days: default_authorization_max_age_days(),
        }
    }
}

/// Contents of `forge.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForgeToml {
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub terminal: TerminalSection,
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub registry: RegistrySection,
}

impl ForgeToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse forge.toml")
    }

    /// Load `forge.toml` from `data_dir`, or defaults when it doesn't exist.
    pub fn load_or_default(data_dir: &Path) -> Result<Self> {
        let config_path = data_dir.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize forge.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            let secs: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("{} must be a whole number of seconds, got '{}'", ENV_TIMEOUT_SECS, raw))?;
            self.terminal.timeout_secs = secs;
            self.session.timeout_secs = secs;
        }
        if let Some(raw) = lookup(ENV_SAFE_MODE) {
            let value = raw.trim().to_lowercase();
            self.session.safe_mode = !matches!(value.as_str(), "false" | "0" | "no" | "off");
        }
        Ok(())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.terminal.timeout_secs == 0 {
            warnings.push("terminal.timeout_secs is 0: every command would time out".to_string());
        }
        if self.session.timeout_secs == 0 {
            warnings.push("session.timeout_secs is 0: every command would time out".to_string());
        }
        if self.terminal.max_buffer_bytes == 0 {
            warnings.push("terminal.max_buffer_bytes is 0: any output would overflow".to_string());
        }
        if self.terminal.history_limit == 0 {
            warnings.push("terminal.history_limit is 0: it will be raised to 1".to_string());
        }
        if self.session.max_terminals == 0 {
            warnings.push("session.max_terminals is 0: no phase could run".to_string());
        }
        if self.registry.authorization_max_age_days <= 0 {
            warnings.push(format!(
                "registry.authorization_max_age_days is {}: every authorization would be stale",
                self.registry.authorization_max_age_days
            ));
        }
        if let Some(shell) = &self.terminal.shell
            && shell.trim().is_empty()
        {
            warnings.push("terminal.shell is set but empty".to_string());
        }
        if self.session.auto_exploit && self.session.safe_mode {
            warnings.push(
                "session.auto_exploit has no effect while session.safe_mode is on".to_string(),
            );
        }

        warnings
    }
}

/// Resolved configuration for one invocation.
///
/// It merges settings from:
/// 1. forge.toml file
/// 2. Environment variables
/// 3. CLI arguments (applied by the caller on the returned values)
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Directory holding `forge.toml` and target records
    pub data_dir: PathBuf,
    /// Parsed and env-overridden forge.toml
    pub toml: ForgeToml,
}

impl AppConfig {
    /// Load from `data_dir`, then apply process environment overrides.
    pub fn load(data_dir: PathBuf) -> Result<Self> {
        let mut toml = ForgeToml::load_or_default(&data_dir)?;
        toml.apply_env(|key| std::env::var(key).ok())?;
        Ok(Self { data_dir, toml })
    }

    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join(CONFIG_FILE_NAME)
    }

    /// Resolved target record directory.
    pub fn targets_dir(&self) -> PathBuf {
        let dir = &self.toml.storage.targets_dir;
        if dir.is_absolute() {
            dir.clone()
        } else {
            self.data_dir.join(dir)
        }
    }

    /// Options for ad-hoc command execution.
    pub fn exec_options(&self) -> ExecOptions {
        ExecOptions::default()
            .with_timeout(Duration::from_secs(self.toml.terminal.timeout_secs))
            .with_max_buffer(self.toml.terminal.max_buffer_bytes)
    }

    /// Session options for `target_id` before CLI overrides.
    pub fn session_config(&self, target_id: &str) -> SessionConfig {
        let mut config = SessionConfig::new(target_id)
            .with_timeout(Duration::from_secs(self.toml.session.timeout_secs));
        config.auto_exploit = self.toml.session.auto_exploit;
        config.safe_mode = self.toml.session.safe_mode;
        config.max_terminals = self.toml.session.max_terminals;
        config
    }

    pub fn validate(&self) -> Vec<String> {
        self.toml.validate()
    }
}
