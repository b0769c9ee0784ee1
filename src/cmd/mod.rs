//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module     | Commands handled        |
//! |------------|-------------------------|
//! | `target`   | `Target`                |
//! | `session`  | `Session`               |
//! | `exec`     | `Exec`, `Platform`      |
//! | `config`   | `Config`                |

pub mod config;
pub mod exec;
pub mod session;
pub mod target;

pub use config::cmd_config;
pub use exec::{cmd_exec, cmd_platform};
pub use session::cmd_session_run;
pub use target::cmd_target;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use ale_forge::config::AppConfig;
use ale_forge::target::{JsonDirStore, TargetRegistry};
use ale_forge::terminal::TerminalManager;

/// Load configuration from the data dir plus environment overrides.
pub fn load_config(data_dir: &Path) -> Result<AppConfig> {
    AppConfig::load(data_dir.to_path_buf())
        .with_context(|| format!("Failed to load configuration from {}", data_dir.display()))
}

/// Open the target registry backed by the configured targets directory.
pub fn open_registry(config: &AppConfig) -> Result<Arc<TargetRegistry>> {
    let store = JsonDirStore::new(config.targets_dir())?;
    let registry = TargetRegistry::open(Box::new(store))?
        .with_authorization_max_age_days(config.toml.registry.authorization_max_age_days);
    Ok(Arc::new(registry))
}

/// Terminal manager honoring the configured shell and history limit.
pub fn terminal_manager(config: &AppConfig, shell: Option<&str>) -> TerminalManager {
    let manager = TerminalManager::new().with_history_limit(config.toml.terminal.history_limit);
    match shell.or(config.toml.terminal.shell.as_deref()) {
        Some(shell) => manager.with_default_shell(shell),
        None => manager,
    }
}
