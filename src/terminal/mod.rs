//! Cross-platform command execution.
//!
//! - `Platform` and the `CommandDialect` strategy (one implementation per OS family)
//! - `ShellExecutor`, the async child-process runner with timeout and bounded buffers
//! - `TerminalManager`, which owns terminal sessions and their bounded history
//!
//! Execution is always local to the orchestrating process. A session's
//! `target_host` is provenance metadata for reports, never a connection.

pub mod dialect;
pub mod exec;
pub mod manager;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub use dialect::{CommandDialect, UnixDialect, WindowsDialect, dialect_for};
pub use exec::{CommandOutput, ShellExecutor, filter_stderr};
pub use manager::TerminalManager;

/// Default per-command timeout.
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;
/// Default per-stream output cap.
pub const DEFAULT_MAX_BUFFER: usize = 10 * 1024 * 1024;
/// Records kept per session before the oldest is evicted.
pub const DEFAULT_HISTORY_LIMIT: usize = 1000;

/// Host operating system family, detected once per process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Windows,
    Linux,
    Macos,
    Unknown,
}

impl Platform {
    /// Platform of the running process.
    pub fn detect() -> Self {
        match std::env::consts::OS {
            "windows" => Self::Windows,
            "linux" => Self::Linux,
            "macos" => Self::Macos,
            _ => Self::Unknown,
        }
    }

    pub fn is_windows(&self) -> bool {
        matches!(self, Self::Windows)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Windows => "windows",
            Self::Linux => "linux",
            Self::Macos => "macos",
            Self::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// Options for one command execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ExecOptions {
    /// Kill the child after this many milliseconds (default 60 000).
    pub timeout_ms: u64,
    /// Per-stream output cap in bytes (default 10 MiB).
    pub max_buffer: usize,
    /// When set, `execute_sequence` keeps going past non-zero exits.
    pub stream_output: bool,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_buffer: DEFAULT_MAX_BUFFER,
            stream_output: false,
        }
    }
}

impl ExecOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_max_buffer(mut self, bytes: usize) -> Self {
        self.max_buffer = bytes;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Result of one command, as returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub output: String,
    pub exit_code: i32,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl CommandResult {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// One entry of a session's command history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRecord {
    /// The command as actually run, after normalization.
    pub command: String,
    pub output: String,
    pub exit_code: i32,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
}

/// An execution context: shell, working directory, environment and history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalSession {
    pub id: String,
    pub platform: Platform,
    pub shell: String,
    pub cwd: PathBuf,
    #[serde(skip)]
    pub env: HashMap<String, String>,
    pub history: VecDeque<CommandRecord>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_host: Option<String>,
}

/// Row returned by `TerminalManager::list_sessions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub platform: Platform,
    pub target_host: Option<String>,
    pub command_count: usize,
    pub created_at: DateTime<Utc>,
}

/// Snapshot returned by `TerminalManager::get_platform_info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformInfo {
    pub platform: Platform,
    pub default_shell: String,
    pub total_sessions: usize,
    pub hostname: String,
    pub arch: String,
    pub os_version: String,
}

/// One entry for `TerminalManager::execute_parallel`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParallelCommand {
    pub command: String,
    #[serde(default)]
    pub target_host: Option<String>,
}

impl ParallelCommand {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            target_host: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_options_defaults() {
        let opts = ExecOptions::default();
        assert_eq!(opts.timeout(), Duration::from_secs(60));
        assert_eq!(opts.max_buffer, 10 * 1024 * 1024);
        assert!(!opts.stream_output);
    }

    #[test]
    fn test_exec_options_huge_timeout_saturates() {
        let opts = ExecOptions::default().with_timeout(Duration::MAX);
        assert_eq!(opts.timeout_ms, u64::MAX);
        let opts = ExecOptions::default().with_timeout(Duration::from_secs(90));
        assert_eq!(opts.timeout_ms, 90_000);
    }

    #[test]
    fn test_exec_options_reject_unknown_fields() {
        let json = r#"{"timeout_ms": 5, "interactive": true}"#;
        assert!(serde_json::from_str::<ExecOptions>(json).is_err());
    }

    #[test]
    fn test_exec_options_partial_json_uses_defaults() {
        let opts: ExecOptions = serde_json::from_str(r#"{"timeout_ms": 1500}"#).unwrap();
        assert_eq!(opts.timeout(), Duration::from_millis(1500));
        assert_eq!(opts.max_buffer, DEFAULT_MAX_BUFFER);
    }

    #[test]
    fn test_platform_detect_matches_target_os() {
        let platform = Platform::detect();
        if cfg!(target_os = "linux") {
            assert_eq!(platform, Platform::Linux);
        }
        if cfg!(windows) {
            assert!(platform.is_windows());
        }
    }
}
