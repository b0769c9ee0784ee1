//! Assessment sessions: phase state machines, findings and reports.
//!
//! A `ForgeSession` moves `initializing → exploring → {completed | failed | aborted}`.
//! Each `ForgePhase` moves `pending → running → {completed | failed}`.

pub mod findings;
pub mod orchestrator;
pub mod phases;
pub mod report;

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::OrchestratorError;
use crate::terminal::{CommandResult, DEFAULT_TIMEOUT_MS};

pub use findings::{Finding, FindingCategory, Severity, analyze};
pub use orchestrator::PhaseOrchestrator;
pub use phases::{KNOWN_PHASE_IDS, build_phases};
pub use report::render_report;

/// Default cap on terminal sessions one forge session may open.
pub const DEFAULT_MAX_TERMINALS: usize = 4;

/// Session-level state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Validated and accepted; background execution not yet begun
    #[default]
    Initializing,
    /// Phases are running
    Exploring,
    /// Every phase ran
    Completed,
    /// Background driving hit an unexpected error
    Failed,
    /// Stopped by `abort_session`
    Aborted,
}

impl SessionStatus {
    /// Check if the session will never change status again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Aborted)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Initializing => "initializing",
            Self::Exploring => "exploring",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        };
        write!(f, "{}", s)
    }
}

/// Phase-level state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl PhaseStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// A command together with what running it produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseCommandResult {
    pub command: String,
    pub result: CommandResult,
}

/// One named stage of a session with a fixed command list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForgePhase {
    pub id: String,
    pub name: String,
    pub description: String,
    pub commands: Vec<String>,
    pub status: PhaseStatus,
    pub results: Vec<PhaseCommandResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ForgePhase {
    pub fn new(id: &str, name: &str, description: &str, commands: Vec<String>) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            commands,
            status: PhaseStatus::Pending,
            results: Vec::new(),
            started_at: None,
            completed_at: None,
        }
    }
}

/// One assessment session against a validated target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForgeSession {
    pub id: String,
    pub target_id: String,
    pub target_host: String,
    pub target_name: String,
    /// Terminal sessions opened on behalf of this session, in order.
    pub terminal_sessions: Vec<String>,
    pub status: SessionStatus,
    pub phases: Vec<ForgePhase>,
    /// Index into `phases` of the phase running or last run.
    pub current_phase: usize,
    pub findings: Vec<Finding>,
    pub errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ForgeSession {
    /// Finding counts keyed by severity; every severity is present.
    pub fn findings_by_severity(&self) -> BTreeMap<Severity, usize> {
        let mut counts: BTreeMap<Severity, usize> =
            Severity::ALL.iter().map(|s| (*s, 0)).collect();
        for finding in &self.findings {
            *counts.entry(finding.severity).or_default() += 1;
        }
        counts
    }

    pub fn phase(&self, id: &str) -> Option<&ForgePhase> {
        self.phases.iter().find(|p| p.id == id)
    }
}

/// Options for `PhaseOrchestrator::start_session`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    pub target_id: String,
    /// Allow-list of phase ids; `None` runs every phase the target gets.
    #[serde(default)]
    pub phases: Option<Vec<String>>,
    #[serde(default = "default_max_terminals")]
    pub max_terminals: usize,
    /// Per-command timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub auto_exploit: bool,
    #[serde(default = "default_safe_mode")]
    pub safe_mode: bool,
}

fn default_max_terminals() -> usize {
    DEFAULT_MAX_TERMINALS
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_safe_mode() -> bool {
    true
}

impl SessionConfig {
    /// Defaults for `target_id`: safe mode on, auto exploit off.
    pub fn new(target_id: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            phases: None,
            max_terminals: DEFAULT_MAX_TERMINALS,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            auto_exploit: false,
            safe_mode: true,
        }
    }

    pub fn with_phases<I, S>(mut self, phases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.phases = Some(phases.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Reject values no session could run with.
    pub fn validate(&self) -> Result<(), OrchestratorError> {
        if self.timeout_ms == 0 {
            return Err(OrchestratorError::InvalidConfig(
                "timeout must be greater than zero".to_string(),
            ));
        }
        if self.max_terminals == 0 {
            return Err(OrchestratorError::InvalidConfig(
                "max_terminals must be greater than zero".to_string(),
            ));
        }
        if let Some(phases) = &self.phases
            && let Some(unknown) = phases
                .iter()
                .find(|id| !KNOWN_PHASE_IDS.contains(&id.as_str()))
        {
            return Err(OrchestratorError::InvalidConfig(format!(
                "unknown phase '{}' (expected one of: {})",
                unknown,
                KNOWN_PHASE_IDS.join(", ")
            )));
        }
        Ok(())
    }
}
