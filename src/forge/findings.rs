//! Findings extracted from command output.
//!
//! [`analyze`] is a best-effort rule matcher: each rule is an independent
//! pattern test, so one command result can yield several findings and none
//! of them can fail.
//!
//! ## Example
//!
//! ```
//! use ale_forge::forge::findings::{analyze, FindingCategory, Severity};
//! use ale_forge::terminal::CommandResult;
//!
//! let result = CommandResult {
//!     output: "DB_PASSWORD=hunter2".to_string(),
//!     exit_code: 0,
//!     duration_ms: 3,
//!     timestamp: chrono::Utc::now(),
//! };
//! let findings = analyze("scan", "cat .env", &result);
//! assert_eq!(findings[0].category, FindingCategory::Credential);
//! assert_eq!(findings[0].severity, Severity::High);
//! ```

use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::terminal::CommandResult;

/// Evidence excerpts are cut to this many characters.
pub const MAX_EVIDENCE_CHARS: usize = 500;

const CREDENTIAL_MARKERS: &[&str] = &["password", "secret", "api_key"];

static SUID_COMMAND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-perm\s+(-4000|/4000|-u=s|/u=s)").unwrap());

static LISTENING_COMMAND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(netstat|ss)\b").unwrap());

/// What kind of observation a finding is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingCategory {
    Vulnerability,
    Misconfiguration,
    Credential,
    Service,
    File,
    Network,
}

impl fmt::Display for FindingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Vulnerability => "vulnerability",
            Self::Misconfiguration => "misconfiguration",
            Self::Credential => "credential",
            Self::Service => "service",
            Self::File => "file",
            Self::Network => "network",
        };
        write!(f, "{}", s)
    }
}

/// Finding severity, ordered from most to least severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    /// Every severity, most severe first.
    pub const ALL: [Severity; 5] = [
        Self::Critical,
        Self::High,
        Self::Medium,
        Self::Low,
        Self::Info,
    ];

    pub fn emoji(&self) -> &'static str {
        match self {
            Self::Critical => "🔴",
            Self::High => "🟠",
            Self::Medium => "🟡",
            Self::Low => "🔵",
            Self::Info => "⚪",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Info => "info",
        };
        write!(f, "{}", s)
    }
}

/// One structured observation. Never edited once appended to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub category: FindingCategory,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub evidence: String,
    pub discovered_at: DateTime<Utc>,
    /// Id of the phase whose command produced this finding.
    pub phase: String,
}

impl Finding {
    pub fn new(
        category: FindingCategory,
        severity: Severity,
        title: impl Into<String>,
        phase: impl Into<String>,
    ) -> Self {
        Self {
            id: format!("finding-{}", Uuid::new_v4()),
            category,
            severity,
            title: title.into(),
            description: String::new(),
            evidence: String::new(),
            discovered_at: Utc::now(),
            phase: phase.into(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Attach evidence, cut to [`MAX_EVIDENCE_CHARS`].
    pub fn with_evidence(mut self, evidence: &str) -> Self {
        self.evidence = excerpt(evidence);
        self
    }
}

/// First [`MAX_EVIDENCE_CHARS`] characters of `text`.
pub fn excerpt(text: &str) -> String {
    match text.char_indices().nth(MAX_EVIDENCE_CHARS) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}

/// Derive findings from one executed command.
pub fn analyze(phase: &str, command: &str, result: &CommandResult) -> Vec<Finding> {
    let mut findings = Vec::new();
    let lowered = result.output.to_lowercase();

    if CREDENTIAL_MARKERS.iter().any(|m| lowered.contains(m)) {
        findings.push(
            Finding::new(
                FindingCategory::Credential,
                Severity::High,
                "Potential credentials found",
                phase,
            )
            .with_description(format!("Command output may contain sensitive credentials: {}", command))
            .with_evidence(&result.output),
        );
    }

    if result.succeeded() && SUID_COMMAND.is_match(command) {
        let binaries: Vec<&str> = result
            .output
            .lines()
            .filter(|line| !line.trim().is_empty())
            .collect();
        if !binaries.is_empty() {
            findings.push(
                Finding::new(
                    FindingCategory::Vulnerability,
                    Severity::Medium,
                    "SUID binaries found",
                    phase,
                )
                .with_description(
                    "SUID binaries run with their owner's privileges and may allow privilege escalation",
                )
                .with_evidence(&format!(
                    "Found {} SUID binaries:\n{}",
                    binaries.len(),
                    binaries.join("\n")
                )),
            );
        }
    }

    if result.succeeded() && LISTENING_COMMAND.is_match(command) {
        let listening: Vec<&str> = result
            .output
            .lines()
            .filter(|line| line.contains("LISTEN"))
            .collect();
        if !listening.is_empty() {
            findings.push(
                Finding::new(
                    FindingCategory::Network,
                    Severity::Info,
                    "Listening services discovered",
                    phase,
                )
                .with_description(format!("Found {} listening sockets", listening.len()))
                .with_evidence(&listening.join("\n")),
            );
        }
    }

    findings
}
