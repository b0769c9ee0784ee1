//! Authorized target registry.
//!
//! This module provides:
//! - `TargetSystem` and `TargetDraft`, the registered host record and its input form
//! - `TargetRegistry`, the single gate every downstream operation passes through
//! - `SelfIdentifierSet`, live identifiers of the machine running the engine
//! - `TargetStore`, the persistence port with JSON-directory and in-memory backends
//! - `authorization_template`, a markdown form operators fill in before registering

pub mod registry;
pub mod self_ident;
pub mod store;
pub mod template;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::TargetError;

pub use registry::{DEFAULT_AUTHORIZATION_MAX_AGE_DAYS, TargetRegistry};
pub use self_ident::SelfIdentifierSet;
pub use store::{JsonDirStore, MemoryStore, TargetStore};
pub use template::authorization_template;

/// Operating system family of a target, used to pick phase command lists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetOs {
    Windows,
    Linux,
    Macos,
    #[default]
    Unknown,
}

impl fmt::Display for TargetOs {
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

impl std::str::FromStr for TargetOs {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "windows" | "win" => Ok(Self::Windows),
            "linux" => Ok(Self::Linux),
            "macos" | "darwin" | "osx" => Ok(Self::Macos),
            "unknown" => Ok(Self::Unknown),
            _ => anyhow::bail!(
                "Invalid target OS '{}'. Valid values: windows, linux, macos, unknown",
                s
            ),
        }
    }
}

/// A system an operator has declared authorized for testing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSystem {
    pub id: String,
    pub name: String,
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default)]
    pub os: TargetOs,
    pub authorized: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_document: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorized_by: Option<String>,
    #[serde(default)]
    pub scope: Vec<String>,
    #[serde(default)]
    pub out_of_scope: Vec<String>,
    #[serde(default)]
    pub notes: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_verified: Option<DateTime<Utc>>,
}

impl TargetSystem {
    /// Host in the form used for every comparison: trimmed and lowercased.
    pub fn normalized_host(&self) -> String {
        normalize_host(&self.host)
    }
}

/// Input to `TargetRegistry::register_target`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetDraft {
    pub name: String,
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub os: TargetOs,
    #[serde(default)]
    pub authorized: bool,
    #[serde(default)]
    pub authorization_document: Option<String>,
    #[serde(default)]
    pub authorization_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub authorized_by: Option<String>,
    #[serde(default)]
    pub scope: Vec<String>,
    #[serde(default)]
    pub out_of_scope: Vec<String>,
    #[serde(default)]
    pub notes: String,
}

impl TargetDraft {
    /// Draft with the mandatory fields set; everything else defaulted.
    pub fn new(name: impl Into<String>, host: impl Into<String>, os: TargetOs) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            os,
            ..Default::default()
        }
    }

    /// Mark the draft authorized under the given document reference.
    pub fn authorized_by_document(mut self, document: impl Into<String>) -> Self {
        self.authorized = true;
        self.authorization_document = Some(document.into());
        self
    }
}

/// Outcome of `TargetRegistry::validate_target`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub is_self_target: bool,
    pub is_authorized: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

pub(crate) fn normalize_host(host: &str) -> String {
    host.trim().to_lowercase()
}

/// Ids become file names in `JsonDirStore`, so they may not name a path.
pub(crate) fn check_record_id(id: &str) -> Result<(), TargetError> {
    if id.is_empty() || id.contains(['/', '\\']) || id.contains("..") {
        return Err(TargetError::InvalidRecord(format!(
            "target id '{}' is not usable as a file name",
            id
        )));
    }
    Ok(())
}
