//! Typed error hierarchy for the forge engine.
//!
//! Four enums cover the four subsystems:
//! - `TargetError`: registry, authorization and persistence failures
//! - `TerminalError`: terminal session bookkeeping failures
//! - `ExecError`: a single child process failed to run to completion
//! - `OrchestratorError`: session start and phase driving failures
//!
//! Self-target, authorization and validation failures carry distinct message
//! prefixes so an operator never mistakes a refusal for a technical fault.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors from the target registry.
#[derive(Debug, Error)]
pub enum TargetError {
    #[error(
        "SECURITY ERROR: Cannot register self as target ({host}). Self-targeting is strictly prohibited."
    )]
    SelfTarget { host: String },

    #[error("AUTHORIZATION ERROR: {0}")]
    Authorization(String),

    #[error("Target {id} not found")]
    NotFound { id: String },

    #[error("Invalid target record: {0}")]
    InvalidRecord(String),

    #[error("Failed to persist target record at {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to (de)serialize target records: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Target registry lock poisoned")]
    LockPoisoned,
}

/// Errors from terminal session bookkeeping.
#[derive(Debug, Error)]
pub enum TerminalError {
    #[error("Terminal session {id} not found")]
    SessionNotFound { id: String },
}

/// Failure of one child process execution.
///
/// Never escapes `TerminalManager::execute_command`: it is folded into the
/// command result as a non-zero exit code and a message.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("Failed to spawn shell: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("I/O error while running command: {0}")]
    Io(#[source] std::io::Error),

    #[error("Command timed out after {}s", .after.as_secs_f64())]
    TimedOut { after: Duration },

    #[error("Command output exceeded max buffer of {limit} bytes")]
    OutputLimitExceeded { limit: usize },
}

/// Errors from the phase orchestrator.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("AUTHORIZATION ERROR: Target {id} not found. Target must be registered.")]
    TargetNotFound { id: String },

    #[error("SECURITY ERROR: Self-targeting detected for {host}. Cannot target this system.")]
    SelfTarget { host: String, errors: Vec<String> },

    #[error("TARGET VALIDATION FAILED for {host}: {}", .errors.join(", "))]
    TargetValidation {
        host: String,
        errors: Vec<String>,
        warnings: Vec<String>,
    },

    #[error("Forge session {id} not found")]
    SessionNotFound { id: String },

    #[error("Phase {phase} failed: {message}")]
    PhaseExecution { phase: String, message: String },

    #[error("Invalid session configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Terminal(#[from] TerminalError),

    #[error(transparent)]
    Target(#[from] TargetError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_target_and_authorization_messages_are_distinct() {
        let self_err = TargetError::SelfTarget {
            host: "localhost".into(),
        };
        let auth_err = TargetError::Authorization("missing document".into());
        assert!(self_err.to_string().starts_with("SECURITY ERROR"));
        assert!(auth_err.to_string().starts_with("AUTHORIZATION ERROR"));
        assert!(self_err.to_string().contains("localhost"));
    }

    #[test]
    fn test_target_validation_joins_errors() {
        let err = OrchestratorError::TargetValidation {
            host: "10.0.0.5".into(),
            errors: vec!["not registered".into(), "not authorized".into()],
            warnings: vec![],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("TARGET VALIDATION FAILED"));
        assert!(msg.contains("not registered, not authorized"));
    }

    #[test]
    fn test_orchestrator_error_converts_from_terminal_error() {
        let inner = TerminalError::SessionNotFound { id: "abc".into() };
        let err: OrchestratorError = inner.into();
        match &err {
            OrchestratorError::Terminal(TerminalError::SessionNotFound { id }) => {
                assert_eq!(id, "abc");
            }
            _ => panic!("Expected OrchestratorError::Terminal(SessionNotFound)"),
        }
    }

    #[test]
    fn test_exec_error_timeout_reports_seconds() {
        let err = ExecError::TimedOut {
            after: Duration::from_secs(5),
        };
        assert!(err.to_string().contains("5s"));
    }

    #[test]
    fn test_persistence_error_carries_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = TargetError::Persistence {
            path: PathBuf::from("/targets/target_x.json"),
            source: io_err,
        };
        match &err {
            TargetError::Persistence { path, source } => {
                assert_eq!(path, &PathBuf::from("/targets/target_x.json"));
                assert_eq!(source.kind(), std::io::ErrorKind::PermissionDenied);
            }
            _ => panic!("Expected Persistence"),
        }
    }

    #[test]
    fn test_all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&TargetError::LockPoisoned);
        assert_std_error(&TerminalError::SessionNotFound { id: "t".into() });
        assert_std_error(&ExecError::OutputLimitExceeded { limit: 1 });
        assert_std_error(&OrchestratorError::InvalidConfig("x".into()));
    }
}
