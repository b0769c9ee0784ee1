//! Integration tests for the assessment engine
//!
//! These drive the public library API end to end: registry, orchestrator and
//! terminal manager wired together the way the binary wires them.

use std::sync::Arc;
use std::time::Duration;

use ale_forge::errors::{OrchestratorError, TargetError};
use ale_forge::forge::{PhaseOrchestrator, PhaseStatus, SessionConfig, SessionStatus};
use ale_forge::target::{
    JsonDirStore, MemoryStore, SelfIdentifierSet, TargetDraft, TargetOs, TargetRegistry,
    TargetStore, TargetSystem,
};
use ale_forge::terminal::TerminalManager;
use chrono::Utc;
use tempfile::TempDir;

/// Registry with a fixed self-identifier set so tests don't depend on the host.
fn registry_over(store: Box<dyn TargetStore>) -> Arc<TargetRegistry> {
    let self_ids = SelfIdentifierSet::from_identifiers(["assessor.internal", "172.31.0.9"]);
    Arc::new(TargetRegistry::with_self_identifiers(store, self_ids).unwrap())
}

fn orchestrator() -> PhaseOrchestrator {
    PhaseOrchestrator::new(
        registry_over(Box::new(MemoryStore::new())),
        Arc::new(TerminalManager::new()),
    )
}

fn register(orch: &PhaseOrchestrator, host: &str, os: TargetOs) -> TargetSystem {
    orch.registry()
        .register_target(TargetDraft::new("lab", host, os).authorized_by_document("ROE-7"))
        .unwrap()
}

// =============================================================================
// Authorization gate
// =============================================================================

mod gate {
    use super::*;

    #[tokio::test]
    async fn test_unregistered_target_creates_no_session() {
        let orch = orchestrator();
        let err = orch
            .start_session(SessionConfig::new("target-does-not-exist"))
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::TargetNotFound { .. }));
        assert!(orch.list_sessions().is_empty());
        assert_eq!(orch.terminals().session_count(), 0);
    }

    #[tokio::test]
    async fn test_unauthorized_target_opens_no_terminal() {
        let orch = orchestrator();
        let target = register(&orch, "10.44.0.12", TargetOs::Linux);
        orch.registry()
            .revoke_authorization(&target.id, "window closed")
            .unwrap();

        let err = orch.start_session(SessionConfig::new(&target.id)).unwrap_err();
        match err {
            OrchestratorError::TargetValidation { host, errors, .. } => {
                assert_eq!(host, "10.44.0.12");
                assert!(!errors.is_empty());
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
        assert_eq!(orch.terminals().session_count(), 0);
        assert!(orch.list_sessions().is_empty());
    }

    #[tokio::test]
    async fn test_stored_self_target_is_still_refused() {
        // A record that bypassed registration, e.g. a hand-edited store.
        let store = MemoryStore::new();
        let planted = TargetSystem {
            id: "target-planted".into(),
            name: "me".into(),
            host: "Assessor.Internal".into(),
            port: None,
            os: TargetOs::Linux,
            authorized: true,
            authorization_document: Some("forged".into()),
            authorization_date: Some(Utc::now()),
            authorized_by: None,
            scope: vec![],
            out_of_scope: vec![],
            notes: String::new(),
            created_at: Utc::now(),
            last_verified: None,
        };
        store.save(&planted).unwrap();

        let orch = PhaseOrchestrator::new(
            registry_over(Box::new(store)),
            Arc::new(TerminalManager::new()),
        );
        let err = orch.start_session(SessionConfig::new("target-planted")).unwrap_err();
        assert!(matches!(err, OrchestratorError::SelfTarget { .. }));
        assert!(err.to_string().starts_with("SECURITY ERROR"));
        assert_eq!(orch.terminals().session_count(), 0);
    }

    #[tokio::test]
    async fn test_loopback_registration_is_refused_even_when_authorized() {
        let orch = orchestrator();
        for host in ["localhost", "127.0.0.1", "0.0.0.0", "::1", "172.31.0.9"] {
            let err = orch
                .registry()
                .register_target(
                    TargetDraft::new("self", host, TargetOs::Linux).authorized_by_document("x"),
                )
                .unwrap_err();
            assert!(matches!(err, TargetError::SelfTarget { .. }), "{host}");
        }
        assert!(orch.registry().list_targets().is_empty());
    }
}

// =============================================================================
// Phase construction through start_session
// =============================================================================

mod phase_lists {
    use super::*;

    fn phase_ids(orch: &PhaseOrchestrator, config: SessionConfig) -> Vec<String> {
        let session = orch.start_session(config).unwrap();
        orch.abort_session(&session.id);
        session.phases.iter().map(|p| p.id.clone()).collect()
    }

    #[tokio::test]
    async fn test_safe_mode_wins_over_auto_exploit() {
        let orch = orchestrator();
        let oses = [TargetOs::Windows, TargetOs::Linux, TargetOs::Macos];
        for (i, os) in oses.into_iter().enumerate() {
            let target = register(&orch, &format!("10.50.0.{}", i + 1), os);
            let mut config = SessionConfig::new(&target.id);
            config.auto_exploit = true;
            config.safe_mode = true;
            assert_eq!(phase_ids(&orch, config), vec!["recon", "scan"]);
        }
    }

    #[tokio::test]
    async fn test_unsafe_auto_exploit_adds_escalation_phases() {
        let orch = orchestrator();
        let target = register(&orch, "10.50.1.1", TargetOs::Linux);
        let mut config = SessionConfig::new(&target.id);
        config.auto_exploit = true;
        config.safe_mode = false;
        assert_eq!(
            phase_ids(&orch, config),
            vec!["recon", "scan", "exploit", "post-exploit"]
        );
    }

    #[tokio::test]
    async fn test_phase_allow_list() {
        let orch = orchestrator();
        let target = register(&orch, "10.50.1.2", TargetOs::Windows);
        let config = SessionConfig::new(&target.id).with_phases(["scan"]);
        assert_eq!(phase_ids(&orch, config), vec!["scan"]);
    }

    #[tokio::test]
    async fn test_session_starts_initializing_and_reports_immediately() {
        let orch = orchestrator();
        let target = register(&orch, "10.50.1.3", TargetOs::Linux);
        let session = orch.start_session(SessionConfig::new(&target.id)).unwrap();
        assert_eq!(session.status, SessionStatus::Initializing);
        assert!(session.id.starts_with("forge-"));

        let report = orch.generate_report(&session.id).unwrap();
        assert!(report.contains("## Session Information"));
        assert!(report.contains(&session.id));

        orch.abort_session(&session.id);
        let done = orch.wait_for_completion(&session.id).await.unwrap();
        assert_eq!(done.status, SessionStatus::Aborted);
    }
}

// =============================================================================
// Real execution
// =============================================================================

#[cfg(unix)]
mod execution {
    use super::*;

    #[tokio::test]
    async fn test_scan_phase_runs_every_command_locally() {
        let orch = orchestrator();
        let target = register(&orch, "10.60.0.20", TargetOs::Linux);
        let config = SessionConfig::new(&target.id)
            .with_phases(["scan"])
            .with_timeout(Duration::from_secs(10));

        let session = orch.start_session(config).unwrap();
        let done = tokio::time::timeout(
            Duration::from_secs(120),
            orch.wait_for_completion(&session.id),
        )
        .await
        .expect("session finished in time")
        .unwrap();

        assert_eq!(done.status, SessionStatus::Completed);
        let scan = done.phase("scan").unwrap();
        assert_eq!(scan.status, PhaseStatus::Completed);
        assert_eq!(scan.results.len(), scan.commands.len());
        assert_eq!(done.terminal_sessions.len(), 1);

        // Execution is local; the target host is provenance only.
        let terminal = orch.terminals().get_session(&done.terminal_sessions[0]).unwrap();
        assert_eq!(terminal.target_host.as_deref(), Some("10.60.0.20"));
        assert_eq!(terminal.history.len(), scan.commands.len());

        let report = orch.generate_report(&done.id).unwrap();
        assert!(report.contains("Vulnerability Scanning (scan)"));
        assert!(report.contains("- **Status:** completed"));
    }
}

// =============================================================================
// Persistence
// =============================================================================

mod persistence {
    use super::*;

    #[test]
    fn test_targets_persist_across_registry_instances() {
        let dir = TempDir::new().unwrap();
        let first = registry_over(Box::new(JsonDirStore::new(dir.path()).unwrap()));
        let target = first
            .register_target(
                TargetDraft::new("db", "10.70.0.5", TargetOs::Linux).authorized_by_document("ROE-9"),
            )
            .unwrap();

        let second = registry_over(Box::new(JsonDirStore::new(dir.path()).unwrap()));
        assert_eq!(second.get_target(&target.id), Some(target.clone()));
        assert!(second.validate_target("10.70.0.5").is_valid);
    }
}
