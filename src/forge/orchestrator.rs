//! Drives forge sessions through their phases.
//!
//! `start_session` validates the target and returns at once; a spawned task
//! then runs the phases in order. That task is the only writer of a
//! session's phases and findings. `abort_session` only flips the status and
//! closes terminals, and the driver notices at the next phase boundary.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::phases::{build_phases, filter_phases};
use super::{
    ForgePhase, ForgeSession, PhaseCommandResult, PhaseStatus, SessionConfig, SessionStatus,
    analyze, render_report,
};
use crate::errors::OrchestratorError;
use crate::target::{TargetRegistry, TargetSystem};
use crate::terminal::{ExecOptions, TerminalManager};

type SessionMap = Arc<RwLock<HashMap<String, ForgeSession>>>;

const COMPLETION_POLL: Duration = Duration::from_millis(50);

/// Runs assessment sessions against registered, validated targets.
pub struct PhaseOrchestrator {
    registry: Arc<TargetRegistry>,
    terminals: Arc<TerminalManager>,
    sessions: SessionMap,
    exec_defaults: ExecOptions,
}

impl PhaseOrchestrator {
    pub fn new(registry: Arc<TargetRegistry>, terminals: Arc<TerminalManager>) -> Self {
        Self {
            registry,
            terminals,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            exec_defaults: ExecOptions::default(),
        }
    }

    /// Execution options used for every command; the timeout is replaced by
    /// each session's own.
    pub fn with_exec_options(mut self, options: ExecOptions) -> Self {
        self.exec_defaults = options;
        self
    }

    pub fn registry(&self) -> &Arc<TargetRegistry> {
        &self.registry
    }

    pub fn terminals(&self) -> &Arc<TerminalManager> {
        &self.terminals
    }

    /// Validate the target and begin running phases in the background.
    ///
    /// Returns the session in `initializing` status. No terminal session is
    /// opened unless validation passed.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn start_session(&self, config: SessionConfig) -> Result<ForgeSession, OrchestratorError> {
        config.validate()?;

        let target = self.registry.get_target(&config.target_id).ok_or_else(|| {
            OrchestratorError::TargetNotFound {
                id: config.target_id.clone(),
            }
        })?;

        let validation = self.registry.validate_target(&target.host);
        if validation.is_self_target {
            error!(target_id = %target.id, host = %target.host, "refused self-target session");
            return Err(OrchestratorError::SelfTarget {
                host: target.host,
                errors: validation.errors,
            });
        }
        if !validation.is_valid {
            warn!(target_id = %target.id, errors = ?validation.errors, "target validation failed");
            return Err(OrchestratorError::TargetValidation {
                host: target.host,
                errors: validation.errors,
                warnings: validation.warnings,
            });
        }
        for warning in &validation.warnings {
            warn!(target_id = %target.id, "{}", warning);
        }

        let phases = filter_phases(
            build_phases(target.os, config.auto_exploit, config.safe_mode),
            config.phases.as_deref(),
        );
        if phases.is_empty() {
            return Err(OrchestratorError::InvalidConfig(format!(
                "phase selection {:?} leaves nothing to run for this target \
                 (exploit and post-exploit need auto_exploit with safe mode off)",
                config.phases.as_deref().unwrap_or_default()
            )));
        }
        Ok(self.launch(&target, &config, phases))
    }

    fn launch(
        &self,
        target: &TargetSystem,
        config: &SessionConfig,
        phases: Vec<ForgePhase>,
    ) -> ForgeSession {
        let session = ForgeSession {
            id: format!("forge-{}", Uuid::new_v4()),
            target_id: target.id.clone(),
            target_host: target.host.clone(),
            target_name: target.name.clone(),
            terminal_sessions: Vec::new(),
            status: SessionStatus::Initializing,
            phases,
            current_phase: 0,
            findings: Vec::new(),
            errors: Vec::new(),
            started_at: Utc::now(),
            completed_at: None,
        };
        info!(
            session_id = %session.id,
            target_id = %session.target_id,
            host = %session.target_host,
            phases = session.phases.len(),
            "Forge session started"
        );
        write_sessions(&self.sessions).insert(session.id.clone(), session.clone());

        let driver = SessionDriver {
            session_id: session.id.clone(),
            target_host: session.target_host.clone(),
            sessions: Arc::clone(&self.sessions),
            terminals: Arc::clone(&self.terminals),
            options: ExecOptions {
                timeout_ms: config.timeout_ms,
                ..self.exec_defaults.clone()
            },
            max_terminals: config.max_terminals,
        };
        let sessions = Arc::clone(&self.sessions);
        let session_id = session.id.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::spawn(driver.run()).await {
                error!(session_id = %session_id, error = %e, "forge session driver crashed");
                if let Some(s) = write_sessions(&sessions).get_mut(&session_id) {
                    s.errors.push(format!("Session execution failed: {}", e));
                    if !s.status.is_terminal() {
                        s.status = SessionStatus::Failed;
                    }
                    s.completed_at = Some(Utc::now());
                }
            }
        });

        session
    }

    pub fn get_session(&self, session_id: &str) -> Result<ForgeSession, OrchestratorError> {
        read_sessions(&self.sessions)
            .get(session_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::SessionNotFound {
                id: session_id.to_string(),
            })
    }

    /// Every session, oldest first.
    pub fn list_sessions(&self) -> Vec<ForgeSession> {
        let mut sessions: Vec<ForgeSession> =
            read_sessions(&self.sessions).values().cloned().collect();
        sessions.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        sessions
    }

    /// Mark a session aborted and close every terminal it opened.
    ///
    /// A session already in a terminal status keeps it; its terminals are
    /// still closed. Returns whether the session exists.
    pub fn abort_session(&self, session_id: &str) -> bool {
        let terminal_ids = {
            let mut sessions = write_sessions(&self.sessions);
            let Some(session) = sessions.get_mut(session_id) else {
                return false;
            };
            if !session.status.is_terminal() {
                session.status = SessionStatus::Aborted;
                session.completed_at = Some(Utc::now());
            }
            session.terminal_sessions.clone()
        };

        for terminal_id in &terminal_ids {
            self.terminals.close_session(terminal_id);
        }
        info!(session_id = %session_id, terminals = terminal_ids.len(), "Forge session aborted");
        true
    }

    /// Wait until the session reaches a terminal status and return it.
    pub async fn wait_for_completion(
        &self,
        session_id: &str,
    ) -> Result<ForgeSession, OrchestratorError> {
        loop {
            let session = self.get_session(session_id)?;
            if session.status.is_terminal() {
                return Ok(session);
            }
            tokio::time::sleep(COMPLETION_POLL).await;
        }
    }

    /// Markdown report of the session as it stands now.
    pub fn generate_report(&self, session_id: &str) -> Result<String, OrchestratorError> {
        let session = self.get_session(session_id)?;
        Ok(render_report(&session))
    }
}

fn read_sessions(sessions: &SessionMap) -> RwLockReadGuard<'_, HashMap<String, ForgeSession>> {
    // No code panics while holding the lock.
    sessions.read().unwrap_or_else(|e| e.into_inner())
}

fn write_sessions(sessions: &SessionMap) -> RwLockWriteGuard<'_, HashMap<String, ForgeSession>> {
    sessions.write().unwrap_or_else(|e| e.into_inner())
}

/// Background task state for one session.
struct SessionDriver {
    session_id: String,
    target_host: String,
    sessions: SessionMap,
    terminals: Arc<TerminalManager>,
    options: ExecOptions,
    max_terminals: usize,
}

impl SessionDriver {
    /// Apply `f` to the session; `None` if it has been removed.
    fn update<R>(&self, f: impl FnOnce(&mut ForgeSession) -> R) -> Option<R> {
        write_sessions(&self.sessions)
            .get_mut(&self.session_id)
            .map(f)
    }

    async fn run(self) {
        let Some(phase_count) = self.update(|s| {
            if s.status == SessionStatus::Initializing {
                s.status = SessionStatus::Exploring;
            }
            s.phases.len()
        }) else {
            return;
        };

        for index in 0..phase_count {
            // Cancellation is checked only here, between phases. The phase's
            // terminal is opened under the same lock, so `abort_session`
            // either stops the phase or sees its terminal.
            let started = self.update(|s| {
                if s.status == SessionStatus::Aborted {
                    return None;
                }
                s.current_phase = index;
                let terminal = self.open_terminal(s);
                let phase = &mut s.phases[index];
                phase.status = PhaseStatus::Running;
                phase.started_at = Some(Utc::now());
                Some((
                    phase.id.clone(),
                    phase.name.clone(),
                    phase.commands.clone(),
                    terminal,
                ))
            });
            let Some(Some((phase_id, phase_name, commands, terminal))) = started else {
                debug!(session_id = %self.session_id, "stopping before phase {}", index);
                break;
            };

            info!(session_id = %self.session_id, phase = %phase_id, "Starting phase: {}", phase_name);
            let outcome = match terminal {
                Ok(terminal_id) => self.run_phase(index, &phase_id, &terminal_id, &commands).await,
                Err(message) => Err(OrchestratorError::PhaseExecution {
                    phase: phase_id.clone(),
                    message,
                }),
            };

            self.update(|s| {
                let phase = &mut s.phases[index];
                phase.completed_at = Some(Utc::now());
                match &outcome {
                    Ok(()) => phase.status = PhaseStatus::Completed,
                    Err(e) => {
                        phase.status = PhaseStatus::Failed;
                        s.errors.push(e.to_string());
                    }
                }
            });
            match outcome {
                Ok(()) => info!(session_id = %self.session_id, phase = %phase_id, "Phase completed"),
                Err(e) => warn!(session_id = %self.session_id, phase = %phase_id, error = %e, "Phase failed"),
            }
        }

        self.update(|s| {
            if !s.status.is_terminal() {
                s.status = SessionStatus::Completed;
                s.completed_at = Some(Utc::now());
            }
            info!(
                session_id = %s.id,
                status = %s.status,
                findings = s.findings.len(),
                "Forge session finished"
            );
        });
    }

    /// Open the terminal for the next phase and record it on the session.
    fn open_terminal(&self, session: &mut ForgeSession) -> Result<String, String> {
        if session.terminal_sessions.len() >= self.max_terminals {
            return Err(format!("terminal limit of {} reached", self.max_terminals));
        }
        let terminal_id = self.terminals.create_session(Some(&self.target_host), None);
        session.terminal_sessions.push(terminal_id.clone());
        Ok(terminal_id)
    }

    async fn run_phase(
        &self,
        index: usize,
        phase_id: &str,
        terminal_id: &str,
        commands: &[String],
    ) -> Result<(), OrchestratorError> {
        let phase_error = |message: String| OrchestratorError::PhaseExecution {
            phase: phase_id.to_string(),
            message,
        };

        for command in commands {
            let result = self
                .terminals
                .execute_command(terminal_id, command, &self.options)
                .await
                .map_err(|e| phase_error(e.to_string()))?;

            let findings = analyze(phase_id, command, &result);
            if !findings.is_empty() {
                debug!(session_id = %self.session_id, phase = %phase_id, count = findings.len(), "findings extracted");
            }
            self.update(|s| {
                s.phases[index].results.push(PhaseCommandResult {
                    command: command.clone(),
                    result,
                });
                s.findings.extend(findings);
            });
        }
        Ok(())
    }
}
