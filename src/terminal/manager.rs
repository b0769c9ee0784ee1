//! Terminal session ownership and command execution.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;
use sysinfo::System;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    CommandDialect, CommandRecord, CommandResult, DEFAULT_HISTORY_LIMIT, ExecOptions,
    ParallelCommand, Platform, PlatformInfo, SessionSummary, ShellExecutor, TerminalSession,
    dialect_for,
};
use crate::errors::TerminalError;

struct SessionSlot {
    session: TerminalSession,
    /// Serializes execution so history is ordered by issuance.
    turn: Arc<tokio::sync::Mutex<()>>,
}

/// Owns every terminal session and runs commands through the platform dialect.
pub struct TerminalManager {
    dialect: Box<dyn CommandDialect>,
    default_shell: String,
    history_limit: usize,
    sessions: Mutex<HashMap<String, SessionSlot>>,
}

impl Default for TerminalManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalManager {
    /// Manager for the platform this process runs on.
    pub fn new() -> Self {
        Self::with_platform(Platform::detect())
    }

    /// Manager using an explicit platform dialect.
    pub fn with_platform(platform: Platform) -> Self {
        let dialect = dialect_for(platform);
        let default_shell = dialect.default_shell();
        info!(platform = %platform, shell = %default_shell, "Terminal manager initialized");
        Self {
            dialect,
            default_shell,
            history_limit: DEFAULT_HISTORY_LIMIT,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Override the platform default shell for new sessions.
    pub fn with_default_shell(mut self, shell: impl Into<String>) -> Self {
        self.default_shell = shell.into();
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit.max(1);
        self
    }

    pub fn platform(&self) -> Platform {
        self.dialect.platform()
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, SessionSlot>> {
        // The table holds plain data and no code panics while holding it.
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Allocate a session. `target_host` is recorded for provenance only.
    pub fn create_session(&self, target_host: Option<&str>, custom_shell: Option<&str>) -> String {
        let id = format!("term-{}", &Uuid::new_v4().simple().to_string()[..12]);
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

        let mut env: HashMap<String, String> = std::env::vars().collect();
        env.insert("TERM".to_string(), "xterm-256color".to_string());
        env.insert("FORCE_COLOR".to_string(), "1".to_string());
        self.dialect.extend_env(&mut env);

        let session = TerminalSession {
            id: id.clone(),
            platform: self.dialect.platform(),
            shell: custom_shell
                .map(str::to_string)
                .unwrap_or_else(|| self.default_shell.clone()),
            cwd,
            env,
            history: VecDeque::new(),
            created_at: Utc::now(),
            target_host: target_host.map(str::to_string),
        };

        info!(
            terminal_id = %id,
            platform = %session.platform,
            target = target_host.unwrap_or("local"),
            "Created terminal session"
        );
        self.sessions().insert(
            id.clone(),
            SessionSlot {
                session,
                turn: Arc::new(tokio::sync::Mutex::new(())),
            },
        );
        id
    }

    /// Normalize a command the way `execute_command` would.
    pub fn normalize_command(&self, command: &str) -> String {
        self.dialect.normalize(command)
    }

    /// Run one command in a session.
    ///
    /// Child-process failures (spawn errors, timeouts, overflow, non-zero
    /// exits) come back as data in the `CommandResult`; only an unknown
    /// session is an error.
    pub async fn execute_command(
        &self,
        session_id: &str,
        command: &str,
        options: &ExecOptions,
    ) -> Result<CommandResult, TerminalError> {
        let (executor, turn) = {
            let sessions = self.sessions();
            let slot = sessions
                .get(session_id)
                .ok_or_else(|| TerminalError::SessionNotFound {
                    id: session_id.to_string(),
                })?;
            let executor = ShellExecutor {
                shell: slot.session.shell.clone(),
                shell_args: self.dialect.shell_args(&slot.session.shell),
                cwd: slot.session.cwd.clone(),
                env: slot.session.env.clone(),
            };
            (executor, Arc::clone(&slot.turn))
        };

        let _turn = turn.lock().await;
        let normalized = self.dialect.normalize(command);
        let timestamp = Utc::now();
        let started = Instant::now();

        debug!(terminal_id = %session_id, command = %normalized, "executing");
        let (output, exit_code) = match executor.execute(&normalized, options).await {
            Ok(out) => {
                let mut output = out.combined();
                if output.is_empty() && out.exit_code != 0 {
                    output = format!(
                        "Command failed with exit code {}: {}",
                        out.exit_code, normalized
                    );
                }
                (output, out.exit_code)
            }
            Err(e) => {
                warn!(terminal_id = %session_id, command = %normalized, error = %e, "command execution failed");
                (e.to_string(), 1)
            }
        };

        let result = CommandResult {
            output,
            exit_code,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            timestamp,
        };

        // The session may have been closed while the command ran.
        if let Some(slot) = self.sessions().get_mut(session_id) {
            let history = &mut slot.session.history;
            history.push_back(CommandRecord {
                command: normalized,
                output: result.output.clone(),
                exit_code,
                timestamp,
                duration_ms: result.duration_ms,
            });
            while history.len() > self.history_limit {
                history.pop_front();
            }
        }

        Ok(result)
    }

    /// Run commands in order, stopping after the first non-zero exit unless
    /// `options.stream_output` is set.
    pub async fn execute_sequence(
        &self,
        session_id: &str,
        commands: &[String],
        options: &ExecOptions,
    ) -> Result<Vec<CommandResult>, TerminalError> {
        let mut results = Vec::with_capacity(commands.len());
        for command in commands {
            let result = self.execute_command(session_id, command, options).await?;
            let failed = !result.succeeded();
            results.push(result);
            if failed && !options.stream_output {
                break;
            }
        }
        Ok(results)
    }

    /// Run each command in its own new session, concurrently.
    pub async fn execute_parallel(
        &self,
        commands: &[ParallelCommand],
        options: &ExecOptions,
    ) -> Result<Vec<(String, CommandResult)>, TerminalError> {
        let futures = commands.iter().map(|job| async move {
            let session_id = self.create_session(job.target_host.as_deref(), None);
            let result = self
                .execute_command(&session_id, &job.command, options)
                .await?;
            Ok::<_, TerminalError>((session_id, result))
        });
        join_all(futures).await.into_iter().collect()
    }

    pub fn get_session(&self, session_id: &str) -> Option<TerminalSession> {
        self.sessions()
            .get(session_id)
            .map(|slot| slot.session.clone())
    }

    /// Last `limit` history records; empty for an unknown session.
    pub fn get_history(&self, session_id: &str, limit: usize) -> Vec<CommandRecord> {
        self.sessions()
            .get(session_id)
            .map(|slot| {
                let history = &slot.session.history;
                let skip = history.len().saturating_sub(limit);
                history.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default()
    }

    pub fn list_sessions(&self) -> Vec<SessionSummary> {
        let mut summaries: Vec<SessionSummary> = self
            .sessions()
            .values()
            .map(|slot| SessionSummary {
                id: slot.session.id.clone(),
                platform: slot.session.platform,
                target_host: slot.session.target_host.clone(),
                command_count: slot.session.history.len(),
                created_at: slot.session.created_at,
            })
            .collect();
        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        summaries
    }

    /// Drop a session. Returns whether it existed.
    pub fn close_session(&self, session_id: &str) -> bool {
        let removed = self.sessions().remove(session_id).is_some();
        if removed {
            debug!(terminal_id = %session_id, "Closed terminal session");
        }
        removed
    }

    /// Drop every session. Returns how many were closed.
    pub fn close_all_sessions(&self) -> usize {
        let mut sessions = self.sessions();
        let count = sessions.len();
        sessions.clear();
        count
    }

    pub fn session_count(&self) -> usize {
        self.sessions().len()
    }

    pub fn get_platform_info(&self) -> PlatformInfo {
        PlatformInfo {
            platform: self.dialect.platform(),
            default_shell: self.default_shell.clone(),
            total_sessions: self.session_count(),
            hostname: System::host_name().unwrap_or_else(|| "unknown".to_string()),
            arch: std::env::consts::ARCH.to_string(),
            os_version: System::long_os_version().unwrap_or_else(|| "unknown".to_string()),
        }
    }

    pub fn get_platform_commands(&self) -> BTreeMap<&'static str, &'static str> {
        self.dialect.command_library()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn manager() -> TerminalManager {
        TerminalManager::new()
    }

    #[tokio::test]
    async fn test_unknown_session_is_an_error() {
        let mgr = manager();
        let err = mgr
            .execute_command("term-missing", "echo hi", &ExecOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TerminalError::SessionNotFound { .. }));
    }

    #[test]
    fn test_create_session_records_target_and_env() {
        let mgr = manager();
        let id = mgr.create_session(Some("10.0.0.5"), None);
        let session = mgr.get_session(&id).unwrap();
        assert_eq!(session.target_host.as_deref(), Some("10.0.0.5"));
        assert_eq!(session.env.get("TERM").map(String::as_str), Some("xterm-256color"));
        assert_eq!(session.env.get("FORCE_COLOR").map(String::as_str), Some("1"));
        assert!(session.history.is_empty());
    }

    #[test]
    fn test_custom_shell_overrides_default() {
        let mgr = manager();
        let id = mgr.create_session(None, Some("/bin/sh"));
        assert_eq!(mgr.get_session(&id).unwrap().shell, "/bin/sh");
    }

    #[test]
    fn test_close_and_list_sessions() {
        let mgr = manager();
        let a = mgr.create_session(None, None);
        let _b = mgr.create_session(Some("10.0.0.9"), None);
        assert_eq!(mgr.list_sessions().len(), 2);
        assert!(mgr.close_session(&a));
        assert!(!mgr.close_session(&a));
        assert_eq!(mgr.close_all_sessions(), 1);
        assert_eq!(mgr.session_count(), 0);
    }

    #[test]
    fn test_unknown_history_is_empty() {
        assert!(manager().get_history("term-nope", 50).is_empty());
    }

    #[test]
    fn test_platform_info_reports_current_state() {
        let mgr = manager();
        mgr.create_session(None, None);
        let info = mgr.get_platform_info();
        assert_eq!(info.platform, Platform::detect());
        assert_eq!(info.total_sessions, 1);
        assert!(!info.arch.is_empty());
        assert!(mgr.get_platform_commands().contains_key("sys-info"));
    }

    #[cfg(unix)]
    mod unix {
        use super::*;

        fn sh_manager() -> TerminalManager {
            TerminalManager::with_platform(Platform::Linux).with_default_shell("/bin/sh")
        }

        #[tokio::test]
        async fn test_execute_records_normalized_command_in_history() {
            let mgr = sh_manager();
            let id = mgr.create_session(None, None);
            let result = mgr
                .execute_command(&id, "# say hi\necho hi", &ExecOptions::default())
                .await
                .unwrap();
            assert_eq!(result.exit_code, 0);
            assert_eq!(result.output.trim(), "hi");

            let history = mgr.get_history(&id, 10);
            assert_eq!(history.len(), 1);
            assert_eq!(history[0].command, "echo hi");
        }

        #[tokio::test]
        async fn test_failure_without_output_reports_message() {
            let mgr = sh_manager();
            let id = mgr.create_session(None, None);
            let result = mgr
                .execute_command(&id, "exit 4", &ExecOptions::default())
                .await
                .unwrap();
            assert_eq!(result.exit_code, 4);
            assert!(result.output.contains("exit code 4"));
        }

        #[tokio::test]
        async fn test_timeout_becomes_data() {
            let mgr = sh_manager();
            let id = mgr.create_session(None, None);
            let opts = ExecOptions::default().with_timeout(Duration::from_millis(200));
            let result = mgr.execute_command(&id, "sleep 5", &opts).await.unwrap();
            assert_eq!(result.exit_code, 1);
            assert!(result.output.contains("timed out"));
            assert_eq!(mgr.get_history(&id, 10).len(), 1);
        }

        #[tokio::test]
        async fn test_history_evicts_oldest_beyond_limit() {
            let mgr = sh_manager();
            let id = mgr.create_session(None, None);
            for i in 0..1001 {
                mgr.execute_command(&id, &format!("echo {}", i), &ExecOptions::default())
                    .await
                    .unwrap();
            }
            let session = mgr.get_session(&id).unwrap();
            assert_eq!(session.history.len(), 1000);
            assert_eq!(session.history.front().unwrap().command, "echo 1");
            assert!(!session.history.iter().any(|r| r.command == "echo 0"));
        }

        #[tokio::test]
        async fn test_small_history_limit_is_honored() {
            let mgr = sh_manager().with_history_limit(2);
            let id = mgr.create_session(None, None);
            for cmd in ["echo a", "echo b", "echo c"] {
                mgr.execute_command(&id, cmd, &ExecOptions::default())
                    .await
                    .unwrap();
            }
            let commands: Vec<String> = mgr
                .get_history(&id, 50)
                .into_iter()
                .map(|r| r.command)
                .collect();
            assert_eq!(commands, vec!["echo b", "echo c"]);
        }

        #[tokio::test]
        async fn test_sequence_stops_on_first_failure() {
            let mgr = sh_manager();
            let id = mgr.create_session(None, None);
            let commands = vec!["echo one".to_string(), "false".to_string(), "echo three".to_string()];
            let results = mgr
                .execute_sequence(&id, &commands, &ExecOptions::default())
                .await
                .unwrap();
            assert_eq!(results.len(), 2);
            assert_ne!(results[1].exit_code, 0);
        }

        #[tokio::test]
        async fn test_sequence_with_stream_output_runs_everything() {
            let mgr = sh_manager();
            let id = mgr.create_session(None, None);
            let commands = vec!["false".to_string(), "echo after".to_string()];
            let opts = ExecOptions {
                stream_output: true,
                ..Default::default()
            };
            let results = mgr.execute_sequence(&id, &commands, &opts).await.unwrap();
            assert_eq!(results.len(), 2);
            assert_eq!(results[1].output.trim(), "after");
        }

        #[tokio::test]
        async fn test_parallel_opens_one_session_per_command() {
            let mgr = sh_manager();
            let specs = vec![
                ParallelCommand::new("echo a"),
                ParallelCommand {
                    command: "echo b".to_string(),
                    target_host: Some("10.0.0.7".to_string()),
                },
            ];
            let results = mgr
                .execute_parallel(&specs, &ExecOptions::default())
                .await
                .unwrap();
            assert_eq!(results.len(), 2);
            assert_ne!(results[0].0, results[1].0);
            assert_eq!(mgr.session_count(), 2);
            let outputs: Vec<&str> = results.iter().map(|(_, r)| r.output.trim()).collect();
            assert!(outputs.contains(&"a"));
            assert!(outputs.contains(&"b"));
        }

        #[tokio::test]
        async fn test_concurrent_calls_on_one_session_keep_issue_order() {
            let mgr = Arc::new(sh_manager());
            let id = mgr.create_session(None, None);
            let first = {
                let mgr = Arc::clone(&mgr);
                let id = id.clone();
                tokio::spawn(async move {
                    mgr.execute_command(&id, "sleep 0.3; echo first", &ExecOptions::default())
                        .await
                })
            };
            tokio::time::sleep(Duration::from_millis(50)).await;
            mgr.execute_command(&id, "echo second", &ExecOptions::default())
                .await
                .unwrap();
            first.await.unwrap().unwrap();

            let history = mgr.get_history(&id, 10);
            assert!(history[0].command.contains("first"));
            assert!(history[1].command.contains("second"));
        }
    }
}
