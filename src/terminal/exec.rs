//! Async child-process execution with a timeout and bounded output buffers.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::LazyLock;

use regex::Regex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::time::timeout;

use super::ExecOptions;
use crate::errors::ExecError;

static STDERR_NOISE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)deprecated",
        r"(?i)warning:",
        r"(?i)notice:",
        r"(?i)npm warn",
        r"^>\s",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Raw output of a finished child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    /// Stdout followed by the stderr lines that are not known noise.
    pub fn combined(&self) -> String {
        let mut output = self.stdout.clone();
        let filtered = filter_stderr(&self.stderr);
        if !filtered.is_empty() {
            if !output.is_empty() {
                output.push('\n');
            }
            output.push_str(&filtered);
        }
        output
    }
}

/// Drop blank lines and deprecation/warning/notice chatter from stderr.
pub fn filter_stderr(stderr: &str) -> String {
    stderr
        .lines()
        .filter(|line| {
            let trimmed = line.trim();
            !trimmed.is_empty() && !STDERR_NOISE.iter().any(|p| p.is_match(trimmed))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Runs command strings through one shell in one working directory.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    pub shell: String,
    pub shell_args: Vec<&'static str>,
    pub cwd: PathBuf,
    pub env: HashMap<String, String>,
}

impl ShellExecutor {
    /// Run `command` to completion, bounded by `options.timeout_ms` and
    /// `options.max_buffer` bytes per stream.
    ///
    /// A non-zero exit is a successful execution; only failures to run the
    /// child at all (spawn, I/O, timeout, overflow) are errors.
    pub async fn execute(
        &self,
        command: &str,
        options: &ExecOptions,
    ) -> Result<CommandOutput, ExecError> {
        let mut cmd = Command::new(&self.shell);
        cmd.args(&self.shell_args);
        push_command_arg(&mut cmd, command);
        cmd.current_dir(&self.cwd)
            .env_clear()
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(ExecError::Spawn)?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let limit = options.max_buffer;

        let run = async {
            let (out, err) =
                tokio::try_join!(read_bounded(stdout, limit), read_bounded(stderr, limit))?;
            let status = child.wait().await.map_err(ExecError::Io)?;
            Ok::<_, ExecError>(CommandOutput {
                stdout: String::from_utf8_lossy(&out).into_owned(),
                stderr: String::from_utf8_lossy(&err).into_owned(),
                exit_code: status.code().unwrap_or(1),
            })
        };

        let outcome = match timeout(options.timeout(), run).await {
            Ok(result) => result,
            Err(_) => Err(ExecError::TimedOut {
                after: options.timeout(),
            }),
        };

        if outcome.is_err() {
            let _ = child.kill().await;
        }
        outcome
    }
}

#[cfg(windows)]
fn push_command_arg(cmd: &mut Command, command: &str) {
    // cmd.exe does its own parsing; standard argument quoting would mangle it.
    cmd.raw_arg(command);
}

#[cfg(not(windows))]
fn push_command_arg(cmd: &mut Command, command: &str) {
    cmd.arg(command);
}

/// Read a stream to EOF, failing once more than `limit` bytes arrive.
async fn read_bounded<R>(reader: Option<R>, limit: usize) -> Result<Vec<u8>, ExecError>
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return Ok(Vec::new());
    };

    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).await.map_err(ExecError::Io)?;
        if n == 0 {
            return Ok(buf);
        }
        if buf.len() + n > limit {
            return Err(ExecError::OutputLimitExceeded { limit });
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::terminal::{CommandDialect, Platform, UnixDialect};
    use std::time::Duration;

    fn sh() -> ShellExecutor {
        let dialect = UnixDialect::new(Platform::Linux);
        ShellExecutor {
            shell: "/bin/sh".to_string(),
            shell_args: dialect.shell_args("/bin/sh"),
            cwd: std::env::temp_dir(),
            env: std::env::vars().collect(),
        }
    }

    #[tokio::test]
    async fn test_captures_stdout_and_exit_code() {
        let out = sh().execute("echo hello", &ExecOptions::default()).await.unwrap();
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.exit_code, 0);
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_not_an_error() {
        let out = sh()
            .execute("echo boom >&2; exit 3", &ExecOptions::default())
            .await
            .unwrap();
        assert_eq!(out.exit_code, 3);
        assert_eq!(out.combined(), "boom");
    }

    #[tokio::test]
    async fn test_times_out() {
        let opts = ExecOptions::default().with_timeout(Duration::from_millis(200));
        let err = sh().execute("sleep 5", &opts).await.unwrap_err();
        assert!(matches!(err, ExecError::TimedOut { .. }));
    }

    #[tokio::test]
    async fn test_output_over_max_buffer_fails() {
        let opts = ExecOptions::default().with_max_buffer(16);
        let err = sh()
            .execute("printf '%0100d' 0", &opts)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::OutputLimitExceeded { limit: 16 }));
    }

    #[tokio::test]
    async fn test_missing_shell_is_spawn_error() {
        let mut exec = sh();
        exec.shell = "/definitely/not/a/shell".to_string();
        let err = exec.execute("true", &ExecOptions::default()).await.unwrap_err();
        assert!(matches!(err, ExecError::Spawn(_)));
    }

    #[test]
    fn test_stderr_noise_is_filtered() {
        let stderr = "npm WARN old lockfile\nDeprecationWarning: x\nwarning: be careful\n> build\nreal error\n\n";
        assert_eq!(filter_stderr(stderr), "real error");
    }

    #[test]
    fn test_combined_joins_stdout_and_filtered_stderr() {
        let out = CommandOutput {
            stdout: "line one".to_string(),
            stderr: "notice: ignore me\nactual problem".to_string(),
            exit_code: 1,
        };
        assert_eq!(out.combined(), "line one\nactual problem");
    }
}
