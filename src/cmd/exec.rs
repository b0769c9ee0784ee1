//! Local execution and platform commands: `ale-forge exec`, `ale-forge platform`.

use anyhow::Result;
use console::style;
use std::path::Path;
use std::time::Duration;

use ale_forge::terminal::TerminalManager;

use super::super::PlatformCommands;
use super::{load_config, terminal_manager};

/// Run one command and echo its output. Returns the command's exit code.
pub async fn cmd_exec(
    data_dir: &Path,
    shell: Option<&str>,
    timeout: Option<u64>,
    command: &[String],
) -> Result<i32> {
    let config = load_config(data_dir)?;
    let manager = terminal_manager(&config, shell);

    let mut options = config.exec_options();
    if let Some(secs) = timeout {
        options = options.with_timeout(Duration::from_secs(secs));
    }

    let session_id = manager.create_session(None, None);
    let result = manager
        .execute_command(&session_id, &command.join(" "), &options)
        .await?;

    if !result.output.is_empty() {
        println!("{}", result.output);
    }
    tracing::debug!(exit_code = result.exit_code, duration_ms = result.duration_ms, "command finished");
    Ok(result.exit_code)
}

pub fn cmd_platform(command: &PlatformCommands) -> Result<()> {
    let manager = TerminalManager::new();

    match command {
        PlatformCommands::Info => {
            let info = manager.get_platform_info();
            println!();
            println!("Platform:      {}", style(info.platform).bold());
            println!("Default shell: {}", info.default_shell);
            println!("Hostname:      {}", info.hostname);
            println!("Architecture:  {}", info.arch);
            println!("OS version:    {}", info.os_version);
            println!();
        }
        PlatformCommands::Commands => {
            println!();
            println!("{:<22} Command", "Name");
            println!("{:<22} -------", "-".repeat(22));
            for (name, command) in manager.get_platform_commands() {
                println!("{:<22} {}", name, command);
            }
            println!();
        }
    }

    Ok(())
}
