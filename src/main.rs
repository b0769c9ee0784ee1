use anyhow::Result;
use ale_forge::logging::{LogFormat, init_logging};
use ale_forge::target::TargetOs;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "ale-forge")]
#[command(version, about = "Authorized-target assessment orchestrator")]
pub struct Cli {
    /// Log at debug level unless ALE_FORGE_LOG or RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Directory holding forge.toml and target records (default: .ale-forge)
    #[arg(long, global = true, env = "ALE_FORGE_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Log output format: text or json
    #[arg(long, global = true, default_value = "text")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage authorized targets
    Target {
        #[command(subcommand)]
        command: TargetCommands,
    },
    /// Run assessment sessions
    Session {
        #[command(subcommand)]
        command: SessionCommands,
    },
    /// Run one command locally through the platform dialect
    Exec {
        /// Shell overriding the configured default
        #[arg(long)]
        shell: Option<String>,
        /// Timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Command to run; words are joined with spaces
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Inspect the local platform
    Platform {
        #[command(subcommand)]
        command: PlatformCommands,
    },
    /// View, validate or create configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
pub enum TargetCommands {
    /// Register a target (requires --authorized and an authorization document)
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        host: String,
        #[arg(long)]
        port: Option<u16>,
        /// windows, linux, macos or unknown
        #[arg(long, default_value = "unknown")]
        os: TargetOs,
        /// Confirm written authorization exists for this target
        #[arg(long)]
        authorized: bool,
        /// Path or reference of the signed authorization
        #[arg(long)]
        authorization_document: Option<String>,
        #[arg(long)]
        authorized_by: Option<String>,
        #[arg(long)]
        scope: Vec<String>,
        #[arg(long)]
        out_of_scope: Vec<String>,
        #[arg(long, default_value = "")]
        notes: String,
    },
    /// List registered targets
    List,
    /// Show one target as JSON
    Show { id: String },
    /// Check whether a host may be acted upon
    Validate { host: String },
    /// Re-authorize a target under a new document
    Authorize {
        id: String,
        #[arg(long)]
        document: String,
        #[arg(long)]
        by: String,
    },
    /// Withdraw a target's authorization
    Revoke {
        id: String,
        #[arg(long)]
        reason: String,
    },
    /// Delete a target record
    Delete { id: String },
    /// Export all targets as JSON (stdout when no file is given)
    Export { file: Option<PathBuf> },
    /// Import targets from an exported JSON file
    Import { file: PathBuf },
    /// Print a blank authorization form
    Template {
        #[arg(long)]
        host: String,
        #[arg(long)]
        name: String,
    },
    /// List identifiers this machine answers to
    SelfIds,
}

#[derive(Subcommand)]
pub enum SessionCommands {
    /// Run a session against a registered target and print its report
    Run {
        target_id: String,
        /// Add exploit phases (ignored while safe mode is on)
        #[arg(long)]
        auto_exploit: bool,
        /// Turn safe mode off
        #[arg(long = "unsafe")]
        unsafe_mode: bool,
        /// Only run these phases (repeatable)
        #[arg(long)]
        phase: Vec<String>,
        /// Per-command timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
        #[arg(long)]
        max_terminals: Option<usize>,
        /// Write the report here instead of stdout
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum PlatformCommands {
    /// Platform, shell, hostname and OS version
    Info,
    /// Named command library for this platform
    Commands,
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate forge.toml and report warnings
    Validate,
    /// Write a default forge.toml
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format);

    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(ale_forge::config::DEFAULT_DATA_DIR));

    match &cli.command {
        Commands::Target { command } => cmd::cmd_target(&data_dir, command)?,
        Commands::Session { command } => match command {
            SessionCommands::Run { .. } => cmd::cmd_session_run(&cli, &data_dir, command).await?,
        },
        Commands::Exec {
            shell,
            timeout,
            command,
        } => {
            let code = cmd::cmd_exec(&data_dir, shell.as_deref(), *timeout, command).await?;
            if code != 0 {
                std::process::exit(code);
            }
        }
        Commands::Platform { command } => cmd::cmd_platform(command)?,
        Commands::Config { command } => cmd::cmd_config(&data_dir, command.clone())?,
    }

    Ok(())
}
