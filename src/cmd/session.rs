//! Assessment session command: `ale-forge session run`.

use anyhow::{Context, Result};
use console::style;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use ale_forge::forge::{PhaseOrchestrator, SessionStatus};
use ale_forge::ui::SessionUI;
use ale_forge::ui::icons::{REPORT, STOP, TARGET, WARN};

use super::super::{Cli, SessionCommands};
use super::{load_config, open_registry, terminal_manager};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

pub async fn cmd_session_run(cli: &Cli, data_dir: &Path, command: &SessionCommands) -> Result<()> {
    let SessionCommands::Run {
        target_id,
        auto_exploit,
        unsafe_mode,
        phase,
        timeout,
        max_terminals,
        report,
    } = command;

    let config = load_config(data_dir)?;
    let registry = open_registry(&config)?;
    let terminals = Arc::new(terminal_manager(&config, None));
    let orchestrator =
        PhaseOrchestrator::new(registry, terminals).with_exec_options(config.exec_options());

    // CLI flags override file and environment.
    let mut session_config = config.session_config(target_id);
    if *auto_exploit {
        session_config.auto_exploit = true;
    }
    if *unsafe_mode {
        session_config.safe_mode = false;
    }
    if !phase.is_empty() {
        session_config.phases = Some(phase.clone());
    }
    if let Some(secs) = timeout {
        session_config = session_config.with_timeout(Duration::from_secs(*secs));
    }
    if let Some(max) = max_terminals {
        session_config.max_terminals = *max;
    }
    if session_config.auto_exploit && session_config.safe_mode {
        eprintln!(
            "{}{}",
            WARN,
            style("--auto-exploit has no effect while safe mode is on").yellow()
        );
    }

    let session = orchestrator.start_session(session_config)?;
    eprintln!(
        "{}Session {} against {} ({}), {} phase(s)",
        TARGET,
        style(&session.id).bold(),
        session.target_name,
        session.target_host,
        session.phases.len()
    );

    let mut ui = SessionUI::new(session.phases.len() as u64, cli.verbose);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    let finished = loop {
        tokio::select! {
            signal = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                if let Err(e) = signal {
                    warn!(error = %e, "failed to listen for Ctrl-C");
                } else {
                    eprintln!("{}Aborting after the current command...", STOP);
                    orchestrator.abort_session(&session.id);
                }
            }
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
        }

        let current = orchestrator.get_session(&session.id)?;
        ui.update(&current);
        if current.status.is_terminal() {
            break current;
        }
    };
    ui.finish(&finished);

    let rendered = orchestrator.generate_report(&finished.id)?;
    match report {
        Some(path) => {
            std::fs::write(path, &rendered)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            eprintln!("{}Report written to {}", REPORT, path.display());
        }
        None => println!("{}", rendered),
    }

    match finished.status {
        SessionStatus::Aborted => anyhow::bail!("Session {} was aborted", finished.id),
        SessionStatus::Failed => anyhow::bail!("Session {} failed", finished.id),
        _ => Ok(()),
    }
}
