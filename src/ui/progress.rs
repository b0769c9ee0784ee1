use crate::forge::{ForgeSession, PhaseStatus, SessionStatus};
use crate::ui::icons::{CHECK, CROSS, RUNNING, SEARCH, STOP};
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

/// Terminal UI for a running forge session, rendered via `indicatif` progress bars.
///
/// Two bars are stacked vertically:
/// - Phase bar: how many phases have finished
/// - Command spinner: the running phase, its command count and findings so far
///
/// The UI holds no session state of its own; callers poll the orchestrator
/// and pass each snapshot to [`Self::update`].
pub struct SessionUI {
    multi: MultiProgress,
    phase_bar: ProgressBar,
    command_bar: ProgressBar,
    verbose: bool,
    announced: Vec<PhaseStatus>,
}

impl SessionUI {
    pub fn new(total_phases: u64, verbose: bool) -> Self {
        let multi = MultiProgress::new();

        let phase_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .expect("progress bar template is a valid static string")
            .progress_chars("█▓▒░");

        let phase_bar = multi.add(ProgressBar::new(total_phases));
        phase_bar.set_style(phase_style);
        phase_bar.set_prefix("Phases");

        let command_style = ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {msg}")
            .expect("progress bar template is a valid static string");

        let command_bar = multi.add(ProgressBar::new_spinner());
        command_bar.set_style(command_style);
        command_bar.set_prefix("   Cmd");
        command_bar.enable_steady_tick(Duration::from_millis(100));

        Self {
            multi,
            phase_bar,
            command_bar,
            verbose,
            announced: vec![PhaseStatus::Pending; total_phases as usize],
        }
    }

    /// Print a line via `MultiProgress`, falling back to `eprintln!` if the rich UI fails.
    fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    /// Refresh both bars from a session snapshot, printing one line per phase transition.
    pub fn update(&mut self, session: &ForgeSession) {
        let finished = session
            .phases
            .iter()
            .filter(|p| p.status.is_terminal())
            .count();
        self.phase_bar.set_position(finished as u64);

        for (index, phase) in session.phases.iter().enumerate() {
            let Some(seen) = self.announced.get_mut(index) else {
                continue;
            };
            if *seen == phase.status {
                continue;
            }
            *seen = phase.status;
            let line = match phase.status {
                PhaseStatus::Running => Some(format!(
                    "{}{} {}",
                    RUNNING,
                    style(&phase.name).bold(),
                    style(format!("({} commands)", phase.commands.len())).dim()
                )),
                PhaseStatus::Completed => Some(format!("{}{} completed", CHECK, phase.name)),
                PhaseStatus::Failed => Some(format!("{}{} failed", CROSS, style(&phase.name).red())),
                PhaseStatus::Pending => None,
            };
            if let Some(line) = line {
                self.print_line(line);
            }
        }

        if let Some(phase) = session.phases.get(session.current_phase) {
            self.phase_bar
                .set_message(format!("{}: {}", style(&phase.id).yellow(), phase.name));
            let detail = match phase.results.last() {
                Some(last) if self.verbose => {
                    format!("(last: {} → exit {})", last.command, last.result.exit_code)
                }
                _ => format!("{}{} findings", SEARCH, session.findings.len()),
            };
            self.command_bar.set_message(format!(
                "{}/{} commands {}",
                style(phase.results.len()).cyan(),
                phase.commands.len(),
                style(detail).dim()
            ));
        }
    }

    /// Clear the bars and print the final status line.
    pub fn finish(&self, session: &ForgeSession) {
        self.command_bar.finish_and_clear();
        self.phase_bar.finish_and_clear();
        let icon = match session.status {
            SessionStatus::Completed => CHECK,
            SessionStatus::Aborted => STOP,
            _ => CROSS,
        };
        self.print_line(format!(
            "{}Session {} {} with {} findings",
            icon,
            style(&session.id).dim(),
            session.status,
            style(session.findings.len()).bold()
        ));
    }
}
