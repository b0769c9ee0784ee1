//! Markdown session reports.

use std::fmt::Write;

use chrono::{DateTime, Utc};

use super::{ForgeSession, Severity, findings::excerpt};

fn timestamp(at: Option<DateTime<Utc>>) -> String {
    at.map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "N/A".to_string())
}

/// Render the session as it stands now. Valid at any point in its lifecycle.
pub fn render_report(session: &ForgeSession) -> String {
    let mut out = String::new();

    // Writing into a String cannot fail.
    let _ = writeln!(out, "# Forge Security Assessment Report\n");

    let _ = writeln!(out, "## Session Information\n");
    let _ = writeln!(out, "- **Session ID:** {}", session.id);
    let _ = writeln!(out, "- **Target:** {} ({})", session.target_name, session.target_host);
    let _ = writeln!(out, "- **Target ID:** {}", session.target_id);
    let _ = writeln!(out, "- **Status:** {}", session.status);
    let _ = writeln!(out, "- **Started:** {}", session.started_at.to_rfc3339());
    let _ = writeln!(out, "- **Completed:** {}", timestamp(session.completed_at));
    let _ = writeln!(out, "- **Terminal Sessions:** {}\n", session.terminal_sessions.len());

    let _ = writeln!(out, "## Findings Summary\n");
    let _ = writeln!(out, "- **Total Findings:** {}", session.findings.len());
    for (severity, count) in session.findings_by_severity() {
        let _ = writeln!(out, "- {} **{}:** {}", severity.emoji(), capitalize(severity), count);
    }
    out.push('\n');

    let _ = writeln!(out, "## Detailed Findings\n");
    if session.findings.is_empty() {
        let _ = writeln!(out, "_No findings._\n");
    }
    let mut findings: Vec<_> = session.findings.iter().collect();
    findings.sort_by_key(|f| f.severity);
    for finding in findings {
        let _ = writeln!(
            out,
            "### {} [{}]\n",
            finding.title,
            finding.severity.to_string().to_uppercase()
        );
        let _ = writeln!(out, "- **Type:** {}", finding.category);
        let _ = writeln!(out, "- **Phase:** {}", finding.phase);
        let _ = writeln!(out, "- **Discovered:** {}", finding.discovered_at.to_rfc3339());
        let _ = writeln!(out, "- **Description:** {}\n", finding.description);
        if !finding.evidence.is_empty() {
            let _ = writeln!(out, "**Evidence:**\n\n```\n{}\n```\n", excerpt(&finding.evidence));
        }
    }

    let _ = writeln!(out, "## Phase Details\n");
    for phase in &session.phases {
        let _ = writeln!(out, "### {} ({})\n", phase.name, phase.id);
        let _ = writeln!(out, "- **Status:** {}", phase.status);
        let _ = writeln!(
            out,
            "- **Commands Executed:** {}/{}",
            phase.results.len(),
            phase.commands.len()
        );
        let _ = writeln!(out, "- **Started:** {}", timestamp(phase.started_at));
        let _ = writeln!(out, "- **Completed:** {}\n", timestamp(phase.completed_at));
    }

    if !session.errors.is_empty() {
        let _ = writeln!(out, "## Errors\n");
        for error in &session.errors {
            let _ = writeln!(out, "- {}", error);
        }
    }

    out
}

fn capitalize(severity: Severity) -> String {
    let s = severity.to_string();
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
