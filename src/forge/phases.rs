//! Phase list construction.

use super::ForgePhase;
use crate::target::TargetOs;

/// Every phase id a session can contain, in execution order.
pub const KNOWN_PHASE_IDS: &[&str] = &["recon", "scan", "exploit", "post-exploit"];

const UNIX_RECON: &[&str] = &[
    "uname -a",
    "whoami",
    "id",
    "hostname",
    "ip addr || ifconfig",
    "netstat -tulpn || ss -tulpn",
    "ps aux",
    "cat /etc/passwd",
    "cat /etc/os-release",
    "ls -la /home",
    "find / -perm -4000 2>/dev/null | head -20",
];

const WINDOWS_RECON: &[&str] = &[
    "systeminfo",
    "whoami /all",
    "ipconfig /all",
    "netstat -ano",
    "tasklist /v",
    "net user",
    "net localgroup administrators",
    "sc query",
    r"reg query HKLM\Software\Microsoft\Windows\CurrentVersion",
];

const UNIX_SCAN: &[&str] = &[
    "dpkg -l || rpm -qa",
    r#"find /etc -name "*.conf" 2>/dev/null"#,
    r#"grep -r "password" /etc 2>/dev/null | head -20"#,
    "cat /etc/crontab",
    "find / -writable -type f 2>/dev/null | head -20",
    "ss -tulpn || netstat -tulpn",
];

const WINDOWS_SCAN: &[&str] = &[
    "wmic qfe list",
    r"reg query HKLM\SOFTWARE\Microsoft\Windows\CurrentVersion\Uninstall",
    r"dir /s /b C:\*.config",
    "findstr /si password *.txt *.xml *.ini *.config 2>nul",
    "cmdkey /list",
    "schtasks /query /fo LIST /v",
];

fn commands(list: &[&str]) -> Vec<String> {
    list.iter().map(|c| c.to_string()).collect()
}

/// Build the phase list for a target.
///
/// `recon` and `scan` are always present. `exploit` and `post-exploit` are
/// added only when `auto_exploit` is set and `safe_mode` is not; safe mode
/// wins over everything else.
pub fn build_phases(os: TargetOs, auto_exploit: bool, safe_mode: bool) -> Vec<ForgePhase> {
    let windows = os == TargetOs::Windows;

    let mut phases = vec![
        ForgePhase::new(
            "recon",
            "Reconnaissance",
            "Gather information about target system",
            commands(if windows { WINDOWS_RECON } else { UNIX_RECON }),
        ),
        ForgePhase::new(
            "scan",
            "Vulnerability Scanning",
            "Identify vulnerabilities and misconfigurations",
            commands(if windows { WINDOWS_SCAN } else { UNIX_SCAN }),
        ),
    ];

    if auto_exploit && !safe_mode {
        phases.push(ForgePhase::new(
            "exploit",
            "Exploitation",
            "Attempt to exploit discovered vulnerabilities",
            Vec::new(),
        ));
        phases.push(ForgePhase::new(
            "post-exploit",
            "Post-Exploitation",
            "Maintain access and gather additional information",
            Vec::new(),
        ));
    }

    phases
}

/// Keep only the phases named in `allow`, preserving build order.
pub fn filter_phases(phases: Vec<ForgePhase>, allow: Option<&[String]>) -> Vec<ForgePhase> {
    match allow {
        Some(ids) => phases
            .into_iter()
            .filter(|p| ids.iter().any(|id| id == &p.id))
            .collect(),
        None => phases,
    }
}
