//! Per-platform command dialects.
//!
//! A new platform is supported by implementing `CommandDialect`, not by
//! branching inside the manager.

use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use regex::Regex;

use super::Platform;

/// How commands are spelled and launched on one platform family.
pub trait CommandDialect: Send + Sync {
    fn platform(&self) -> Platform;

    /// Shell used when a session does not name one.
    fn default_shell(&self) -> String;

    /// Arguments placed between the shell and the command string.
    fn shell_args(&self, shell: &str) -> Vec<&'static str>;

    /// Rewrite a command into this platform's form.
    fn normalize(&self, command: &str) -> String;

    /// Platform-specific additions to a new session's environment.
    fn extend_env(&self, _env: &mut HashMap<String, String>) {}

    /// Named command library (e.g. `network-info` → `ip addr`).
    fn command_library(&self) -> BTreeMap<&'static str, &'static str>;
}

/// Pick the dialect for a platform.
pub fn dialect_for(platform: Platform) -> Box<dyn CommandDialect> {
    match platform {
        Platform::Windows => Box::new(WindowsDialect),
        other => Box::new(UnixDialect::new(other)),
    }
}

/// POSIX shells on Linux, macOS and anything unrecognised.
#[derive(Debug, Clone, Copy)]
pub struct UnixDialect {
    platform: Platform,
}

impl UnixDialect {
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }
}

impl CommandDialect for UnixDialect {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn default_shell(&self) -> String {
        let env_shell = std::env::var("SHELL").ok().filter(|s| !s.is_empty());
        match self.platform {
            Platform::Linux => env_shell.unwrap_or_else(|| "/bin/bash".to_string()),
            Platform::Macos => env_shell.unwrap_or_else(|| "/bin/zsh".to_string()),
            _ => "/bin/sh".to_string(),
        }
    }

    fn shell_args(&self, _shell: &str) -> Vec<&'static str> {
        vec!["-c"]
    }

    /// Multi-line input becomes one `&&` chain; blank and `#` comment lines are dropped.
    fn normalize(&self, command: &str) -> String {
        command
            .trim()
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .collect::<Vec<_>>()
            .join(" && ")
    }

    fn command_library(&self) -> BTreeMap<&'static str, &'static str> {
        BTreeMap::from([
            ("sys-info", "uname -a"),
            ("whoami", "whoami"),
            ("hostname", "hostname"),
            ("env", "env"),
            ("list-files", "ls -la"),
            ("show-file", "cat {file}"),
            ("find-file", "find / -name \"{pattern}\" 2>/dev/null"),
            ("search-text", "grep -r \"{pattern}\" ."),
            ("network-info", "ifconfig || ip addr"),
            ("network-connections", "netstat -tulpn || ss -tulpn"),
            ("network-routes", "route -n || ip route"),
            ("arp-table", "arp -a"),
            ("list-processes", "ps aux"),
            ("kill-process", "kill -9 {pid}"),
            ("list-users", "cat /etc/passwd"),
            ("list-groups", "cat /etc/group"),
            ("current-user", "id"),
            (
                "list-services",
                "systemctl list-units --type=service || service --status-all",
            ),
            (
                "service-info",
                "systemctl status {service} || service {service} status",
            ),
        ])
    }
}

static SEPARATOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r";\s*").unwrap());

/// Unix command prefixes and their `cmd.exe` equivalents. Order matters:
/// only the first matching rule is applied.
const WINDOWS_TRANSLATIONS: &[(&str, &str)] = &[
    ("ls", "dir"),
    ("cat", "type"),
    ("rm", "del"),
    ("cp", "copy"),
    ("mv", "move"),
    ("pwd", "cd"),
    ("clear", "cls"),
    ("ps aux", "tasklist"),
    ("kill", "taskkill /PID"),
    ("which", "where"),
];

static TRANSLATION_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    WINDOWS_TRANSLATIONS
        .iter()
        .map(|(unix, win)| {
            let pattern = format!(r"(?i)^{}\b", regex::escape(unix));
            (Regex::new(&pattern).unwrap(), *win)
        })
        .collect()
});

/// `cmd.exe` on Windows.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowsDialect;

impl CommandDialect for WindowsDialect {
    fn platform(&self) -> Platform {
        Platform::Windows
    }

    fn default_shell(&self) -> String {
        std::env::var("ComSpec")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "cmd.exe".to_string())
    }

    fn shell_args(&self, shell: &str) -> Vec<&'static str> {
        let lower = shell.to_lowercase();
        if lower.contains("powershell") || lower.contains("pwsh") {
            vec!["-NoProfile", "-NonInteractive", "-Command"]
        } else {
            vec!["/d", "/s", "/c"]
        }
    }

    /// `;` separators become `&&`, then the first matching Unix prefix is translated.
    fn normalize(&self, command: &str) -> String {
        let chained = SEPARATOR.replace_all(command.trim(), " && ").into_owned();
        for (rule, replacement) in TRANSLATION_RULES.iter() {
            if rule.is_match(&chained) {
                return rule.replace(&chained, *replacement).into_owned();
            }
        }
        chained
    }

    fn extend_env(&self, env: &mut HashMap<String, String>) {
        env.insert(
            "PATHEXT".to_string(),
            ".COM;.EXE;.BAT;.CMD;.VBS;.VBE;.JS;.JSE;.WSF;.WSH;.MSC;.PY".to_string(),
        );
    }

    fn command_library(&self) -> BTreeMap<&'static str, &'static str> {
        BTreeMap::from([
            ("sys-info", "systeminfo"),
            ("whoami", "whoami"),
            ("hostname", "hostname"),
            ("env", "set"),
            ("list-files", "dir /a"),
            ("show-file", "type {file}"),
            ("find-file", "where /r . {pattern}"),
            ("search-text", "findstr /s /i \"{pattern}\" *.*"),
            ("network-info", "ipconfig /all"),
            ("network-connections", "netstat -ano"),
            ("network-routes", "route print"),
            ("arp-table", "arp -a"),
            ("list-processes", "tasklist /v"),
            ("kill-process", "taskkill /F /PID {pid}"),
            ("list-users", "net user"),
            ("list-groups", "net localgroup"),
            ("current-user", "whoami /all"),
            ("list-services", "sc query"),
            ("service-info", "sc qc {service}"),
            ("reg-query", "reg query {key}"),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_windows_translates_ls_and_separators() {
        let normalized = WindowsDialect.normalize("ls -la; whoami");
        assert_eq!(normalized, "dir -la && whoami");
    }

    #[test]
    fn test_windows_applies_only_first_rule() {
        assert_eq!(WindowsDialect.normalize("cat notes.txt; ls"), "type notes.txt && ls");
        assert_eq!(WindowsDialect.normalize("ps aux"), "tasklist");
        assert_eq!(WindowsDialect.normalize("kill 4242"), "taskkill /PID 4242");
        assert_eq!(WindowsDialect.normalize("WHICH python"), "where python");
    }

    #[test]
    fn test_windows_requires_word_boundary() {
        assert_eq!(WindowsDialect.normalize("lsblk"), "lsblk");
        assert_eq!(WindowsDialect.normalize("catalog.exe"), "catalog.exe");
        assert_eq!(WindowsDialect.normalize("  ipconfig /all  "), "ipconfig /all");
    }

    #[test]
    fn test_unix_drops_comments_and_blank_lines() {
        let dialect = UnixDialect::new(Platform::Linux);
        assert_eq!(dialect.normalize("# comment\nwhoami"), "whoami");
        assert_eq!(
            dialect.normalize("  id\n\n   # enumerate\n  uname -a  \n"),
            "id && uname -a"
        );
    }

    #[test]
    fn test_unix_keeps_single_line_unchanged() {
        let dialect = UnixDialect::new(Platform::Macos);
        assert_eq!(
            dialect.normalize("find / -perm -4000 2>/dev/null | head -20"),
            "find / -perm -4000 2>/dev/null | head -20"
        );
    }

    #[test]
    fn test_shell_args_follow_shell_kind() {
        assert_eq!(WindowsDialect.shell_args("cmd.exe"), vec!["/d", "/s", "/c"]);
        assert_eq!(
            WindowsDialect.shell_args("C:\\Program Files\\PowerShell\\7\\pwsh.exe"),
            vec!["-NoProfile", "-NonInteractive", "-Command"]
        );
        assert_eq!(UnixDialect::new(Platform::Linux).shell_args("/bin/bash"), vec!["-c"]);
    }

    #[test]
    fn test_windows_env_gets_pathext() {
        let mut env = HashMap::new();
        WindowsDialect.extend_env(&mut env);
        assert!(env["PATHEXT"].contains(".EXE"));
    }

    #[test]
    fn test_libraries_share_core_names() {
        let unix = UnixDialect::new(Platform::Linux).command_library();
        let windows = WindowsDialect.command_library();
        for name in ["sys-info", "network-info", "list-processes", "current-user"] {
            assert!(unix.contains_key(name));
            assert!(windows.contains_key(name));
        }
        assert_eq!(dialect_for(Platform::Windows).platform(), Platform::Windows);
        assert_eq!(dialect_for(Platform::Unknown).default_shell(), "/bin/sh");
    }
}
