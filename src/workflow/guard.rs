//! Rejects destructive commands before they reach the shell.

use regex::Regex;
use std::sync::LazyLock;

static RECURSIVE_FORCED_RM: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\brm\s+.*-[a-zA-Z]*r[a-zA-Z]*f",
        r"\brm\s+.*-[a-zA-Z]*f[a-zA-Z]*r",
        r"\brm\s+--recursive\s+--force",
        r"\brm\s+--force\s+--recursive",
        r"\brm\s+-r\s+.*-f",
        r"\brm\s+-f\s+.*-r",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

static DANGEROUS_TARGETS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\s+/$",
        r"\s+/\*",
        r"\s+~$",
        r"\s+~/",
        r"\s+\$HOME",
        r"\s+\.\.$",
        r"\s+\.\.\s+",
        r"\s+\.\./",
        r"\s+\*$",
        r"\s+\.$",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Why a command was refused, or `None` if it may run.
pub fn check_command(command: &str) -> Option<String> {
    let command = command.trim();
    let recursive = RECURSIVE_FORCED_RM.iter().any(|re| re.is_match(command));
    if !recursive {
        return None;
    }
    DANGEROUS_TARGETS
        .iter()
        .any(|re| re.is_match(command))
        .then(|| format!("refusing destructive command: {}", command))
}
