//! Command guard: a syntactic deny list checked before any process starts.
//!
//! Only the first whitespace-delimited token is inspected (or, for an
//! interpreter invoked with a run-this-string flag, the first token of the
//! wrapped command). Shell grammar is not parsed, so quoting tricks, paths
//! like `/bin/rm`, `env rm` or command chains (`ls; rm x`) get through.
//! This is a known limitation of the guard, not a sandbox.

/// Commands that are never started, compared against the lower-cased first token.
const BLOCKED_COMMANDS: &[&str] = &[
    "rm", "rmdir", "del", "erase", "rd", "format", "mkfs", "dd", "chmod", "chown", "sudo",
    "shutdown", "reboot",
];

/// Interpreters that run their argument as another command.
const WRAPPERS: &[&str] = &[
    "sh",
    "bash",
    "zsh",
    "dash",
    "cmd",
    "cmd.exe",
    "powershell",
    "powershell.exe",
    "pwsh",
];

/// Flags that tell a wrapper to execute the following string.
const WRAPPER_FLAGS: &[&str] = &["-c", "/c", "/k", "-command"];

/// Returns `true` if the command may run.
pub fn validate(command: &str) -> bool {
    match target_token(command) {
        Some(token) => !is_blocked(&token),
        None => true,
    }
}

/// The token the deny list is checked against.
fn target_token(command: &str) -> Option<String> {
    let mut tokens = command.split_whitespace();
    let first = normalize(tokens.next()?);

    if WRAPPERS.contains(&first.as_str()) {
        let has_flag = tokens
            .next()
            .is_some_and(|flag| WRAPPER_FLAGS.contains(&flag.to_lowercase().as_str()));
        if has_flag {
            // `sh -c` with nothing after it has no wrapped command to check
            return Some(tokens.next().map(normalize).unwrap_or(first));
        }
    }

    Some(first)
}

fn normalize(token: &str) -> String {
    token
        .trim_matches(|c| c == '"' || c == '\'')
        .to_lowercase()
}

fn is_blocked(token: &str) -> bool {
    BLOCKED_COMMANDS.contains(&token)
        // mkfs.ext4, mkfs.vfat, ...
        || token.starts_with("mkfs.")
}
