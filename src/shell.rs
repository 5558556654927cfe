//! Interpreter selection. Kept apart from the engine because it depends on
//! the filesystem of the host.

use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::debug;

use crate::job::ShellHint;

/// Candidate install paths for the alternate interpreter, probed in order.
#[cfg(not(windows))]
const ALTERNATE_CANDIDATES: &[&str] = &[
    "/bin/bash",
    "/usr/bin/bash",
    "/usr/local/bin/bash",
    "/opt/homebrew/bin/bash",
];

#[cfg(windows)]
const ALTERNATE_CANDIDATES: &[&str] = &[
    r"C:\Program Files\Git\bin\bash.exe",
    r"C:\Program Files (x86)\Git\bin\bash.exe",
    r"C:\Program Files\Git\usr\bin\bash.exe",
];

/// Finds an executable for a shell hint. `None` means "use the default shell".
pub trait ShellResolver: Send + Sync {
    fn resolve(&self, hint: ShellHint) -> Option<PathBuf>;
}

/// Resolves the alternate interpreter by probing a fixed list of paths.
#[derive(Debug, Clone)]
pub struct CandidateResolver {
    candidates: Vec<PathBuf>,
}

impl Default for CandidateResolver {
    fn default() -> Self {
        Self::new(ALTERNATE_CANDIDATES.iter().map(PathBuf::from).collect())
    }
}

impl CandidateResolver {
    pub fn new(candidates: Vec<PathBuf>) -> Self {
        Self { candidates }
    }
}

impl ShellResolver for CandidateResolver {
    fn resolve(&self, hint: ShellHint) -> Option<PathBuf> {
        match hint {
            ShellHint::Default => None,
            ShellHint::Alternate => self.candidates.iter().find(|p| p.is_file()).cloned(),
        }
    }
}

/// Always uses the default shell.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultOnly;

impl ShellResolver for DefaultOnly {
    fn resolve(&self, _hint: ShellHint) -> Option<PathBuf> {
        None
    }
}

/// Build the process invocation for `command`. The caller's environment is
/// inherited; the host interpreter does all parsing and escaping.
pub fn build_command(command: &str, hint: ShellHint, resolver: &dyn ShellResolver) -> Command {
    match resolver.resolve(hint) {
        Some(path) => {
            debug!(shell = %path.display(), "using alternate interpreter");
            interpreter(&path, command)
        }
        None => default_shell(command),
    }
}

fn interpreter(path: &Path, command: &str) -> Command {
    let mut cmd = Command::new(path);
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(not(windows))]
fn default_shell(command: &str) -> Command {
    interpreter(Path::new("sh"), command)
}

#[cfg(windows)]
fn default_shell(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}
