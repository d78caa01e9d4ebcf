//! Thin wrapper binding [`CliProvider`] to the Claude Code CLI.

use crate::cli::CliProvider;

pub fn new(command: impl Into<String>) -> CliProvider {
    CliProvider::new("claude-cli", command, vec!["--no-session-persistence".to_string()])
}
