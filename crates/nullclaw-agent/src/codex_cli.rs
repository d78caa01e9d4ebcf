//! Thin wrapper binding [`CliProvider`] to the OpenAI Codex CLI.

use crate::cli::CliProvider;

pub fn new(command: impl Into<String>) -> CliProvider {
    CliProvider::new("codex-cli", command, vec![])
}
