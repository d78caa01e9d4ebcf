//! Thin wrapper binding [`CliProvider`] to OpenAI's hosted Codex CLI variant,
//! distinct from the local `codex-cli` binary in its default command name.

use crate::cli::CliProvider;

pub fn new(command: impl Into<String>) -> CliProvider {
    CliProvider::new("openai-codex", command, vec![])
}
