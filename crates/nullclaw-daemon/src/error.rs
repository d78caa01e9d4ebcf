use thiserror::Error;

/// Top-level daemon error taxonomy, covering failures that can surface
/// before any component-specific error classification applies (startup,
/// state-file I/O at the orchestrator level).
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("startup failed: {0}")]
    Startup(String),

    #[error("state I/O error: {0}")]
    StateIo(#[from] nullclaw_core::error::NullclawError),
}

impl DaemonError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Startup(_) => "policy",
            Self::StateIo(_) => "state_io",
        }
    }
}
