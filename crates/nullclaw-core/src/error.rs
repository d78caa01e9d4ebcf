use thiserror::Error;

use crate::scrubber::sanitize_api_error;

/// Crate-wide error taxonomy. Every variant maps to one of the kinds in the
/// propagation policy: credentials, transient, malformed, policy, channel,
/// bus-closed, state I/O.
#[derive(Debug, Error)]
pub enum NullclawError {
    #[error("credentials error: {0}")]
    Credentials(String),

    #[error("transient error: {0}")]
    Transient(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("policy violation: {0}")]
    Policy(String),

    #[error("channel error ({channel}): {reason}")]
    Channel { channel: String, reason: String },

    #[error("bus closed")]
    BusClosed,

    #[error("state I/O error: {0}")]
    StateIo(String),
}

impl NullclawError {
    /// Short code for structured logging and `daemon_state.json` `last_error` fields.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Credentials(_) => "CREDENTIALS",
            Self::Transient(_) => "TRANSIENT",
            Self::Malformed(_) => "MALFORMED",
            Self::Policy(_) => "POLICY",
            Self::Channel { .. } => "CHANNEL",
            Self::BusClosed => "BUS_CLOSED",
            Self::StateIo(_) => "STATE_IO",
        }
    }

    /// Whether a fresh attempt of the same operation might succeed.
    pub fn retriable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Message with any credential-shaped substrings redacted and truncated
    /// to the bound every user-visible error must respect.
    pub fn scrubbed(&self) -> String {
        sanitize_api_error(&self.to_string())
    }
}

impl From<std::io::Error> for NullclawError {
    fn from(e: std::io::Error) -> Self {
        Self::StateIo(e.to_string())
    }
}

impl From<serde_json::Error> for NullclawError {
    fn from(e: serde_json::Error) -> Self {
        Self::Malformed(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, NullclawError>;
