use thiserror::Error;

/// Errors that can occur within any channel adapter or the dispatcher. Maps
/// onto the crate-wide kind taxonomy (credentials, transient, malformed,
/// policy, channel, bus-closed, state I/O): `AuthFailed` is credentials,
/// `ConnectionFailed`/`Timeout` are transient, `Malformed` and `StateIo` are
/// their own kinds, and `SendFailed`/`ConfigError` are channel-specific
/// variants of the generic `Channel` kind.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("operation timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("channel error: {0}")]
    Channel(String),

    #[error("state I/O error: {0}")]
    StateIo(String),
}

impl ChannelError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConnectionFailed(_) => "connection_failed",
            Self::SendFailed(_) => "send_failed",
            Self::AuthFailed(_) => "auth_failed",
            Self::Timeout { .. } => "timeout",
            Self::ConfigError(_) => "config_error",
            Self::Malformed(_) => "malformed",
            Self::Channel(_) => "channel",
            Self::StateIo(_) => "state_io",
        }
    }
}
