use serde::{Deserialize, Serialize};

/// A message received from an external channel (Telegram, Discord, WebChat, …).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub channel: String,
    pub sender_id: String,
    pub sender_name: Option<String>,
    pub content: String,
    pub timestamp: String,
    pub raw_payload: Option<serde_json::Value>,
}

/// Runtime connection state of a channel adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    Connected,
    Connecting,
    Disconnected,
    Error(String),
}
