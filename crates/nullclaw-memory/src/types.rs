use serde::{Deserialize, Serialize};

/// Which bucket a memory entry belongs to. Only `Core` is ever exported to
/// or hydrated from a snapshot file; the others exist for the broader
/// recall surface this crate's store backs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryCategory {
    Core,
    Daily,
    Conversation,
    Custom(String),
}

impl std::fmt::Display for MemoryCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Core => write!(f, "core"),
            Self::Daily => write!(f, "daily"),
            Self::Conversation => write!(f, "conversation"),
            Self::Custom(name) => write!(f, "custom:{name}"),
        }
    }
}

impl std::str::FromStr for MemoryCategory {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "core" => Self::Core,
            "daily" => Self::Daily,
            "conversation" => Self::Conversation,
            other => match other.strip_prefix("custom:") {
                Some(name) => Self::Custom(name.to_string()),
                None => Self::Custom(other.to_string()),
            },
        })
    }
}

/// A single stored memory entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// UUID v7 — time-sortable, used as the primary key.
    pub id: String,
    pub key: String,
    pub content: String,
    pub category: MemoryCategory,
    pub timestamp: String,
    pub session_id: Option<String>,
    pub relevance_score: Option<f64>,
}

/// One row of a `MEMORY_SNAPSHOT.json` export. Deliberately narrower than
/// [`MemoryEntry`] — the snapshot boundary only carries what §4.12 needs to
/// round-trip the `core` category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub key: String,
    pub content: String,
    pub category: String,
    pub timestamp: String,
}
