use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("memory not found: {category}/{key}")]
    NotFound { category: String, key: String },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("snapshot I/O error: {0}")]
    SnapshotIo(String),
}

impl MemoryError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Database(_) => "state_io",
            Self::NotFound { .. } => "malformed",
            Self::Serialization(_) => "malformed",
            Self::SnapshotIo(_) => "state_io",
        }
    }
}
