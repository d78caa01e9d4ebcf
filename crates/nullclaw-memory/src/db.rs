use rusqlite::{Connection, Result};

/// Initialise the memory schema. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS memory_entries (
            id              TEXT NOT NULL PRIMARY KEY,
            key             TEXT NOT NULL,
            content         TEXT NOT NULL,
            category        TEXT NOT NULL,
            timestamp       TEXT NOT NULL,
            session_id      TEXT,
            relevance_score REAL
        ) STRICT;
        CREATE INDEX IF NOT EXISTS idx_memory_category ON memory_entries(category);",
    )
}
