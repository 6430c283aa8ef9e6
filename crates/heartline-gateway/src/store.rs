//! SQLite heartbeat history.

use std::path::Path;

use heartline_core::HeartbeatRecord;
use rusqlite::{Connection, OptionalExtension, Result, Row, params};

/// SQLite-backed store of every accepted heartbeat sample.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) a database at the given filesystem path and run migrations.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    /// Open an in-memory database. Useful for testing.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS heartbeat (
                id        INTEGER PRIMARY KEY AUTOINCREMENT,
                bpm       REAL NOT NULL,
                timestamp INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS heartbeat_timestamp ON heartbeat (timestamp);",
        )?;
        Ok(())
    }

    /// Append a sample and return the stored row.
    pub fn insert(&self, bpm: f64, timestamp: i64) -> Result<HeartbeatRecord> {
        self.conn.execute(
            "INSERT INTO heartbeat (bpm, timestamp) VALUES (?1, ?2)",
            params![bpm, timestamp],
        )?;
        Ok(HeartbeatRecord {
            id: self.conn.last_insert_rowid(),
            bpm,
            timestamp,
        })
    }

    /// The newest sample by timestamp, if any.
    pub fn latest(&self) -> Result<Option<HeartbeatRecord>> {
        self.conn
            .query_row(
                "SELECT id, bpm, timestamp FROM heartbeat
                 ORDER BY timestamp DESC, id DESC
                 LIMIT 1",
                [],
                record_from_row,
            )
            .optional()
    }

    /// Up to `limit` samples, newest first.
    pub fn recent(&self, limit: u32) -> Result<Vec<HeartbeatRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, bpm, timestamp FROM heartbeat
             ORDER BY timestamp DESC, id DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], record_from_row)?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }
}

fn record_from_row(row: &Row<'_>) -> Result<HeartbeatRecord> {
    Ok(HeartbeatRecord {
        id: row.get(0)?,
        bpm: row.get(1)?,
        timestamp: row.get(2)?,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
