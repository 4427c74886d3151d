use anyhow::Result;
use chrono::{DateTime, FixedOffset};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::{error, info};
use uuid::Uuid;

use crate::types::{CaptureRecord, UploadState};

/// One finished capture cycle as kept in the local journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub cycle_id: Uuid,
    pub captured_at: DateTime<FixedOffset>,
    pub path: Option<String>,
    pub bytes: usize,
    pub outcome: String,
    pub error: Option<String>,
}

/// Local SQLite log of capture outcomes. Lets a restarted node know when it
/// last delivered a photo.
pub struct CaptureJournal {
    conn: Connection,
}

impl CaptureJournal {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Initializing capture journal at {}", path.display());
        Self::init(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS captures (
                id INTEGER PRIMARY KEY,
                cycle_id TEXT NOT NULL,
                captured_at TEXT NOT NULL,
                path TEXT,
                bytes INTEGER NOT NULL,
                outcome TEXT NOT NULL,
                error TEXT
            )",
            [],
        )?;
        Ok(Self { conn })
    }

    pub fn record(&self, cycle_id: Uuid, record: &CaptureRecord, path: Option<&str>) -> Result<()> {
        let (outcome, error) = match &record.upload_state {
            UploadState::Pending => ("pending", None),
            UploadState::Uploaded => ("uploaded", None),
            UploadState::Failed(reason) => ("failed", Some(reason.as_str())),
        };
        info!(
            cycle_id = %cycle_id,
            captured_at = %record.timestamp,
            bytes = record.payload.len(),
            outcome,
            "Journaling capture"
        );
        self.conn.execute(
            "INSERT INTO captures (cycle_id, captured_at, path, bytes, outcome, error) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                cycle_id.to_string(),
                record.timestamp.to_rfc3339(),
                path,
                record.payload.len() as i64,
                outcome,
                error,
            ],
        )?;
        Ok(())
    }

    /// Timestamp of the most recent capture that reached the remote.
    pub fn last_uploaded(&self) -> Result<Option<DateTime<FixedOffset>>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT captured_at FROM captures WHERE outcome = 'uploaded' ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(raw.map(|s| DateTime::parse_from_rfc3339(&s)).transpose()?)
    }

    pub fn recent(&self, limit: u32) -> Result<Vec<JournalEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT cycle_id, captured_at, path, bytes, outcome, error FROM captures ORDER BY id DESC LIMIT ?",
        )?;
        let rows = stmt.query_map(params![limit], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (cycle_id, captured_at, path, bytes, outcome, error) = row?;
            match (Uuid::parse_str(&cycle_id), DateTime::parse_from_rfc3339(&captured_at)) {
                (Ok(cycle_id), Ok(captured_at)) => entries.push(JournalEntry {
                    cycle_id,
                    captured_at,
                    path,
                    bytes: bytes as usize,
                    outcome,
                    error,
                }),
                _ => error!(cycle_id = %cycle_id, "Skipping unreadable journal row"),
            }
        }
        Ok(entries)
    }
}
