//! Processing state store.
//!
//! A keyed table `path -> ProcessingRecord` plus removal tombstones, backed
//! by SQLite. This is a pure data holder; all state-transition logic lives
//! in the ingestion coordinator.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::StateError;
use crate::models::{DocumentKind, ProcessingRecord, ProcessingStatus, Tombstone};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS processed_files (
    path TEXT PRIMARY KEY,
    hash TEXT NOT NULL,
    status TEXT NOT NULL,
    kind TEXT NOT NULL,
    chunk_ids TEXT NOT NULL,
    error TEXT,
    processed_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tombstones (
    path TEXT PRIMARY KEY,
    chunk_ids TEXT NOT NULL,
    removed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_processed_files_processed_at
    ON processed_files(processed_at);
"#;

pub struct ProcessingStateStore {
    conn: Mutex<Connection>,
}

impl ProcessingStateStore {
    pub fn open(data_dir: &Path) -> Result<Self, StateError> {
        std::fs::create_dir_all(data_dir)?;
        let conn = Connection::open(data_dir.join("state.db"))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self, StateError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn get(&self, path: &str) -> Result<Option<ProcessingRecord>, StateError> {
        let conn = self.conn.lock().expect("state store lock poisoned");
        let record = conn
            .query_row(
                "SELECT path, hash, status, kind, chunk_ids, error, processed_at
                 FROM processed_files WHERE path = ?1",
                params![path],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    pub fn upsert(&self, record: &ProcessingRecord) -> Result<(), StateError> {
        let chunk_ids = serde_json::to_string(&record.chunk_ids)?;
        let conn = self.conn.lock().expect("state store lock poisoned");
        conn.execute(
            "INSERT INTO processed_files (path, hash, status, kind, chunk_ids, error, processed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(path) DO UPDATE SET
                hash = excluded.hash,
                status = excluded.status,
                kind = excluded.kind,
                chunk_ids = excluded.chunk_ids,
                error = excluded.error,
                processed_at = excluded.processed_at",
            params![
                record.path,
                record.hash,
                record.status.as_str(),
                record.kind.to_string(),
                chunk_ids,
                record.error,
                record.processed_at.to_rfc3339(),
            ],
        )?;
        // Re-ingesting a path supersedes any pending deletion for it
        conn.execute("DELETE FROM tombstones WHERE path = ?1", params![record.path])?;
        Ok(())
    }

    pub fn all(&self) -> Result<Vec<ProcessingRecord>, StateError> {
        let conn = self.conn.lock().expect("state store lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT path, hash, status, kind, chunk_ids, error, processed_at
             FROM processed_files ORDER BY path",
        )?;
        let records = stmt
            .query_map([], row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Records processed at or after `since`.
    pub fn records_since(&self, since: DateTime<Utc>) -> Result<Vec<ProcessingRecord>, StateError> {
        let conn = self.conn.lock().expect("state store lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT path, hash, status, kind, chunk_ids, error, processed_at
             FROM processed_files WHERE processed_at >= ?1 ORDER BY path",
        )?;
        let records = stmt
            .query_map(params![since.to_rfc3339()], row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Remove a record and write a tombstone carrying its chunk ids.
    pub fn remove(&self, path: &str) -> Result<Option<ProcessingRecord>, StateError> {
        let record = self.get(path)?;
        if let Some(ref record) = record {
            let chunk_ids = serde_json::to_string(&record.chunk_ids)?;
            let conn = self.conn.lock().expect("state store lock poisoned");
            conn.execute("DELETE FROM processed_files WHERE path = ?1", params![path])?;
            conn.execute(
                "INSERT INTO tombstones (path, chunk_ids, removed_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(path) DO UPDATE SET
                    chunk_ids = excluded.chunk_ids,
                    removed_at = excluded.removed_at",
                params![path, chunk_ids, Utc::now().to_rfc3339()],
            )?;
        }
        Ok(record)
    }

    pub fn tombstones_since(&self, since: Option<DateTime<Utc>>) -> Result<Vec<Tombstone>, StateError> {
        let conn = self.conn.lock().expect("state store lock poisoned");
        let since = since.map(|s| s.to_rfc3339()).unwrap_or_default();
        let mut stmt = conn.prepare(
            "SELECT path, chunk_ids, removed_at FROM tombstones
             WHERE removed_at >= ?1 ORDER BY path",
        )?;
        let tombstones = stmt
            .query_map(params![since], |row| {
                let chunk_ids: String = row.get(1)?;
                let removed_at: String = row.get(2)?;
                Ok((row.get::<_, String>(0)?, chunk_ids, removed_at))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        tombstones
            .into_iter()
            .map(|(path, chunk_ids, removed_at)| {
                Ok(Tombstone {
                    path,
                    chunk_ids: serde_json::from_str(&chunk_ids)?,
                    removed_at: parse_timestamp(&removed_at),
                })
            })
            .collect()
    }

    /// Apply incoming records from a merge package ("newer wins"). Returns
    /// the number of records actually inserted or changed.
    pub fn merge_records(&self, records: &[ProcessingRecord]) -> Result<u64, StateError> {
        let mut updated = 0;
        for record in records {
            let existing = self.get(&record.path)?;
            let changed = match existing {
                Some(ref current) => {
                    current.hash != record.hash
                        || current.status != record.status
                        || current.chunk_ids != record.chunk_ids
                }
                None => true,
            };
            if changed {
                self.upsert(record)?;
                updated += 1;
            }
        }
        Ok(updated)
    }

    /// Apply a merge package's tombstones, removing any matching records.
    pub fn apply_tombstones(&self, tombstones: &[Tombstone]) -> Result<(), StateError> {
        let conn = self.conn.lock().expect("state store lock poisoned");
        for tombstone in tombstones {
            let chunk_ids = serde_json::to_string(&tombstone.chunk_ids)?;
            conn.execute(
                "DELETE FROM processed_files WHERE path = ?1",
                params![tombstone.path],
            )?;
            conn.execute(
                "INSERT INTO tombstones (path, chunk_ids, removed_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(path) DO UPDATE SET
                    chunk_ids = excluded.chunk_ids,
                    removed_at = excluded.removed_at",
                params![tombstone.path, chunk_ids, tombstone.removed_at.to_rfc3339()],
            )?;
        }
        Ok(())
    }

    /// Replace all records wholesale (full-package merge).
    pub fn replace_all(&self, records: &[ProcessingRecord]) -> Result<(), StateError> {
        {
            let conn = self.conn.lock().expect("state store lock poisoned");
            conn.execute("DELETE FROM processed_files", [])?;
            conn.execute("DELETE FROM tombstones", [])?;
        }
        for record in records {
            self.upsert(record)?;
        }
        Ok(())
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProcessingRecord> {
    let status: String = row.get(2)?;
    let kind: String = row.get(3)?;
    let chunk_ids: String = row.get(4)?;
    let processed_at: String = row.get(6)?;

    Ok(ProcessingRecord {
        path: row.get(0)?,
        hash: row.get(1)?,
        status: status
            .parse::<ProcessingStatus>()
            .unwrap_or(ProcessingStatus::Failed),
        kind: kind.parse::<DocumentKind>().unwrap_or(DocumentKind::Text),
        chunk_ids: serde_json::from_str(&chunk_ids).unwrap_or_default(),
        error: row.get(5)?,
        processed_at: parse_timestamp(&processed_at),
    })
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
