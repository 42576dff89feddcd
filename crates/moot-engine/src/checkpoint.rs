use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use moot_core::error::{MootError, Result};
use moot_core::step::StepId;
use moot_core::traits::CheckpointStore;
use moot_core::types::{Checkpoint, Cursor, RunId};

/// Process-local checkpoint store. Lost on restart.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    entries: Mutex<HashMap<String, Checkpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, Checkpoint>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        self.entries()
            .insert(checkpoint.key.clone(), checkpoint.clone());
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<Checkpoint>> {
        Ok(self.entries().get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.entries().remove(key);
        Ok(())
    }
}

/// Persistent checkpoint store backed by SQLite. Keeps only the latest
/// checkpoint per key.
pub struct SqliteCheckpointStore {
    conn: Mutex<Connection>,
}

fn db_err(context: &str) -> impl Fn(rusqlite::Error) -> MootError + '_ {
    move |e| MootError::Checkpoint(format!("{}: {}", context, e))
}

impl SqliteCheckpointStore {
    /// Open or create the checkpoint database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                MootError::Checkpoint(format!("Failed to create checkpoint directory: {}", e))
            })?;
        }

        let conn = Connection::open(path).map_err(db_err("Failed to open checkpoint store"))?;

        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;

             CREATE TABLE IF NOT EXISTS checkpoints (
                 key TEXT PRIMARY KEY,
                 run_id TEXT NOT NULL,
                 sequence INTEGER NOT NULL,
                 cursor_json TEXT NOT NULL,
                 answered TEXT,
                 state_json TEXT NOT NULL,
                 saved_at TEXT NOT NULL
             );",
        )
        .map_err(db_err("Failed to initialize checkpoint schema"))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

struct Row {
    key: String,
    run_id: String,
    sequence: i64,
    cursor_json: String,
    answered: Option<String>,
    state_json: String,
    saved_at: String,
}

impl CheckpointStore for SqliteCheckpointStore {
    fn save(&self, cp: &Checkpoint) -> Result<()> {
        let cursor_json = serde_json::to_string(&cp.cursor)?;
        let state_json = serde_json::to_string(&cp.state)?;

        // One statement, so a reader sees the old row or the new one
        self.conn()
            .execute(
                "INSERT INTO checkpoints (key, run_id, sequence, cursor_json, answered, state_json, saved_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(key) DO UPDATE SET
                     run_id = excluded.run_id,
                     sequence = excluded.sequence,
                     cursor_json = excluded.cursor_json,
                     answered = excluded.answered,
                     state_json = excluded.state_json,
                     saved_at = excluded.saved_at",
                params![
                    cp.key,
                    cp.run_id.0,
                    cp.sequence as i64,
                    cursor_json,
                    cp.answered.map(|step| step.as_str()),
                    state_json,
                    cp.saved_at.to_rfc3339(),
                ],
            )
            .map_err(db_err("Failed to save checkpoint"))?;
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<Checkpoint>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT key, run_id, sequence, cursor_json, answered, state_json, saved_at
                 FROM checkpoints WHERE key = ?1",
                params![key],
                |row| {
                    Ok(Row {
                        key: row.get(0)?,
                        run_id: row.get(1)?,
                        sequence: row.get(2)?,
                        cursor_json: row.get(3)?,
                        answered: row.get(4)?,
                        state_json: row.get(5)?,
                        saved_at: row.get(6)?,
                    })
                },
            )
            .optional()
            .map_err(db_err("Failed to load checkpoint"))?;
        drop(conn);

        let Some(row) = row else {
            return Ok(None);
        };

        let cursor: Cursor = serde_json::from_str(&row.cursor_json)
            .map_err(|e| MootError::Checkpoint(format!("Corrupt cursor for {}: {}", row.key, e)))?;
        let answered = row
            .answered
            .as_deref()
            .map(str::parse::<StepId>)
            .transpose()
            .map_err(|e| {
                MootError::Checkpoint(format!("Corrupt answered step for {}: {}", row.key, e))
            })?;
        let state = serde_json::from_str(&row.state_json)
            .map_err(|e| MootError::Checkpoint(format!("Corrupt state for {}: {}", row.key, e)))?;
        let saved_at = DateTime::parse_from_rfc3339(&row.saved_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(Some(Checkpoint {
            key: row.key,
            run_id: RunId(row.run_id),
            state,
            cursor,
            answered,
            sequence: row.sequence.max(0) as u64,
            saved_at,
        }))
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.conn()
            .execute("DELETE FROM checkpoints WHERE key = ?1", params![key])
            .map_err(db_err("Failed to delete checkpoint"))?;
        Ok(())
    }
}
