// ABOUTME: Durable per-thread assistant context: which channel the user is viewing beside the pane.
// ABOUTME: Saved on assistant thread start and context change; read when a DM in that thread arrives.

use crate::error::ThreadContextError;
use crate::traits::ThreadRef;
use anyhow::Context;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// What Slack reports about where the assistant pane is open
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssistantContext {
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub enterprise_id: Option<String>,
}

/// Thread-keyed store of [`AssistantContext`], one row per assistant thread.
#[derive(Clone)]
pub struct ThreadContextStore {
    db: Arc<Mutex<Connection>>,
}

impl ThreadContextStore {
    /// Open (or create) `thread_contexts.db` under `data_dir`
    pub fn open<P: AsRef<Path>>(data_dir: P) -> anyhow::Result<Self> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir).context("Failed to create data directory")?;

        let db_path = data_dir.join("thread_contexts.db");
        let conn = Connection::open(&db_path).context("Failed to open thread context database")?;
        let store =
            Self::from_connection(conn).context("Failed to initialize thread context schema")?;

        tracing::info!(db = %db_path.display(), "ThreadContextStore initialized");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, ThreadContextError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, ThreadContextError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS thread_contexts (
                channel_id TEXT NOT NULL,
                thread_ts TEXT NOT NULL,
                context_channel_id TEXT,
                team_id TEXT,
                enterprise_id TEXT,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (channel_id, thread_ts)
            )",
            [],
        )?;

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    fn db(&self) -> Result<MutexGuard<'_, Connection>, ThreadContextError> {
        self.db.lock().map_err(|_| ThreadContextError::Poisoned)
    }

    /// Replace the context saved for `thread`
    pub fn save(
        &self,
        thread: &ThreadRef,
        context: &AssistantContext,
    ) -> Result<(), ThreadContextError> {
        self.db()?.execute(
            "INSERT INTO thread_contexts
                (channel_id, thread_ts, context_channel_id, team_id, enterprise_id, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (channel_id, thread_ts) DO UPDATE SET
                context_channel_id = excluded.context_channel_id,
                team_id = excluded.team_id,
                enterprise_id = excluded.enterprise_id,
                updated_at = excluded.updated_at",
            params![
                thread.channel,
                thread.thread_ts,
                context.channel_id,
                context.team_id,
                context.enterprise_id,
                Utc::now().to_rfc3339(),
            ],
        )?;

        tracing::debug!(
            channel = %thread.channel,
            thread_ts = %thread.thread_ts,
            viewing = ?context.channel_id,
            "Saved assistant thread context"
        );
        Ok(())
    }

    pub fn get(&self, thread: &ThreadRef) -> Result<Option<AssistantContext>, ThreadContextError> {
        let db = self.db()?;
        let context = db
            .query_row(
                "SELECT context_channel_id, team_id, enterprise_id FROM thread_contexts
                 WHERE channel_id = ?1 AND thread_ts = ?2",
                params![thread.channel, thread.thread_ts],
                |row| {
                    Ok(AssistantContext {
                        channel_id: row.get(0)?,
                        team_id: row.get(1)?,
                        enterprise_id: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(context)
    }
}

impl std::fmt::Debug for ThreadContextStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadContextStore").finish_non_exhaustive()
    }
}
