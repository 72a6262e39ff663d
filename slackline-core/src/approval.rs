// ABOUTME: Durable approval hooks - a tool call suspends on a token until a human decision resumes it.
// ABOUTME: Rows live in SQLite so a decision arriving after a restart can still be honoured.

use crate::error::ApprovalError;
use crate::metrics;
use crate::traits::{MessageRef, ThreadRef};
use anyhow::Context;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;

const SELECT_COLUMNS: &str = "token, channel_id, channel_name, requested_at, resolved, approved,
     resolved_at, origin_channel, origin_thread_ts, request_ts";

/// What a tool asks a human to approve
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalRequest {
    /// Correlation id, normally the tool-call id
    pub token: String,
    pub channel_id: String,
    pub channel_name: Option<String>,
    /// Thread the request was made from
    pub origin: Option<ThreadRef>,
    /// The posted approval request message
    pub request_ts: Option<String>,
}

impl ApprovalRequest {
    pub fn new(token: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            channel_id: channel_id.into(),
            channel_name: None,
            origin: None,
            request_ts: None,
        }
    }

    pub fn with_channel_name(mut self, name: Option<String>) -> Self {
        self.channel_name = name;
        self
    }

    pub fn with_origin(mut self, origin: ThreadRef) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn with_request_ts(mut self, ts: impl Into<String>) -> Self {
        self.request_ts = Some(ts.into());
        self
    }
}

/// A human's answer, carried by the button click
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalDecision {
    pub approved: bool,
    pub channel_id: String,
    pub channel_name: Option<String>,
}

/// A persisted approval row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingApproval {
    pub token: String,
    pub channel_id: String,
    pub channel_name: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub resolved: bool,
    pub approved: Option<bool>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub origin_channel: Option<String>,
    pub origin_thread_ts: Option<String>,
    pub request_ts: Option<String>,
}

impl PendingApproval {
    /// Thread the request came from, when known
    pub fn origin(&self) -> Option<ThreadRef> {
        match (&self.origin_channel, &self.origin_thread_ts) {
            (Some(channel), Some(ts)) => Some(ThreadRef::new(channel.clone(), ts.clone())),
            _ => None,
        }
    }

    /// The approval request message, when known
    pub fn request_message(&self) -> Option<MessageRef> {
        match (&self.origin_channel, &self.request_ts) {
            (Some(channel), Some(ts)) => Some(MessageRef::new(channel.clone(), ts.clone())),
            _ => None,
        }
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let requested_at: String = row.get(3)?;
        let resolved_at: Option<String> = row.get(6)?;
        Ok(Self {
            token: row.get(0)?,
            channel_id: row.get(1)?,
            channel_name: row.get(2)?,
            requested_at: parse_timestamp(3, &requested_at)?,
            resolved: row.get::<_, i32>(4)? != 0,
            approved: row.get::<_, Option<i32>>(5)?.map(|v| v != 0),
            resolved_at: resolved_at
                .as_deref()
                .map(|s| parse_timestamp(6, s))
                .transpose()?,
            origin_channel: row.get(7)?,
            origin_thread_ts: row.get(8)?,
            request_ts: row.get(9)?,
        })
    }
}

fn parse_timestamp(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

/// How a successful resume reached the suspended side
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeOutcome {
    /// The waiting tool call received the decision
    Delivered,
    /// Nobody was waiting (restart or abandoned turn); the caller must finish the work
    Detached(PendingApproval),
}

/// The suspended side of an approval. Awaiting it blocks only the calling tool.
#[derive(Debug)]
pub struct ApprovalWaiter {
    token: String,
    rx: oneshot::Receiver<ApprovalDecision>,
}

impl ApprovalWaiter {
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Wait for the decision. There is no timeout.
    pub async fn wait(self) -> Result<ApprovalDecision, ApprovalError> {
        self.rx
            .await
            .map_err(|_| ApprovalError::Abandoned(self.token))
    }
}

/// Token-addressed, single-resolution suspension points.
#[derive(Clone)]
pub struct ApprovalRegistry {
    db: Arc<Mutex<Connection>>,
    waiters: Arc<Mutex<HashMap<String, oneshot::Sender<ApprovalDecision>>>>,
}

impl ApprovalRegistry {
    /// Open (or create) `approvals.db` under `data_dir`
    pub fn open<P: AsRef<Path>>(data_dir: P) -> anyhow::Result<Self> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir).context("Failed to create data directory")?;

        let db_path = data_dir.join("approvals.db");
        let conn = Connection::open(&db_path).context("Failed to open approvals database")?;
        let registry = Self::from_connection(conn).context("Failed to initialize approvals schema")?;

        tracing::info!(db = %db_path.display(), "ApprovalRegistry initialized");
        Ok(registry)
    }

    pub fn open_in_memory() -> Result<Self, ApprovalError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, ApprovalError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS pending_approvals (
                token TEXT PRIMARY KEY,
                channel_id TEXT NOT NULL,
                channel_name TEXT,
                requested_at TEXT NOT NULL,
                resolved INTEGER NOT NULL DEFAULT 0,
                approved INTEGER,
                resolved_at TEXT,
                origin_channel TEXT,
                origin_thread_ts TEXT,
                request_ts TEXT
            )",
            [],
        )?;

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
            waiters: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    fn db(&self) -> Result<MutexGuard<'_, Connection>, ApprovalError> {
        self.db.lock().map_err(|_| ApprovalError::Poisoned)
    }

    fn waiters(&self) -> MutexGuard<'_, HashMap<String, oneshot::Sender<ApprovalDecision>>> {
        self.waiters.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Persist a pending approval and return the handle to await its decision.
    pub fn create(&self, request: ApprovalRequest) -> Result<ApprovalWaiter, ApprovalError> {
        let requested_at = Utc::now().to_rfc3339();
        let (origin_channel, origin_thread_ts) = match &request.origin {
            Some(o) => (Some(o.channel.clone()), Some(o.thread_ts.clone())),
            None => (None, None),
        };

        // Held until the waiter is registered; resume must never see the row without it
        let db = self.db()?;
        let insert = db.execute(
            "INSERT INTO pending_approvals
                (token, channel_id, channel_name, requested_at, origin_channel, origin_thread_ts, request_ts)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                request.token,
                request.channel_id,
                request.channel_name,
                requested_at,
                origin_channel,
                origin_thread_ts,
                request.request_ts,
            ],
        );

        match insert {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(ApprovalError::DuplicateToken(request.token));
            }
            Err(e) => return Err(e.into()),
        }

        let (tx, rx) = oneshot::channel();
        self.waiters().insert(request.token.clone(), tx);
        drop(db);
        metrics::record_approval_created();

        tracing::info!(
            token = %request.token,
            channel_id = %request.channel_id,
            "Approval requested"
        );

        Ok(ApprovalWaiter {
            token: request.token,
            rx,
        })
    }

    /// Resolve a pending approval exactly once and hand the decision to its waiter.
    pub fn resume(
        &self,
        token: &str,
        decision: ApprovalDecision,
    ) -> Result<ResumeOutcome, ApprovalError> {
        let (resolved, waiter) = {
            let db = self.db()?;
            let row = Self::select(&db, token)?
                .ok_or_else(|| ApprovalError::UnknownToken(token.to_string()))?;

            if row.resolved {
                return Err(ApprovalError::AlreadyResolved(token.to_string()));
            }
            if row.channel_id != decision.channel_id {
                return Err(ApprovalError::ChannelMismatch {
                    token: token.to_string(),
                    expected: row.channel_id,
                    actual: decision.channel_id,
                });
            }

            let resolved_at = Utc::now();
            let changed = db.execute(
                "UPDATE pending_approvals
                 SET resolved = 1, approved = ?2, resolved_at = ?3
                 WHERE token = ?1 AND resolved = 0",
                params![token, decision.approved as i32, resolved_at.to_rfc3339()],
            )?;
            if changed == 0 {
                return Err(ApprovalError::AlreadyResolved(token.to_string()));
            }

            let waiter = self.waiters().remove(token);
            (
                PendingApproval {
                    resolved: true,
                    approved: Some(decision.approved),
                    resolved_at: Some(resolved_at),
                    ..row
                },
                waiter,
            )
        };

        let approved = decision.approved;
        let delivered = match waiter {
            Some(tx) => tx.send(decision).is_ok(),
            None => false,
        };
        metrics::record_approval_resolved(approved, !delivered);

        tracing::info!(token, approved, delivered, "Approval resolved");

        if delivered {
            Ok(ResumeOutcome::Delivered)
        } else {
            Ok(ResumeOutcome::Detached(resolved))
        }
    }

    /// Record the ts of the posted request message on an unresolved row.
    pub fn attach_request_ts(&self, token: &str, request_ts: &str) -> Result<(), ApprovalError> {
        let changed = self.db()?.execute(
            "UPDATE pending_approvals SET request_ts = ?2 WHERE token = ?1 AND resolved = 0",
            params![token, request_ts],
        )?;
        if changed == 0 {
            tracing::debug!(token, "Approval already resolved, request ts not recorded");
        }
        Ok(())
    }

    /// Drop an unresolved approval whose request never reached Slack.
    ///
    /// Its waiter is released, so the suspended call sees `Abandoned`.
    pub fn discard(&self, token: &str) -> Result<bool, ApprovalError> {
        let db = self.db()?;
        let removed = db.execute(
            "DELETE FROM pending_approvals WHERE token = ?1 AND resolved = 0",
            params![token],
        )?;
        self.waiters().remove(token);
        drop(db);

        if removed > 0 {
            tracing::info!(token, "Approval discarded");
        }
        Ok(removed > 0)
    }

    pub fn get(&self, token: &str) -> Result<Option<PendingApproval>, ApprovalError> {
        let db = self.db()?;
        Self::select(&db, token)
    }

    /// Unresolved approvals, oldest first
    pub fn pending(&self) -> Result<Vec<PendingApproval>, ApprovalError> {
        let db = self.db()?;
        let mut stmt = db.prepare(&format!(
            "SELECT {} FROM pending_approvals WHERE resolved = 0 ORDER BY requested_at",
            SELECT_COLUMNS
        ))?;
        let rows = stmt.query_map([], PendingApproval::from_row)?;
        let pending = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(pending)
    }

    /// Startup pass: report approvals still waiting for a click.
    ///
    /// Their tool calls are gone; a later click resolves them as Detached.
    pub fn recover(&self) -> Result<Vec<PendingApproval>, ApprovalError> {
        let pending = self.pending()?;
        for approval in &pending {
            tracing::info!(
                token = %approval.token,
                channel_id = %approval.channel_id,
                requested_at = %approval.requested_at.to_rfc3339(),
                "Recovered pending approval"
            );
        }
        metrics::set_pending_approvals(pending.len() as u64);
        if !pending.is_empty() {
            tracing::info!(count = pending.len(), "Approvals awaiting a decision after restart");
        }
        Ok(pending)
    }

    /// Whether a tool call is currently blocked on this token
    pub fn has_waiter(&self, token: &str) -> bool {
        self.waiters()
            .get(token)
            .map(|tx| !tx.is_closed())
            .unwrap_or(false)
    }

    fn select(db: &Connection, token: &str) -> Result<Option<PendingApproval>, ApprovalError> {
        let row = db
            .query_row(
                &format!("SELECT {} FROM pending_approvals WHERE token = ?1", SELECT_COLUMNS),
                params![token],
                PendingApproval::from_row,
            )
            .optional()?;
        Ok(row)
    }
}

impl std::fmt::Debug for ApprovalRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalRegistry")
            .field("waiters", &self.waiters().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_requires_both_fields() {
        let registry = ApprovalRegistry::open_in_memory().unwrap();
        let _waiter = registry
            .create(ApprovalRequest::new("tc-1", "C1").with_origin(ThreadRef::new("C9", "1.0")))
            .unwrap();
        let row = registry.get("tc-1").unwrap().unwrap();
        assert_eq!(row.origin(), Some(ThreadRef::new("C9", "1.0")));
        assert_eq!(row.request_message(), None);
        assert!(!row.resolved);
        assert_eq!(row.approved, None);
    }

    #[test]
    fn test_has_waiter_tracks_dropped_waiter() {
        let registry = ApprovalRegistry::open_in_memory().unwrap();
        let waiter = registry.create(ApprovalRequest::new("tc-2", "C1")).unwrap();
        assert!(registry.has_waiter("tc-2"));
        drop(waiter);
        assert!(!registry.has_waiter("tc-2"));
    }
}
