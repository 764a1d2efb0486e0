//! Durable sync task storage.
//!
//! Pending mutating operations live in the same database as the cache so
//! they survive process restarts. A task is only ever removed after a
//! confirmed replay.

use super::connection::CacheDb;
use crate::Error;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio_rusqlite::params;

/// Which sync tag a task belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum SyncKind {
    ContactForm,
    InvestmentInquiry,
}

impl SyncKind {
    pub const ALL: [SyncKind; 2] = [SyncKind::ContactForm, SyncKind::InvestmentInquiry];

    /// The sync tag that triggers replay of this kind.
    pub fn tag(self) -> &'static str {
        match self {
            SyncKind::ContactForm => "contact-form",
            SyncKind::InvestmentInquiry => "investment-inquiry",
        }
    }
}

impl fmt::Display for SyncKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for SyncKind {
    type Err = Error;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        SyncKind::ALL
            .into_iter()
            .find(|kind| kind.tag() == tag)
            .ok_or_else(|| Error::InvalidInput(format!("unknown sync tag: {tag}")))
    }
}

/// A mutating operation waiting to be replayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SyncTask {
    pub id: i64,
    pub kind: SyncKind,
    pub payload: serde_json::Value,
    pub created_at: String,
    /// Replay attempts that did not succeed.
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl CacheDb {
    /// Persist a new task and return it.
    pub async fn enqueue_sync_task(&self, kind: SyncKind, payload: &serde_json::Value) -> Result<SyncTask, Error> {
        let payload_json = serde_json::to_string(payload)?;
        let created_at = chrono::Utc::now().to_rfc3339();
        let kind_tag = kind.tag();
        let stored_at = created_at.clone();

        let id = self
            .conn
            .call(move |conn| -> Result<i64, Error> {
                conn.execute(
                    "INSERT INTO sync_tasks (kind, payload_json, created_at) VALUES (?1, ?2, ?3)",
                    params![kind_tag, payload_json, stored_at],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .map_err(Error::from)?;

        Ok(SyncTask { id, kind, payload: payload.clone(), created_at, attempts: 0, last_error: None })
    }

    /// Pending tasks of one kind, oldest first.
    pub async fn pending_sync_tasks(&self, kind: SyncKind) -> Result<Vec<SyncTask>, Error> {
        let kind_tag = kind.tag();
        let rows = self
            .conn
            .call(move |conn| -> Result<Vec<(i64, String, String, u32, Option<String>)>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT id, payload_json, created_at, attempts, last_error
                    FROM sync_tasks WHERE kind = ?1 ORDER BY id ASC",
                )?;
                let rows = stmt
                    .query_map(params![kind_tag], |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(Error::from)?;

        rows.into_iter()
            .map(|(id, payload_json, created_at, attempts, last_error)| -> Result<SyncTask, Error> {
                let payload = serde_json::from_str(&payload_json)?;
                Ok(SyncTask { id, kind, payload, created_at, attempts, last_error })
            })
            .collect()
    }

    /// Remove a replayed task. Returns whether it existed.
    pub async fn remove_sync_task(&self, id: i64) -> Result<bool, Error> {
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute("DELETE FROM sync_tasks WHERE id = ?1", params![id])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Record a failed replay attempt; the task stays queued.
    pub async fn record_sync_failure(&self, id: i64, error: &str) -> Result<(), Error> {
        let error = error.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "UPDATE sync_tasks SET attempts = attempts + 1, last_error = ?2 WHERE id = ?1",
                    params![id, error],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Number of queued tasks, optionally restricted to one kind.
    pub async fn count_sync_tasks(&self, kind: Option<SyncKind>) -> Result<u64, Error> {
        let kind_tag = kind.map(SyncKind::tag);
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM sync_tasks WHERE ?1 IS NULL OR kind = ?1",
                    params![kind_tag],
                    |row| row.get(0),
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}
