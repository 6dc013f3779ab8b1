//! Send log: persists and queries source/destination message-id
//! mappings.
//!
//! The durable forward/reverse index between source messages and their
//! fan-out copies.

use crate::error::EngineResult;
use crate::types::{ChatId, MessageId, SendLogEntry, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::sync::Mutex;

#[async_trait]
pub trait SendLog: Send + Sync {
    async fn record(
        &self,
        source_chat: ChatId,
        source_message_id: MessageId,
        dest_chat: ChatId,
        dest_message_id: MessageId,
        source_user_id: Option<UserId>,
    ) -> EngineResult<()>;

    async fn forward_lookup(
        &self,
        source_chat: ChatId,
        source_message_id: MessageId,
    ) -> EngineResult<Vec<(ChatId, MessageId)>>;

    async fn reverse_lookup(
        &self,
        dest_chat: ChatId,
        dest_message_id: MessageId,
    ) -> EngineResult<Option<(ChatId, MessageId, Option<UserId>)>>;

    /// Delete rows with `created_at < cutoff`, in bounded batches. Returns
    /// the number of rows deleted.
    async fn prune(&self, cutoff: DateTime<Utc>) -> EngineResult<i64>;
}

pub struct SqliteSendLog {
    conn: Mutex<Connection>,
}

const PRUNE_BATCH: i64 = 500;

impl SqliteSendLog {
    pub fn new(conn: Connection) -> EngineResult<Self> {
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS send_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_chat INTEGER NOT NULL,
                source_message_id INTEGER NOT NULL,
                dest_chat INTEGER NOT NULL,
                dest_message_id INTEGER NOT NULL,
                source_user_id INTEGER,
                created_at TEXT NOT NULL,
                UNIQUE(dest_chat, dest_message_id)
            );
            CREATE INDEX IF NOT EXISTS idx_send_log_forward ON send_log(source_chat, source_message_id);
            CREATE INDEX IF NOT EXISTS idx_send_log_reverse ON send_log(dest_chat, dest_message_id);
            CREATE INDEX IF NOT EXISTS idx_send_log_created ON send_log(created_at);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    #[cfg(test)]
    pub(crate) fn all_entries(&self) -> Vec<SendLogEntry> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT source_chat, source_message_id, dest_chat, dest_message_id, source_user_id, created_at FROM send_log")
            .unwrap();
        stmt.query_map([], row_to_entry)
            .unwrap()
            .filter_map(|r| r.ok())
            .collect()
    }
}

fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<SendLogEntry> {
    let created_at: String = row.get(5)?;
    Ok(SendLogEntry {
        source_chat: row.get(0)?,
        source_message_id: row.get(1)?,
        dest_chat: row.get(2)?,
        dest_message_id: row.get(3)?,
        source_user_id: row.get(4)?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or(Utc::now()),
    })
}

#[async_trait]
impl SendLog for SqliteSendLog {
    async fn record(
        &self,
        source_chat: ChatId,
        source_message_id: MessageId,
        dest_chat: ChatId,
        dest_message_id: MessageId,
        source_user_id: Option<UserId>,
    ) -> EngineResult<()> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute(
            "INSERT OR REPLACE INTO send_log
                (source_chat, source_message_id, dest_chat, dest_message_id, source_user_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                source_chat,
                source_message_id,
                dest_chat,
                dest_message_id,
                source_user_id,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn forward_lookup(
        &self,
        source_chat: ChatId,
        source_message_id: MessageId,
    ) -> EngineResult<Vec<(ChatId, MessageId)>> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let mut stmt = conn.prepare(
            "SELECT dest_chat, dest_message_id FROM send_log
             WHERE source_chat = ?1 AND source_message_id = ?2",
        )?;
        let rows = stmt
            .query_map(params![source_chat, source_message_id], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    async fn reverse_lookup(
        &self,
        dest_chat: ChatId,
        dest_message_id: MessageId,
    ) -> EngineResult<Option<(ChatId, MessageId, Option<UserId>)>> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let row = conn
            .query_row(
                "SELECT source_chat, source_message_id, source_user_id FROM send_log
                 WHERE dest_chat = ?1 AND dest_message_id = ?2",
                params![dest_chat, dest_message_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        Ok(row)
    }

    async fn prune(&self, cutoff: DateTime<Utc>) -> EngineResult<i64> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let cutoff_str = cutoff.to_rfc3339();
        let mut total = 0i64;
        loop {
            let deleted = conn.execute(
                "DELETE FROM send_log WHERE id IN (
                    SELECT id FROM send_log WHERE created_at < ?1 LIMIT ?2
                )",
                params![cutoff_str, PRUNE_BATCH],
            )?;
            total += deleted as i64;
            if (deleted as i64) < PRUNE_BATCH {
                break;
            }
        }
        Ok(total)
    }
}
