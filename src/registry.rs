//! Chat registry.
//!
//! The registry's *mutation commands* (registration, moderation toggles)
//! belong to the external handler surface. The engine itself only ever
//! reads active destinations, looks up a single chat, and performs the two
//! narrow writes the distribution pipeline needs on its own: deactivating a
//! chat after a fatal send error, and rewriting a chat id after a platform
//! migration. `SqliteRegistry` is the storage-backed implementation of
//! that read/narrow-write surface.

use crate::error::EngineResult;
use crate::types::{Chat, ChatId, ChatKind, EditMode};
use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use std::sync::Mutex;

#[async_trait]
pub trait Registry: Send + Sync {
    async fn active_destinations(&self, exclude: ChatId) -> EngineResult<Vec<Chat>>;
    async fn get_chat(&self, id: ChatId) -> EngineResult<Option<Chat>>;
    async fn deactivate(&self, id: ChatId) -> EngineResult<()>;
    async fn rename(&self, old: ChatId, new: ChatId) -> EngineResult<()>;
}

pub struct SqliteRegistry {
    conn: Mutex<Connection>,
}

impl SqliteRegistry {
    pub fn new(conn: Connection) -> EngineResult<Self> {
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS chats (
                id INTEGER PRIMARY KEY,
                kind TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                is_source INTEGER NOT NULL DEFAULT 1,
                is_destination INTEGER NOT NULL DEFAULT 1,
                self_send_enabled INTEGER NOT NULL DEFAULT 0,
                in_paused INTEGER NOT NULL DEFAULT 0,
                out_paused INTEGER NOT NULL DEFAULT 0,
                edit_mode TEXT NOT NULL DEFAULT 'off'
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Register (or re-activate) a chat. Not part of the `Registry` trait:
    /// registration is the external handler surface's job, but tests and
    /// examples need a way to seed the registry.
    pub fn upsert(&self, chat: &Chat) -> EngineResult<()> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute(
            "INSERT INTO chats (id, kind, active, is_source, is_destination, self_send_enabled, in_paused, out_paused, edit_mode)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
                kind = excluded.kind,
                active = excluded.active,
                is_source = excluded.is_source,
                is_destination = excluded.is_destination,
                self_send_enabled = excluded.self_send_enabled,
                in_paused = excluded.in_paused,
                out_paused = excluded.out_paused,
                edit_mode = excluded.edit_mode",
            params![
                chat.id,
                kind_str(chat.kind),
                chat.active,
                chat.is_source,
                chat.is_destination,
                chat.self_send_enabled,
                chat.in_paused,
                chat.out_paused,
                edit_mode_str(chat.edit_mode),
            ],
        )?;
        Ok(())
    }
}

fn kind_str(kind: ChatKind) -> &'static str {
    match kind {
        ChatKind::Private => "private",
        ChatKind::Group => "group",
        ChatKind::Supergroup => "supergroup",
        ChatKind::Channel => "channel",
    }
}

fn kind_from_str(s: &str) -> ChatKind {
    match s {
        "group" => ChatKind::Group,
        "supergroup" => ChatKind::Supergroup,
        "channel" => ChatKind::Channel,
        _ => ChatKind::Private,
    }
}

fn edit_mode_str(mode: EditMode) -> &'static str {
    match mode {
        EditMode::Off => "off",
        EditMode::Resend => "resend",
    }
}

fn edit_mode_from_str(s: &str) -> EditMode {
    match s {
        "resend" => EditMode::Resend,
        _ => EditMode::Off,
    }
}

fn row_to_chat(row: &rusqlite::Row) -> rusqlite::Result<Chat> {
    Ok(Chat {
        id: row.get(0)?,
        kind: kind_from_str(&row.get::<_, String>(1)?),
        active: row.get(2)?,
        is_source: row.get(3)?,
        is_destination: row.get(4)?,
        self_send_enabled: row.get(5)?,
        in_paused: row.get(6)?,
        out_paused: row.get(7)?,
        edit_mode: edit_mode_from_str(&row.get::<_, String>(8)?),
    })
}

const SELECT_COLS: &str =
    "id, kind, active, is_source, is_destination, self_send_enabled, in_paused, out_paused, edit_mode";

#[async_trait]
impl Registry for SqliteRegistry {
    async fn active_destinations(&self, exclude: ChatId) -> EngineResult<Vec<Chat>> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let sql = format!(
            "SELECT {SELECT_COLS} FROM chats WHERE active = 1 AND is_destination = 1 AND id != ?1"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![exclude], row_to_chat)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    async fn get_chat(&self, id: ChatId) -> EngineResult<Option<Chat>> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let sql = format!("SELECT {SELECT_COLS} FROM chats WHERE id = ?1");
        let chat = conn
            .query_row(&sql, params![id], row_to_chat)
            .optional()?;
        Ok(chat)
    }

    async fn deactivate(&self, id: ChatId) -> EngineResult<()> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute("UPDATE chats SET active = 0 WHERE id = ?1", params![id])?;
        Ok(())
    }

    async fn rename(&self, old: ChatId, new: ChatId) -> EngineResult<()> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute("UPDATE chats SET id = ?1 WHERE id = ?2", params![new, old])?;
        Ok(())
    }
}
