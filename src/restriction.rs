//! Restriction store: bans and mutes enforced at ingress.
//!
//! A banned user's messages are dropped forever; a muted user's messages
//! are dropped until the mute's `expires_at`. This is the one piece of
//! moderation state the core itself reads — issuing/lifting a restriction
//! is a handler-layer command (external), but the engine has to consult it
//! on every inbound message before normalization's output reaches dedup or
//! the album buffer.

use crate::error::EngineResult;
use crate::types::{Restriction, RestrictionKind, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::sync::Mutex;

#[async_trait]
pub trait RestrictionStore: Send + Sync {
    async fn is_restricted(&self, user_id: UserId, at: DateTime<Utc>) -> EngineResult<bool>;
}

pub struct SqliteRestrictionStore {
    conn: Mutex<Connection>,
}

impl SqliteRestrictionStore {
    pub fn new(conn: Connection) -> EngineResult<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS user_restrictions (
                user_id INTEGER PRIMARY KEY,
                kind TEXT NOT NULL,
                expires_at TEXT,
                issuer INTEGER NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Issue (or replace) a restriction. Not part of the consumed trait —
    /// moderation commands live in the external handler surface, but
    /// tests need a way to seed one.
    pub fn upsert(&self, r: &Restriction) -> EngineResult<()> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute(
            "INSERT INTO user_restrictions (user_id, kind, expires_at, issuer)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id) DO UPDATE SET
                kind = excluded.kind,
                expires_at = excluded.expires_at,
                issuer = excluded.issuer",
            params![
                r.user_id,
                kind_str(r.kind),
                r.expires_at.map(|d| d.to_rfc3339()),
                r.issuer,
            ],
        )?;
        Ok(())
    }

    /// Lift a restriction outright.
    pub fn clear(&self, user_id: UserId) -> EngineResult<()> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute("DELETE FROM user_restrictions WHERE user_id = ?1", params![user_id])?;
        Ok(())
    }
}

fn kind_str(kind: RestrictionKind) -> &'static str {
    match kind {
        RestrictionKind::Mute => "mute",
        RestrictionKind::Ban => "ban",
    }
}

fn kind_from_str(s: &str) -> RestrictionKind {
    match s {
        "ban" => RestrictionKind::Ban,
        _ => RestrictionKind::Mute,
    }
}

#[async_trait]
impl RestrictionStore for SqliteRestrictionStore {
    async fn is_restricted(&self, user_id: UserId, at: DateTime<Utc>) -> EngineResult<bool> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let row = conn
            .query_row(
                "SELECT kind, expires_at, issuer FROM user_restrictions WHERE user_id = ?1",
                params![user_id],
                |row| {
                    let kind: String = row.get(0)?;
                    let expires_at: Option<String> = row.get(1)?;
                    Ok(Restriction {
                        user_id,
                        kind: kind_from_str(&kind),
                        expires_at: expires_at.and_then(|s| {
                            DateTime::parse_from_rfc3339(&s)
                                .ok()
                                .map(|d| d.with_timezone(&Utc))
                        }),
                        issuer: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(row.is_some_and(|r| r.is_active_at(at)))
    }
}
