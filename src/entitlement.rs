//! Subscription/entitlement store. Entitlement is a consumed external
//! trait in principle (billing lives outside the core), but the engine
//! owns the `subscriptions` table itself as part of its own persisted
//! state layout.

use crate::error::EngineResult;
use crate::types::{ChatId, Subscription};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use rusqlite::{Connection, OptionalExtension, params};
use std::sync::Mutex;
use std::time::Duration;

#[async_trait]
pub trait Entitlement: Send + Sync {
    async fn is_entitled(&self, chat_id: ChatId, at: DateTime<Utc>) -> EngineResult<bool>;
}

pub struct SqliteEntitlement {
    conn: Mutex<Connection>,
    /// `entitled:{chat}` — 5 minute TTL cache.
    cache: Cache<ChatId, bool>,
}

impl SqliteEntitlement {
    pub fn new(conn: Connection, cache_ttl: Duration) -> EngineResult<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS subscriptions (
                chat_id INTEGER PRIMARY KEY,
                plan TEXT NOT NULL,
                trial_until TEXT NOT NULL,
                paid_until TEXT,
                stacking INTEGER NOT NULL DEFAULT 0
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            cache: Cache::builder().time_to_live(cache_ttl).build(),
        })
    }

    /// Start (or restart) a chat's trial. Not part of the consumed trait —
    /// subscription purchase/trial bookkeeping belongs to the external
    /// handler surface, but tests need a way to seed entitlement.
    pub fn upsert(&self, sub: &Subscription) -> EngineResult<()> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute(
            "INSERT INTO subscriptions (chat_id, plan, trial_until, paid_until, stacking)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(chat_id) DO UPDATE SET
                plan = excluded.plan,
                trial_until = excluded.trial_until,
                paid_until = excluded.paid_until,
                stacking = excluded.stacking",
            params![
                sub.chat_id,
                sub.plan,
                sub.trial_until.to_rfc3339(),
                sub.paid_until.map(|d| d.to_rfc3339()),
                sub.stacking,
            ],
        )?;
        self.cache.invalidate(&sub.chat_id);
        Ok(())
    }

    fn lookup(&self, chat_id: ChatId) -> EngineResult<Option<Subscription>> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let row = conn
            .query_row(
                "SELECT chat_id, plan, trial_until, paid_until, stacking FROM subscriptions WHERE chat_id = ?1",
                params![chat_id],
                |row| {
                    let trial_until: String = row.get(2)?;
                    let paid_until: Option<String> = row.get(3)?;
                    Ok(Subscription {
                        chat_id: row.get(0)?,
                        plan: row.get(1)?,
                        trial_until: DateTime::parse_from_rfc3339(&trial_until)
                            .map(|d| d.with_timezone(&Utc))
                            .unwrap_or(DateTime::<Utc>::MIN_UTC),
                        paid_until: paid_until.and_then(|s| {
                            DateTime::parse_from_rfc3339(&s)
                                .ok()
                                .map(|d| d.with_timezone(&Utc))
                        }),
                        stacking: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }
}

#[async_trait]
impl Entitlement for SqliteEntitlement {
    async fn is_entitled(&self, chat_id: ChatId, at: DateTime<Utc>) -> EngineResult<bool> {
        if let Some(hit) = self.cache.get(&chat_id).await {
            return Ok(hit);
        }
        let entitled = self
            .lookup(chat_id)?
            .map(|sub| sub.is_entitled_at(at))
            .unwrap_or(false);
        self.cache.insert(chat_id, entitled).await;
        Ok(entitled)
    }
}
