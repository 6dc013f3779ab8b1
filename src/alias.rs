//! Alias service: stable per-user pseudonym.
//!
//! Aliases are deterministic and never change: `HMAC-SHA256(salt, user_id)`
//! truncated and base64-encoded, generated on first use and persisted so
//! later lookups are stable without recomputation.

use crate::error::EngineResult;
use crate::types::UserId;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use moka::future::Cache;
use rusqlite::{Connection, OptionalExtension, params};
use sha2::Sha256;
use std::sync::Mutex;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

const TOKEN_LEN: usize = 6;

pub struct AliasService {
    conn: Mutex<Connection>,
    salt: String,
    /// `alias:{user}` — 5 minute TTL cache.
    cache: Cache<UserId, String>,
}

impl AliasService {
    pub fn new(conn: Connection, salt: String, cache_ttl: Duration) -> EngineResult<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS user_aliases (
                user_id INTEGER PRIMARY KEY,
                token TEXT NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            salt,
            cache: Cache::builder().time_to_live(cache_ttl).build(),
        })
    }

    fn derive(&self, user_id: UserId) -> String {
        let mut mac = HmacSha256::new_from_slice(self.salt.as_bytes())
            .expect("HMAC accepts a key of any length");
        mac.update(user_id.to_le_bytes().as_slice());
        let digest = mac.finalize().into_bytes();
        let encoded = URL_SAFE_NO_PAD.encode(digest);
        encoded[..TOKEN_LEN.min(encoded.len())].to_lowercase()
    }

    fn load(&self, user_id: UserId) -> EngineResult<Option<String>> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let token = conn
            .query_row(
                "SELECT token FROM user_aliases WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(token)
    }

    fn persist(&self, user_id: UserId, token: &str) -> EngineResult<()> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute(
            "INSERT OR IGNORE INTO user_aliases (user_id, token) VALUES (?1, ?2)",
            params![user_id, token],
        )?;
        Ok(())
    }

    /// Get or create the stable alias token for `user_id`.
    pub async fn alias_for(&self, user_id: UserId) -> EngineResult<String> {
        if let Some(hit) = self.cache.get(&user_id).await {
            return Ok(hit);
        }

        let token = match self.load(user_id)? {
            Some(token) => token,
            None => {
                let token = self.derive(user_id);
                self.persist(user_id, &token)?;
                token
            }
        };

        self.cache.insert(user_id, token.clone()).await;
        Ok(token)
    }
}
