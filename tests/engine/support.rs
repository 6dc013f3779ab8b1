//! Shared test scaffolding: an in-memory `PlatformClient` double and
//! builders for seeding the engine's durable stores. Each test gets its
//! own temp SQLite file (avoids contention the way the teacher's own
//! per-test temp-db convention does).

use async_trait::async_trait;
use chat_relay::alias::AliasService;
use chat_relay::entitlement::{Entitlement, SqliteEntitlement};
use chat_relay::platform::{PlatformClient, PlatformError, SendOutcome};
use chat_relay::registry::{Registry, SqliteRegistry};
use chat_relay::restriction::{RestrictionStore, SqliteRestrictionStore};
use chat_relay::send_log::{SendLog, SqliteSendLog};
use chat_relay::types::{
    Chat, ChatId, ChatKind, EditMode, MessageId, Payload, ReplyAnchor, Subscription,
};
use chat_relay::{Engine, EngineConfig, EngineResult};
use rusqlite::Connection;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct SentRecord {
    pub dest_chat: ChatId,
    pub payload: Payload,
    pub reply_anchor: Option<ReplyAnchor>,
    pub at: Instant,
}

/// An in-memory `PlatformClient` double: returns a queue of canned errors
/// per destination before falling back to a synthesized success, and logs
/// every accepted send for assertions.
pub struct MockPlatformClient {
    next_id: AtomicI64,
    canned: Mutex<HashMap<ChatId, VecDeque<PlatformError>>>,
    sent: Mutex<Vec<SentRecord>>,
}

impl Default for MockPlatformClient {
    fn default() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            canned: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
        }
    }
}

impl MockPlatformClient {
    /// Queue an error to be returned on the *next* send to `dest_chat`,
    /// before it falls back to success.
    pub fn queue_error(&self, dest_chat: ChatId, err: PlatformError) {
        self.canned
            .lock()
            .unwrap()
            .entry(dest_chat)
            .or_default()
            .push_back(err);
    }

    pub fn sent(&self) -> Vec<SentRecord> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, dest_chat: ChatId) -> Vec<SentRecord> {
        self.sent()
            .into_iter()
            .filter(|r| r.dest_chat == dest_chat)
            .collect()
    }

    fn next_error(&self, dest_chat: ChatId) -> Option<PlatformError> {
        self.canned.lock().unwrap().get_mut(&dest_chat)?.pop_front()
    }

    fn next_id(&self) -> MessageId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn record(&self, dest_chat: ChatId, payload: Payload, reply_anchor: Option<ReplyAnchor>) {
        self.sent.lock().unwrap().push(SentRecord {
            dest_chat,
            payload,
            reply_anchor,
            at: Instant::now(),
        });
    }
}

#[async_trait]
impl PlatformClient for MockPlatformClient {
    async fn send(
        &self,
        dest_chat: ChatId,
        payload: &Payload,
        reply_anchor: Option<ReplyAnchor>,
    ) -> SendOutcome {
        if let Some(err) = self.next_error(dest_chat) {
            return Err(err);
        }
        let id = self.next_id();
        self.record(dest_chat, payload.clone(), reply_anchor);
        Ok(id)
    }

    async fn send_media_group(
        &self,
        dest_chat: ChatId,
        parts: &[Payload],
        reply_anchor: Option<ReplyAnchor>,
    ) -> Result<Vec<MessageId>, PlatformError> {
        if let Some(err) = self.next_error(dest_chat) {
            return Err(err);
        }
        let ids = parts
            .iter()
            .map(|part| {
                let id = self.next_id();
                self.record(dest_chat, part.clone(), reply_anchor);
                id
            })
            .collect();
        Ok(ids)
    }
}

pub fn chat(id: ChatId, kind: ChatKind) -> Chat {
    Chat {
        id,
        kind,
        active: true,
        is_source: true,
        is_destination: true,
        self_send_enabled: false,
        in_paused: false,
        out_paused: false,
        edit_mode: EditMode::Off,
    }
}

pub fn entitled_subscription(chat_id: ChatId) -> Subscription {
    Subscription {
        chat_id,
        plan: "trial".to_string(),
        trial_until: chrono::Utc::now() + chrono::Duration::days(365),
        paid_until: None,
        stacking: false,
    }
}

pub fn unentitled_subscription(chat_id: ChatId) -> Subscription {
    Subscription {
        chat_id,
        plan: "trial".to_string(),
        trial_until: chrono::Utc::now() - chrono::Duration::days(1),
        paid_until: None,
        stacking: false,
    }
}

/// Every durable-store handle a test needs, plus the wired `Engine` and
/// its platform double.
pub struct Harness {
    pub engine: Engine,
    pub registry: Arc<SqliteRegistry>,
    pub send_log: Arc<SqliteSendLog>,
    pub entitlement: Arc<SqliteEntitlement>,
    pub restriction: Arc<SqliteRestrictionStore>,
    pub platform: Arc<MockPlatformClient>,
    /// Kept alive for the harness's lifetime — dropping it deletes the
    /// backing file.
    _db: tempfile::TempPath,
}

impl Harness {
    pub async fn active_destinations(&self, exclude: ChatId) -> Vec<Chat> {
        self.registry.active_destinations(exclude).await.unwrap()
    }
}

/// Build a fully-wired engine with fresh SQLite-backed stores and the
/// given config, seeding every chat in `chats` as entitled unless listed
/// in `unentitled`.
pub async fn build_harness(config: EngineConfig, chats: &[Chat], unentitled: &[ChatId]) -> Harness {
    let db = tempfile::NamedTempFile::new().expect("tempfile").into_temp_path();
    let path = db.to_str().expect("utf8 path").to_string();

    let registry = Arc::new(SqliteRegistry::new(Connection::open(&path).unwrap()).unwrap());
    let send_log = Arc::new(SqliteSendLog::new(Connection::open(&path).unwrap()).unwrap());
    let entitlement = Arc::new(
        SqliteEntitlement::new(Connection::open(&path).unwrap(), config.entitlement_cache_ttl).unwrap(),
    );
    let restriction = Arc::new(SqliteRestrictionStore::new(Connection::open(&path).unwrap()).unwrap());
    let alias = Arc::new(
        AliasService::new(
            Connection::open(&path).unwrap(),
            config.alias_salt.clone(),
            config.alias_cache_ttl,
        )
        .unwrap(),
    );

    for c in chats {
        registry.upsert(c).unwrap();
        let sub = if unentitled.contains(&c.id) {
            unentitled_subscription(c.id)
        } else {
            entitled_subscription(c.id)
        };
        entitlement.upsert(&sub).unwrap();
    }

    let platform = Arc::new(MockPlatformClient::default());

    let engine = Engine::wire(
        registry.clone() as Arc<dyn Registry>,
        send_log.clone() as Arc<dyn SendLog>,
        entitlement.clone() as Arc<dyn Entitlement>,
        restriction.clone() as Arc<dyn RestrictionStore>,
        alias,
        platform.clone() as Arc<dyn PlatformClient>,
        config,
    )
    .expect("engine wiring");

    Harness {
        engine,
        registry,
        send_log,
        entitlement,
        restriction,
        platform,
        _db: db,
    }
}

/// A config with every timer shrunk to millisecond scale so tests don't
/// wait on real-world durations; thresholds/ordering semantics are
/// untouched.
#[allow(dead_code)]
pub fn fast_config() -> EngineConfig {
    EngineConfig {
        cooldown_private: std::time::Duration::from_millis(20),
        cooldown_group: std::time::Duration::from_millis(20),
        album_idle: std::time::Duration::from_millis(80),
        album_hard_ttl: std::time::Duration::from_millis(500),
        nudge_cooldown: std::time::Duration::from_secs(86400),
        breaker_pause: std::time::Duration::from_millis(200),
        global_breaker_window: std::time::Duration::from_secs(60),
        global_breaker_pause: std::time::Duration::from_millis(200),
        queue_capacity: 100,
        worker_count: 4,
        ..EngineConfig::default()
    }
}

#[allow(dead_code)]
pub type Result<T> = EngineResult<T>;
