pub mod alias;
pub mod album;
pub mod config;
pub mod distributor;
pub mod entitlement;
pub mod error;
pub mod fingerprint;
pub mod normalize;
pub mod paywall;
pub mod platform;
pub mod ratelimit;
pub mod registry;
pub mod reply;
pub mod restriction;
pub mod retention;
pub mod send_log;
pub mod types;
pub mod worker;

pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use normalize::{normalize, MediaAttachment, RawUpdate};
pub use platform::{PlatformClient, PlatformError};
pub use types::{Chat, ChatKind, EditMode, NormalizedMessage};

use alias::AliasService;
use album::AlbumBuffer;
use distributor::Distributor;
use entitlement::{Entitlement, SqliteEntitlement};
use ratelimit::RateLimiter;
use registry::{Registry, SqliteRegistry};
use restriction::{RestrictionStore, SqliteRestrictionStore};
use rusqlite::Connection;
use send_log::{SendLog, SqliteSendLog};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use worker::WorkerPool;

/// Wires every component into the running distribution pipeline: the only
/// entry points a handler layer needs are [`Engine::distribute`] and
/// [`Engine::propagate_edit`]. `Engine::new` assembles managed state and
/// spawns the background tasks (album relay, worker pool, retention
/// sweep) the pipeline needs at startup.
pub struct Engine {
    registry: Arc<dyn Registry>,
    send_log: Arc<dyn SendLog>,
    entitlement: Arc<dyn Entitlement>,
    restriction: Arc<dyn RestrictionStore>,
    alias: Arc<AliasService>,
    album: AlbumBuffer,
    distributor: Arc<Distributor>,
    dispatch_queue: mpsc::Sender<types::SendTask>,
    _album_relay: JoinHandle<()>,
    _workers: Vec<JoinHandle<()>>,
    _retention: JoinHandle<()>,
}

impl Engine {
    /// Open (or create) the durable store at `db_path` and spawn the
    /// worker pool, album relay, and retention sweeper.
    pub fn new(
        db_path: &str,
        platform: Arc<dyn PlatformClient>,
        config: EngineConfig,
    ) -> EngineResult<Self> {
        if let Some(parent) = std::path::Path::new(db_path).parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let registry: Arc<dyn Registry> =
            Arc::new(SqliteRegistry::new(Connection::open(db_path)?)?);
        let send_log: Arc<dyn SendLog> =
            Arc::new(SqliteSendLog::new(Connection::open(db_path)?)?);
        let entitlement: Arc<dyn Entitlement> = Arc::new(SqliteEntitlement::new(
            Connection::open(db_path)?,
            config.entitlement_cache_ttl,
        )?);
        let restriction: Arc<dyn RestrictionStore> =
            Arc::new(SqliteRestrictionStore::new(Connection::open(db_path)?)?);
        let alias = Arc::new(AliasService::new(
            Connection::open(db_path)?,
            config.alias_salt.clone(),
            config.alias_cache_ttl,
        )?);

        Self::wire(registry, send_log, entitlement, restriction, alias, platform, config)
    }

    /// Wire an `Engine` from already-constructed stores. Exposed so tests
    /// (and embedders with their own connection-pooling story) can supply
    /// their own `Registry`/`SendLog`/`Entitlement`/`RestrictionStore`
    /// implementations.
    pub fn wire(
        registry: Arc<dyn Registry>,
        send_log: Arc<dyn SendLog>,
        entitlement: Arc<dyn Entitlement>,
        restriction: Arc<dyn RestrictionStore>,
        alias: Arc<AliasService>,
        platform: Arc<dyn PlatformClient>,
        config: EngineConfig,
    ) -> EngineResult<Self> {
        let rate_limiter = Arc::new(RateLimiter::new(config.global_rate_per_sec));
        let dedup = fingerprint::DedupStore::new(config.dedup_ttl);

        let (dispatch_tx, dispatch_rx) = mpsc::channel(config.queue_capacity);

        let distributor = Arc::new(Distributor::new(
            registry.clone(),
            entitlement.clone(),
            send_log.clone(),
            dedup,
            alias.clone(),
            rate_limiter.clone(),
            dispatch_tx.clone(),
            &config,
        ));

        let (album_tx, mut album_rx) = mpsc::channel(config.queue_capacity);
        let album = AlbumBuffer::new(config.album_idle, config.album_hard_ttl, album_tx);

        let album_relay = {
            let distributor = distributor.clone();
            tokio::spawn(async move {
                while let Some(message) = album_rx.recv().await {
                    if let Err(e) = distributor.distribute(message).await {
                        warn!(error = %e, "album distribution failed");
                    }
                }
            })
        };

        let pool = Arc::new(WorkerPool::new(
            registry.clone(),
            platform,
            send_log.clone(),
            rate_limiter,
            dispatch_tx.clone(),
            &config,
        ));
        let workers = pool.spawn(config.worker_count, dispatch_rx);

        let retention = retention::spawn(send_log.clone(), config.retention_interval, config.retention_window);

        Ok(Self {
            registry,
            send_log,
            entitlement,
            restriction,
            alias,
            album,
            distributor,
            dispatch_queue: dispatch_tx,
            _album_relay: album_relay,
            _workers: workers,
            _retention: retention,
        })
    }

    /// The only inbound entry point for fresh content, taking the ingress
    /// layer's raw shape and normalizing it first.
    pub async fn distribute(&self, update: RawUpdate) -> EngineResult<()> {
        let Some(message) = normalize(update) else {
            return Ok(());
        };
        self.ingest(message).await
    }

    /// Feed an already-normalized message into the pipeline directly —
    /// useful for callers (and tests) that construct `NormalizedMessage`
    /// themselves instead of going through `normalize`.
    pub async fn ingest(&self, message: NormalizedMessage) -> EngineResult<()> {
        if let Some(uid) = message.origin_user_id
            && self.restriction.is_restricted(uid, chrono::Utc::now()).await?
        {
            debug!(user_id = uid, "dropping message from muted/banned user");
            return Ok(());
        }

        if message.album_id.is_some() {
            self.album.append(message).await;
            Ok(())
        } else {
            self.distributor.distribute(message).await
        }
    }

    /// Re-deliver an edited message to every destination the original
    /// fanned out to, per `edit-mode = resend`. Uses the send log's
    /// forward index to address the destination set; destinations with no
    /// surviving mapping (pruned or never delivered) are silently skipped.
    pub async fn propagate_edit(
        &self,
        original_source_chat: types::ChatId,
        original_source_message_id: types::MessageId,
        edited: NormalizedMessage,
    ) -> EngineResult<()> {
        let targets = self
            .send_log
            .forward_lookup(original_source_chat, original_source_message_id)
            .await?;
        if targets.is_empty() {
            return Ok(());
        }

        let alias_tag = match edited.origin_user_id {
            Some(uid) => Some(self.alias.alias_for(uid).await?),
            None => None,
        };

        for (dest_chat, _dest_message_id) in targets {
            let task = types::SendTask {
                dest_chat,
                source_chat: edited.source_chat,
                source_message_id: edited.source_message_id,
                source_user_id: edited.origin_user_id,
                payload: edited.payload.clone(),
                reply_anchor: None,
                signature: None,
                alias_tag: alias_tag.clone(),
                attempt: 0,
                album_member_ids: None,
            };
            if self.dispatch_queue.send(task).await.is_err() {
                return Err(EngineError::QueueClosed);
            }
        }

        Ok(())
    }

    pub fn registry(&self) -> &Arc<dyn Registry> {
        &self.registry
    }

    pub fn send_log(&self) -> &Arc<dyn SendLog> {
        &self.send_log
    }

    pub fn entitlement(&self) -> &Arc<dyn Entitlement> {
        &self.entitlement
    }

    pub fn restriction(&self) -> &Arc<dyn RestrictionStore> {
        &self.restriction
    }
}
