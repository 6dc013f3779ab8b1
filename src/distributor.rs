//! Fan-out entry point: turns one normalized message into a `SendTask` per
//! eligible destination and hands them to the worker pool's bounded queue.
//! Backpressure comes for free from awaiting a bounded channel send
//! rather than spawning unboundedly per event.

use crate::alias::AliasService;
use crate::config::EngineConfig;
use crate::entitlement::Entitlement;
use crate::error::{EngineError, EngineResult};
use crate::fingerprint::{self, DedupStore};
use crate::paywall::{GateDecision, NudgeCooldown, PaywallGate};
use crate::ratelimit::RateLimiter;
use crate::registry::Registry;
use crate::reply::ReplyResolver;
use crate::send_log::SendLog;
use crate::types::{Chat, ChatId, NormalizedMessage, Payload, SendTask};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub struct Distributor {
    registry: Arc<dyn Registry>,
    entitlement: Arc<dyn Entitlement>,
    send_log: Arc<dyn SendLog>,
    dedup: DedupStore,
    alias: Arc<AliasService>,
    rate_limiter: Arc<RateLimiter>,
    queue: mpsc::Sender<SendTask>,
    nudge_cooldown: NudgeCooldown,
}

impl Distributor {
    pub fn new(
        registry: Arc<dyn Registry>,
        entitlement: Arc<dyn Entitlement>,
        send_log: Arc<dyn SendLog>,
        dedup: DedupStore,
        alias: Arc<AliasService>,
        rate_limiter: Arc<RateLimiter>,
        queue: mpsc::Sender<SendTask>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            registry,
            entitlement,
            send_log,
            dedup,
            alias,
            rate_limiter,
            queue,
            nudge_cooldown: NudgeCooldown::new(config.nudge_cooldown),
        }
    }

    /// Distribute one normalized message to every active destination other
    /// than its source, subject to the global pause, per-destination
    /// paywall gate, and dedup.
    pub async fn distribute(&self, message: NormalizedMessage) -> EngineResult<()> {
        if self.rate_limiter.global_breaker.is_paused() {
            debug!(
                chat_id = message.source_chat,
                "dropping message, global breaker paused"
            );
            return Ok(());
        }

        let Some(source) = self.registry.get_chat(message.source_chat).await? else {
            warn!(chat_id = message.source_chat, "source chat not registered");
            return Ok(());
        };

        let fp = fingerprint::fingerprint(message.kind, &message.payload);
        if !self.dedup.test_and_set(message.source_chat, &fp).await {
            debug!(chat_id = message.source_chat, "dropping duplicate message");
            return Ok(());
        }

        let alias_tag = match message.origin_user_id {
            Some(uid) => Some(self.alias.alias_for(uid).await?),
            None => None,
        };

        let exclude = if source.self_send_enabled {
            ChatId::MIN
        } else {
            source.id
        };
        let destinations = self.registry.active_destinations(exclude).await?;

        let gate = PaywallGate::new(self.entitlement.as_ref(), &self.nudge_cooldown);

        let mut nudge_due = false;
        let mut missed = 0u32;

        for dest in destinations {
            match gate.check(&source, &dest).await? {
                GateDecision::Allow => {}
                GateDecision::PausedSuppress => continue,
                GateDecision::NotEntitled { nudge } => {
                    missed += 1;
                    nudge_due |= nudge;
                    continue;
                }
            }

            let reply_anchor = match &message.reply_to {
                Some(ctx) => {
                    ReplyResolver::new(self.send_log.as_ref())
                        .resolve(message.source_chat, ctx.source_message_id, dest.id)
                        .await?
                }
                None => None,
            };

            let task = self.build_task(&message, &dest, reply_anchor, alias_tag.clone());

            self.queue
                .send(task)
                .await
                .map_err(|_| EngineError::QueueClosed)?;
        }

        if nudge_due {
            debug!(chat_id = source.id, missed, "entitlement nudge due");
            self.queue
                .send(Self::nudge_task(source.id, missed))
                .await
                .map_err(|_| EngineError::QueueClosed)?;
        }

        Ok(())
    }

    /// Build the one-per-24h nudge message telling a non-entitled source
    /// chat how many messages it just failed to fan out.
    fn nudge_task(source_chat: ChatId, missed: u32) -> SendTask {
        SendTask {
            dest_chat: source_chat,
            source_chat,
            source_message_id: 0,
            source_user_id: None,
            payload: Payload::Text {
                body: format!("You missed {missed} messages — subscribe to keep sending"),
            },
            reply_anchor: None,
            signature: None,
            alias_tag: None,
            attempt: 0,
            album_member_ids: None,
        }
    }

    fn build_task(
        &self,
        message: &NormalizedMessage,
        dest: &Chat,
        reply_anchor: Option<crate::types::ReplyAnchor>,
        alias_tag: Option<String>,
    ) -> SendTask {
        SendTask {
            dest_chat: dest.id,
            source_chat: message.source_chat,
            source_message_id: message.source_message_id,
            source_user_id: message.origin_user_id,
            payload: message.payload.clone(),
            reply_anchor,
            signature: None,
            alias_tag,
            attempt: 0,
            album_member_ids: message.album_member_ids.clone(),
        }
    }
}
