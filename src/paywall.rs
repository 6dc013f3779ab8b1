//! Paywall gate: decides per (source chat, destination chat) whether
//! delivery is permitted.

use crate::entitlement::Entitlement;
use crate::types::{Chat, ChatId};
use chrono::Utc;
use moka::future::Cache;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    /// Suppressed because the destination/source paused flags say so —
    /// never nudges.
    PausedSuppress,
    /// Suppressed for lack of entitlement. `nudge` is `true` the first
    /// time this source chat has been suppressed in the last 24h.
    NotEntitled { nudge: bool },
}

/// `nudge:{chat}` — 24h cooldown. Construct once per `Engine` (via
/// [`NudgeCooldown`]) and share across every `distribute()` call: a fresh
/// cache per call would never actually suppress repeat nudges.
pub struct PaywallGate<'a> {
    entitlement: &'a dyn Entitlement,
    nudge_cooldown: &'a NudgeCooldown,
}

/// Long-lived nudge-cooldown cache, owned by the `Distributor` and handed
/// to a fresh `PaywallGate` on every `distribute()` call.
pub struct NudgeCooldown {
    cache: Cache<ChatId, ()>,
}

impl NudgeCooldown {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: Cache::builder().time_to_live(ttl).build(),
        }
    }
}

impl<'a> PaywallGate<'a> {
    pub fn new(entitlement: &'a dyn Entitlement, nudge_cooldown: &'a NudgeCooldown) -> Self {
        Self {
            entitlement,
            nudge_cooldown,
        }
    }

    pub async fn check(
        &self,
        source: &Chat,
        dest: &Chat,
    ) -> crate::error::EngineResult<GateDecision> {
        // Self-send is "always allowed (subject to self-send-enabled flag)"
        // per spec — that check stands ahead of the pause flags, which only
        // govern ordinary cross-chat delivery.
        if source.id == dest.id {
            return Ok(if source.self_send_enabled {
                GateDecision::Allow
            } else {
                GateDecision::PausedSuppress
            });
        }

        if dest.in_paused || source.out_paused {
            return Ok(GateDecision::PausedSuppress);
        }

        let entitled = self.entitlement.is_entitled(source.id, Utc::now()).await?;
        if entitled {
            return Ok(GateDecision::Allow);
        }

        let entry = self.nudge_cooldown.cache.entry(source.id).or_insert(()).await;
        Ok(GateDecision::NotEntitled {
            nudge: entry.is_fresh(),
        })
    }
}
