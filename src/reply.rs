//! Reply resolver: maps a reply-to target from source coordinates into
//! each destination's coordinates.
//!
//! Given a normalized message replying to a bot-delivered message, resolve
//! the per-destination reply anchor best-effort: a miss at any step still
//! lets the send proceed, just without threading. The one-hop
//! reverse-then-forward walk fans out across many destinations via the
//! send log instead of a single room's reply-chain.

use crate::send_log::SendLog;
use crate::types::{ChatId, MessageId, ReplyAnchor};

pub struct ReplyResolver<'a> {
    send_log: &'a dyn SendLog,
}

impl<'a> ReplyResolver<'a> {
    pub fn new(send_log: &'a dyn SendLog) -> Self {
        Self { send_log }
    }

    /// Resolve the reply anchor for a send to `dest_chat`, given the bot
    /// message `(reply_chat, reply_message_id)` the *inbound* message
    /// replied to.
    pub async fn resolve(
        &self,
        reply_chat: ChatId,
        reply_message_id: MessageId,
        dest_chat: ChatId,
    ) -> crate::error::EngineResult<Option<ReplyAnchor>> {
        let Some((origin_chat, origin_message_id, _origin_user)) =
            self.send_log.reverse_lookup(reply_chat, reply_message_id).await?
        else {
            // No mapping for the bot message being replied to: send without
            // an anchor rather than blocking delivery.
            return Ok(None);
        };

        let mapped = self
            .send_log
            .forward_lookup(origin_chat, origin_message_id)
            .await?;

        let anchor = mapped
            .into_iter()
            .find(|(chat, _)| *chat == dest_chat)
            .map(|(_, dest_message_id)| ReplyAnchor {
                dest_message_id,
                accept_missing: true,
            });

        Ok(anchor)
    }
}
