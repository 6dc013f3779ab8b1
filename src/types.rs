//! Core data model.

use serde::{Deserialize, Serialize};

/// Opaque platform chat id.
pub type ChatId = i64;
/// Opaque platform message id, scoped to a chat.
pub type MessageId = i64;
/// Opaque platform user id.
pub type UserId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Text,
    Photo,
    Video,
    Animation,
    Audio,
    Document,
    Voice,
    VideoNote,
    Sticker,
    /// Synthetic kind produced by the album buffer once parts are flushed.
    Album,
}

/// Kind-specific payload. For media kinds the handle is a platform-stable
/// opaque id that allows re-sending without re-uploading bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Payload {
    Text {
        body: String,
    },
    Media {
        kind: ContentKind,
        media_handle: String,
        /// Stable unique id of the *primary* attachment, used for fingerprinting.
        unique_id: String,
        caption: Option<String>,
    },
    /// Ordered parts of a flushed album; each part is itself a `Media` payload.
    Album(Vec<Payload>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyContext {
    /// The source message id this message replies to, in the *same* chat.
    pub source_message_id: MessageId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedMessage {
    pub source_chat: ChatId,
    pub source_message_id: MessageId,
    pub origin_user_id: Option<UserId>,
    pub album_id: Option<String>,
    pub kind: ContentKind,
    pub payload: Payload,
    pub reply_to: Option<ReplyContext>,
    pub arrived_at: chrono::DateTime<chrono::Utc>,
    /// For a flushed album (`kind == Album`), the source message id of each
    /// part in the same order as `Payload::Album`'s parts — each part gets
    /// its own SendLog row once sent, since a destination's grouped send
    /// returns one dest-message-id per part.
    pub album_member_ids: Option<Vec<MessageId>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
}

impl ChatKind {
    /// Per-chat cooldown bucket: private/channel chats get the short
    /// cooldown, group/supergroup chats get the long one.
    pub fn is_tight_cooldown(self) -> bool {
        matches!(self, ChatKind::Private | ChatKind::Channel)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditMode {
    Off,
    Resend,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: ChatId,
    pub kind: ChatKind,
    pub active: bool,
    pub is_source: bool,
    pub is_destination: bool,
    pub self_send_enabled: bool,
    pub in_paused: bool,
    pub out_paused: bool,
    pub edit_mode: EditMode,
}

impl Chat {
    pub fn cooldown(&self, config: &crate::config::EngineConfig) -> std::time::Duration {
        if self.kind.is_tight_cooldown() {
            config.cooldown_private
        } else {
            config.cooldown_group
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendLogEntry {
    pub source_chat: ChatId,
    pub source_message_id: MessageId,
    pub dest_chat: ChatId,
    pub dest_message_id: MessageId,
    pub source_user_id: Option<UserId>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub chat_id: ChatId,
    pub plan: String,
    pub trial_until: chrono::DateTime<chrono::Utc>,
    pub paid_until: Option<chrono::DateTime<chrono::Utc>>,
    pub stacking: bool,
}

impl Subscription {
    pub fn is_entitled_at(&self, at: chrono::DateTime<chrono::Utc>) -> bool {
        let paid = self.paid_until.unwrap_or(chrono::DateTime::<chrono::Utc>::MIN_UTC);
        self.trial_until.max(paid) >= at
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alias {
    pub user_id: UserId,
    pub token: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestrictionKind {
    Mute,
    Ban,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Restriction {
    pub user_id: UserId,
    pub kind: RestrictionKind,
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
    pub issuer: UserId,
}

impl Restriction {
    pub fn is_active_at(&self, at: chrono::DateTime<chrono::Utc>) -> bool {
        match self.kind {
            RestrictionKind::Ban => true,
            RestrictionKind::Mute => self.expires_at.is_none_or(|exp| exp > at),
        }
    }
}

/// A per-destination reply anchor, resolved by the Reply Resolver.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReplyAnchor {
    pub dest_message_id: MessageId,
    /// If true and the platform can't find `dest_message_id`, send anyway
    /// without threading rather than failing the whole send.
    pub accept_missing: bool,
}

/// Unit of work handed from the Distributor to the worker pool.
#[derive(Debug, Clone)]
pub struct SendTask {
    pub dest_chat: ChatId,
    pub source_chat: ChatId,
    pub source_message_id: MessageId,
    pub source_user_id: Option<UserId>,
    pub payload: Payload,
    pub reply_anchor: Option<ReplyAnchor>,
    pub signature: Option<String>,
    pub alias_tag: Option<String>,
    pub attempt: u32,
    /// Mirrors `NormalizedMessage::album_member_ids` for album sends.
    pub album_member_ids: Option<Vec<MessageId>>,
}
