//! Normalizer: extracts a canonical record from a raw platform update.
//!
//! The concrete platform update type belongs to the ingress layer (out of
//! scope). `RawUpdate` is the minimal shape the
//! Normalizer needs handed to it: one attachment field per supported kind,
//! plus the generic text/caption/reply-to fields every platform update of
//! this shape carries.

use crate::types::{ContentKind, NormalizedMessage, Payload, ReplyContext};
use chrono::Utc;

/// A single media attachment as the ingress layer would hand it over:
/// an opaque re-sendable handle plus the stable unique id used for
/// fingerprinting.
#[derive(Debug, Clone)]
pub struct MediaAttachment {
    pub media_handle: String,
    pub unique_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct RawUpdate {
    pub source_chat: i64,
    pub source_message_id: i64,
    pub origin_user_id: Option<i64>,
    pub album_id: Option<String>,
    pub text: Option<String>,
    pub photo: Option<MediaAttachment>,
    pub video: Option<MediaAttachment>,
    pub animation: Option<MediaAttachment>,
    pub audio: Option<MediaAttachment>,
    pub document: Option<MediaAttachment>,
    pub voice: Option<MediaAttachment>,
    pub video_note: Option<MediaAttachment>,
    pub sticker: Option<MediaAttachment>,
    pub caption: Option<String>,
    /// Present only when the referenced message was sent by this bot in
    /// the same chat — the ingress layer is responsible for that check
    /// before handing the update over.
    pub reply_to_bot_message: Option<i64>,
    /// Updates with no content kind this normalizer understands (polls,
    /// service notices, inline-only updates) are skipped.
    pub unsupported: bool,
}

/// Extract a canonical [`NormalizedMessage`] from a raw update, or `None`
/// if the update carries no content kind this engine distributes.
pub fn normalize(update: RawUpdate) -> Option<NormalizedMessage> {
    if update.unsupported {
        return None;
    }

    let (kind, payload) = if let Some(body) = update.text {
        (ContentKind::Text, Payload::Text { body })
    } else if let Some(m) = update.photo {
        media_payload(ContentKind::Photo, m, update.caption.clone())
    } else if let Some(m) = update.video {
        media_payload(ContentKind::Video, m, update.caption.clone())
    } else if let Some(m) = update.animation {
        media_payload(ContentKind::Animation, m, update.caption.clone())
    } else if let Some(m) = update.audio {
        media_payload(ContentKind::Audio, m, update.caption.clone())
    } else if let Some(m) = update.document {
        media_payload(ContentKind::Document, m, update.caption.clone())
    } else if let Some(m) = update.voice {
        media_payload(ContentKind::Voice, m, update.caption.clone())
    } else if let Some(m) = update.video_note {
        media_payload(ContentKind::VideoNote, m, update.caption.clone())
    } else if let Some(m) = update.sticker {
        media_payload(ContentKind::Sticker, m, update.caption.clone())
    } else {
        return None;
    };

    Some(NormalizedMessage {
        source_chat: update.source_chat,
        source_message_id: update.source_message_id,
        origin_user_id: update.origin_user_id,
        album_id: update.album_id,
        kind,
        payload,
        reply_to: update
            .reply_to_bot_message
            .map(|id| ReplyContext { source_message_id: id }),
        arrived_at: Utc::now(),
        album_member_ids: None,
    })
}

fn media_payload(
    kind: ContentKind,
    attachment: MediaAttachment,
    caption: Option<String>,
) -> (ContentKind, Payload) {
    (
        kind,
        Payload::Media {
            kind,
            media_handle: attachment.media_handle,
            unique_id: attachment.unique_id,
            caption,
        },
    )
}
