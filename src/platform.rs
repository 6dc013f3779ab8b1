//! The platform client is an external collaborator: this module only
//! defines the trait surface the engine consumes, plus the structured
//! error taxonomy that drives worker retry/deactivate/re-address/drop
//! policy. No concrete Telegram (or any other platform) client ships
//! here.

use crate::types::{ChatId, MessageId, Payload, ReplyAnchor};
use async_trait::async_trait;
use std::time::Duration;

#[derive(Debug, Clone, thiserror::Error)]
pub enum PlatformError {
    #[error("too many requests, retry after {retry_after:?}")]
    TooManyRequests { retry_after: Duration },
    #[error("forbidden")]
    Forbidden,
    #[error("chat not found")]
    ChatNotFound,
    #[error("chat migrated to {new_id}")]
    Migrated { new_id: ChatId },
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("network error: {0}")]
    Network(String),
}

impl PlatformError {
    /// Classification used by the worker to pick a recovery policy
    /// drop.
    pub fn policy(&self) -> RecoveryPolicy {
        match self {
            PlatformError::TooManyRequests { .. } | PlatformError::Network(_) => {
                RecoveryPolicy::Retry
            }
            PlatformError::Forbidden | PlatformError::ChatNotFound => {
                RecoveryPolicy::DestinationFatal
            }
            PlatformError::Migrated { .. } => RecoveryPolicy::Readdress,
            PlatformError::BadRequest(_) => RecoveryPolicy::MessageFatal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryPolicy {
    Retry,
    DestinationFatal,
    Readdress,
    MessageFatal,
}

/// One outbound send's result, as the platform reports it.
pub type SendOutcome = Result<MessageId, PlatformError>;

/// Abstract operations against the messaging platform.
/// Implementations are responsible for mapping `Payload` onto the concrete
/// `send-*` wire call matching its content kind.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    async fn send(
        &self,
        dest_chat: ChatId,
        payload: &Payload,
        reply_anchor: Option<ReplyAnchor>,
    ) -> SendOutcome;

    /// Send a flushed album as one grouped operation (up to 10 media).
    /// Returns one message id per part, in album order.
    async fn send_media_group(
        &self,
        dest_chat: ChatId,
        parts: &[Payload],
        reply_anchor: Option<ReplyAnchor>,
    ) -> Result<Vec<MessageId>, PlatformError>;
}
