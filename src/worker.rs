//! Worker pool: a fixed set of long-lived tasks draining the bounded
//! dispatch queue, each executing one `SendTask` against the platform
//! client and folding the outcome into rate-limiter/registry state.
//! Workers never propagate a send error upward; they log it structured
//! and let the rate limiter and registry carry the consequence.

use crate::config::EngineConfig;
use crate::platform::{PlatformClient, RecoveryPolicy};
use crate::ratelimit::RateLimiter;
use crate::registry::Registry;
use crate::send_log::SendLog;
use crate::types::{ChatKind, Payload, SendTask};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

pub struct WorkerPool {
    registry: Arc<dyn Registry>,
    platform: Arc<dyn PlatformClient>,
    send_log: Arc<dyn SendLog>,
    rate_limiter: Arc<RateLimiter>,
    queue: mpsc::Sender<SendTask>,
    max_attempts: u32,
    text_len_cap: usize,
    caption_len_cap: usize,
    cooldown_private: std::time::Duration,
    cooldown_group: std::time::Duration,
    breaker_error_threshold: u32,
    breaker_pause: std::time::Duration,
    global_breaker_threshold: u32,
    global_breaker_window: std::time::Duration,
    global_breaker_pause: std::time::Duration,
}

impl WorkerPool {
    pub fn new(
        registry: Arc<dyn Registry>,
        platform: Arc<dyn PlatformClient>,
        send_log: Arc<dyn SendLog>,
        rate_limiter: Arc<RateLimiter>,
        queue: mpsc::Sender<SendTask>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            registry,
            platform,
            send_log,
            rate_limiter,
            queue,
            max_attempts: config.max_attempts,
            text_len_cap: config.text_len_cap,
            caption_len_cap: config.caption_len_cap,
            cooldown_private: config.cooldown_private,
            cooldown_group: config.cooldown_group,
            breaker_error_threshold: config.breaker_error_threshold,
            breaker_pause: config.breaker_pause,
            global_breaker_threshold: config.global_breaker_threshold,
            global_breaker_window: config.global_breaker_window,
            global_breaker_pause: config.global_breaker_pause,
        }
    }

    /// Spawn `count` long-lived workers draining `inbox`. Returns their
    /// join handles so callers can observe a clean shutdown.
    pub fn spawn(self: Arc<Self>, count: usize, inbox: mpsc::Receiver<SendTask>) -> Vec<tokio::task::JoinHandle<()>> {
        let inbox = Arc::new(tokio::sync::Mutex::new(inbox));
        (0..count)
            .map(|id| {
                let pool = self.clone();
                let inbox = inbox.clone();
                tokio::spawn(async move { pool.run(id, inbox).await })
            })
            .collect()
    }

    async fn run(&self, worker_id: usize, inbox: Arc<tokio::sync::Mutex<mpsc::Receiver<SendTask>>>) {
        loop {
            let task = {
                let mut inbox = inbox.lock().await;
                inbox.recv().await
            };
            let Some(task) = task else {
                info!(worker_id, "inbox closed, worker exiting");
                return;
            };
            self.handle(task).await;
        }
    }

    async fn handle(&self, mut task: SendTask) {
        if self.rate_limiter.per_chat.breaker_open(task.dest_chat) {
            self.requeue_after(task, self.breaker_pause).await;
            return;
        }

        self.rate_limiter.acquire_global().await;

        let cooldown = match self.registry.get_chat(task.dest_chat).await {
            Ok(Some(chat)) => chat_cooldown(chat.kind, self.cooldown_private, self.cooldown_group),
            Ok(None) => return,
            Err(e) => {
                error!(chat_id = task.dest_chat, error = %e, "registry lookup failed");
                return;
            }
        };
        self.rate_limiter
            .per_chat
            .acquire_cooldown(task.dest_chat, cooldown)
            .await;

        let payload = compose_payload(&task, self.text_len_cap, self.caption_len_cap);

        let outcome = match &payload {
            Payload::Album(parts) => self
                .platform
                .send_media_group(task.dest_chat, parts, task.reply_anchor)
                .await
                .map(|ids| ids.into_iter().collect::<Vec<_>>()),
            other => self
                .platform
                .send(task.dest_chat, other, task.reply_anchor)
                .await
                .map(|id| vec![id]),
        };

        match outcome {
            Ok(dest_message_ids) => {
                self.rate_limiter.per_chat.record_success(task.dest_chat);
                let source_ids = match &task.album_member_ids {
                    Some(ids) if ids.len() == dest_message_ids.len() => ids.clone(),
                    _ => vec![task.source_message_id; dest_message_ids.len()],
                };
                for (dest_message_id, source_message_id) in dest_message_ids.into_iter().zip(source_ids) {
                    if let Err(e) = self
                        .send_log
                        .record(
                            task.source_chat,
                            source_message_id,
                            task.dest_chat,
                            dest_message_id,
                            task.source_user_id,
                        )
                        .await
                    {
                        error!(chat_id = task.dest_chat, error = %e, "send log write failed");
                    }
                }
            }
            Err(platform_err) => {
                let dest_chat = task.dest_chat;
                warn!(
                    chat_id = dest_chat,
                    error = %platform_err,
                    attempt = task.attempt,
                    "send failed"
                );
                match platform_err.policy() {
                    RecoveryPolicy::Retry => {
                        if let crate::platform::PlatformError::TooManyRequests { retry_after } =
                            &platform_err
                        {
                            self.rate_limiter.global_breaker.record_rejection(
                                self.global_breaker_threshold,
                                self.global_breaker_window,
                                self.global_breaker_pause,
                            );
                            task.attempt += 1;
                            if task.attempt < self.max_attempts {
                                self.requeue_after(task, *retry_after).await;
                            } else {
                                warn!(chat_id = dest_chat, "dropping task, attempts exhausted");
                            }
                        } else {
                            task.attempt += 1;
                            if task.attempt < self.max_attempts {
                                self.requeue_after(task, std::time::Duration::from_secs(1)).await;
                            }
                        }
                    }
                    RecoveryPolicy::DestinationFatal => {
                        if let Err(e) = self.registry.deactivate(dest_chat).await {
                            error!(chat_id = dest_chat, error = %e, "deactivate failed");
                        }
                    }
                    RecoveryPolicy::Readdress => {
                        if let crate::platform::PlatformError::Migrated { new_id } = platform_err {
                            if let Err(e) = self.registry.rename(dest_chat, new_id).await {
                                error!(chat_id = dest_chat, error = %e, "rename failed");
                            } else if task.attempt == 0 {
                                task.dest_chat = new_id;
                                task.attempt += 1;
                                self.requeue_now(task).await;
                            }
                        }
                    }
                    RecoveryPolicy::MessageFatal => {
                        warn!(chat_id = dest_chat, "dropping message, bad request");
                        let just_tripped = self.rate_limiter.per_chat.record_error(
                            dest_chat,
                            self.breaker_error_threshold,
                            self.breaker_pause,
                        );
                        if just_tripped {
                            warn!(chat_id = dest_chat, "destination breaker tripped");
                        }
                    }
                }
            }
        }
    }

    async fn requeue_now(&self, task: SendTask) {
        if self.queue.send(task).await.is_err() {
            error!("dispatch queue closed, dropping requeued task");
        }
    }

    async fn requeue_after(&self, task: SendTask, delay: std::time::Duration) {
        let queue = self.queue.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = queue.send(task).await;
        });
    }
}

fn chat_cooldown(
    kind: ChatKind,
    cooldown_private: std::time::Duration,
    cooldown_group: std::time::Duration,
) -> std::time::Duration {
    if kind.is_tight_cooldown() {
        cooldown_private
    } else {
        cooldown_group
    }
}

/// Append alias tag and signature (when present) to the text body / media
/// caption, truncating the body to respect the length cap while preserving
/// the suffix.
fn compose_payload(task: &SendTask, text_len_cap: usize, caption_len_cap: usize) -> Payload {
    match &task.payload {
        Payload::Text { body } => Payload::Text {
            body: with_suffix(body, &task.alias_tag, &task.signature, text_len_cap),
        },
        Payload::Media {
            kind,
            media_handle,
            unique_id,
            caption,
        } => Payload::Media {
            kind: *kind,
            media_handle: media_handle.clone(),
            unique_id: unique_id.clone(),
            caption: caption
                .as_ref()
                .map(|c| with_suffix(c, &task.alias_tag, &task.signature, caption_len_cap)),
        },
        Payload::Album(parts) => Payload::Album(
            parts
                .iter()
                .map(|p| compose_part(p, &task.alias_tag, &task.signature, caption_len_cap))
                .collect(),
        ),
    }
}

fn compose_part(
    part: &Payload,
    alias_tag: &Option<String>,
    signature: &Option<String>,
    caption_len_cap: usize,
) -> Payload {
    match part {
        Payload::Media {
            kind,
            media_handle,
            unique_id,
            caption,
        } => Payload::Media {
            kind: *kind,
            media_handle: media_handle.clone(),
            unique_id: unique_id.clone(),
            caption: caption
                .as_ref()
                .map(|c| with_suffix(c, alias_tag, signature, caption_len_cap)),
        },
        other => other.clone(),
    }
}

fn with_suffix(body: &str, alias_tag: &Option<String>, signature: &Option<String>, cap: usize) -> String {
    let mut suffix = String::new();
    if let Some(alias) = alias_tag {
        suffix.push_str("\n— ");
        suffix.push_str(alias);
    }
    if let Some(sig) = signature {
        suffix.push('\n');
        suffix.push_str(sig);
    }

    let budget = cap.saturating_sub(suffix.chars().count());
    let truncated: String = body.chars().take(budget).collect();
    format!("{truncated}{suffix}")
}
