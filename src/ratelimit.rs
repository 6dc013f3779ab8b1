//! Rate limiter / circuit breaker: paces sends globally and per chat,
//! and trips temporary pauses on repeated failure.
//!
//! Four mechanisms compose into the engine's send path:
//!
//! - a global sliding-window token bucket (`acquire_global`)
//! - a per-chat minimum cooldown (`acquire_chat_cooldown`)
//! - a per-chat circuit breaker tripped by consecutive send errors
//! - a global circuit breaker tripped by a burst of platform rate-limit
//!   rejections
//!
//! The global bucket tracks a rolling window of send timestamps, and when
//! the window is full, sleeps until the oldest entry ages out rather than
//! rejecting the call outright.

use crate::types::ChatId;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

pub struct GlobalTokenBucket {
    capacity: u32,
    window: Duration,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl GlobalTokenBucket {
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            window: Duration::from_secs(1),
            timestamps: Mutex::new(VecDeque::new()),
        }
    }

    /// Blocks until there is capacity in the current 1s window, then
    /// records this send.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut ts = self.timestamps.lock().unwrap_or_else(|e| e.into_inner());
                let now = Instant::now();
                while let Some(front) = ts.front() {
                    if now.duration_since(*front) >= self.window {
                        ts.pop_front();
                    } else {
                        break;
                    }
                }
                if (ts.len() as u32) < self.capacity {
                    ts.push_back(now);
                    None
                } else {
                    let oldest = *ts.front().expect("len >= 1 when at capacity");
                    Some(self.window - now.duration_since(oldest))
                }
            };
            match wait {
                None => return,
                Some(d) => tokio::time::sleep(d).await,
            }
        }
    }
}

struct BreakerState {
    error_count: u32,
    tripped_until: Option<Instant>,
}

pub struct PerChatState {
    cooldown: Mutex<HashMap<ChatId, Instant>>,
    breaker: Mutex<HashMap<ChatId, BreakerState>>,
}

impl Default for PerChatState {
    fn default() -> Self {
        Self {
            cooldown: Mutex::new(HashMap::new()),
            breaker: Mutex::new(HashMap::new()),
        }
    }
}

impl PerChatState {
    /// Blocks until at least `cooldown` has elapsed since the last send to
    /// `chat`, then records this send's time.
    pub async fn acquire_cooldown(&self, chat: ChatId, cooldown: Duration) {
        loop {
            let wait = {
                let mut map = self.cooldown.lock().unwrap_or_else(|e| e.into_inner());
                let now = Instant::now();
                match map.get(&chat) {
                    Some(last) if now.duration_since(*last) < cooldown => {
                        Some(cooldown - now.duration_since(*last))
                    }
                    _ => {
                        map.insert(chat, now);
                        None
                    }
                }
            };
            match wait {
                None => return,
                Some(d) => tokio::time::sleep(d).await,
            }
        }
    }

    pub fn breaker_open(&self, chat: ChatId) -> bool {
        let mut map = self.breaker.lock().unwrap_or_else(|e| e.into_inner());
        match map.get_mut(&chat) {
            Some(state) => match state.tripped_until {
                Some(until) if Instant::now() < until => true,
                Some(_) => {
                    state.tripped_until = None;
                    state.error_count = 0;
                    false
                }
                None => false,
            },
            None => false,
        }
    }

    /// Returns `true` if this error just tripped the breaker.
    pub fn record_error(&self, chat: ChatId, threshold: u32, pause: Duration) -> bool {
        let mut map = self.breaker.lock().unwrap_or_else(|e| e.into_inner());
        let state = map.entry(chat).or_insert_with(|| BreakerState {
            error_count: 0,
            tripped_until: None,
        });
        state.error_count += 1;
        if state.error_count >= threshold && state.tripped_until.is_none() {
            state.tripped_until = Some(Instant::now() + pause);
            warn!(chat_id = chat, "per-chat circuit breaker tripped");
            true
        } else {
            false
        }
    }

    pub fn record_success(&self, chat: ChatId) {
        let mut map = self.breaker.lock().unwrap_or_else(|e| e.into_inner());
        map.remove(&chat);
    }
}

/// Global pause, tripped by a burst of `too-many-requests` rejections
/// across any destination within `window`.
pub struct GlobalBreaker {
    rejections: Mutex<VecDeque<Instant>>,
    paused_until: Mutex<Option<Instant>>,
}

impl Default for GlobalBreaker {
    fn default() -> Self {
        Self {
            rejections: Mutex::new(VecDeque::new()),
            paused_until: Mutex::new(None),
        }
    }
}

impl GlobalBreaker {
    /// Cheap read of the global pause flag — checked on the dispatch hot
    /// path.
    pub fn is_paused(&self) -> bool {
        let guard = self.paused_until.lock().unwrap_or_else(|e| e.into_inner());
        matches!(*guard, Some(until) if Instant::now() < until)
    }

    /// Record a platform rate-limit rejection; trips the global pause if
    /// `threshold` rejections land within `window`.
    pub fn record_rejection(&self, threshold: u32, window: Duration, pause: Duration) {
        let now = Instant::now();
        let mut rejections = self.rejections.lock().unwrap_or_else(|e| e.into_inner());
        rejections.push_back(now);
        while let Some(front) = rejections.front() {
            if now.duration_since(*front) > window {
                rejections.pop_front();
            } else {
                break;
            }
        }
        if rejections.len() as u32 >= threshold {
            let mut paused_until = self.paused_until.lock().unwrap_or_else(|e| e.into_inner());
            *paused_until = Some(now + pause);
            rejections.clear();
            warn!("global circuit breaker tripped");
        }
    }
}

/// Composes the global bucket, per-chat cooldown/breaker, and global
/// breaker into the one object the worker pool and distributor share.
#[derive(Default)]
pub struct RateLimiter {
    pub global_bucket: Option<GlobalTokenBucket>,
    pub per_chat: PerChatState,
    pub global_breaker: GlobalBreaker,
}

impl RateLimiter {
    pub fn new(global_capacity: u32) -> Self {
        Self {
            global_bucket: Some(GlobalTokenBucket::new(global_capacity)),
            per_chat: PerChatState::default(),
            global_breaker: GlobalBreaker::default(),
        }
    }

    pub async fn acquire_global(&self) {
        if let Some(bucket) = &self.global_bucket {
            bucket.acquire().await;
        }
    }
}
