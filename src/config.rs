//! Engine tunables.
//!
//! Every knob has a sane default, and can be overridden with an
//! environment variable. The surrounding bot process owns its own
//! configuration loading (tokens, BotFather wiring); this struct only
//! covers the distribution engine's own literals.

use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Global sends/second across all destinations.
    pub global_rate_per_sec: u32,
    /// Minimum spacing between sends to the same private/channel destination.
    pub cooldown_private: Duration,
    /// Minimum spacing between sends to the same group/supergroup destination.
    pub cooldown_group: Duration,
    /// Consecutive per-chat send errors before the circuit breaker trips.
    pub breaker_error_threshold: u32,
    /// How long a tripped per-chat breaker stays open.
    pub breaker_pause: Duration,
    /// Rate-limit rejections within `global_breaker_window` that trip the global breaker.
    pub global_breaker_threshold: u32,
    pub global_breaker_window: Duration,
    /// How long the global breaker pause lasts once tripped.
    pub global_breaker_pause: Duration,
    /// Worker pool size.
    pub worker_count: usize,
    /// Bound on the distributor -> worker pool channel.
    pub queue_capacity: usize,
    /// Max send attempts (including the first) before a task is dropped.
    pub max_attempts: u32,
    /// Dedup marker TTL.
    pub dedup_ttl: Duration,
    /// Album idle flush timer.
    pub album_idle: Duration,
    /// Album hard TTL regardless of idleness.
    pub album_hard_ttl: Duration,
    /// SendLog retention window.
    pub retention_window: Duration,
    /// Retention sweep interval.
    pub retention_interval: Duration,
    /// Entitlement cache TTL.
    pub entitlement_cache_ttl: Duration,
    /// Alias cache TTL.
    pub alias_cache_ttl: Duration,
    /// Nudge cooldown per source chat.
    pub nudge_cooldown: Duration,
    /// Outbound text length cap.
    pub text_len_cap: usize,
    /// Outbound caption length cap.
    pub caption_len_cap: usize,
    /// Salt mixed into deterministic alias derivation. Stable for the life
    /// of an install; rotating it changes every alias.
    pub alias_salt: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            global_rate_per_sec: 25,
            cooldown_private: Duration::from_secs(1),
            cooldown_group: Duration::from_secs(3),
            breaker_error_threshold: 3,
            breaker_pause: Duration::from_secs(5 * 60),
            global_breaker_threshold: 5,
            global_breaker_window: Duration::from_secs(60),
            global_breaker_pause: Duration::from_secs(30),
            worker_count: 10,
            queue_capacity: 1000,
            max_attempts: 3,
            dedup_ttl: Duration::from_secs(24 * 60 * 60),
            album_idle: Duration::from_secs(1),
            album_hard_ttl: Duration::from_secs(5),
            retention_window: Duration::from_secs(48 * 60 * 60),
            retention_interval: Duration::from_secs(60 * 60),
            entitlement_cache_ttl: Duration::from_secs(5 * 60),
            alias_cache_ttl: Duration::from_secs(5 * 60),
            nudge_cooldown: Duration::from_secs(24 * 60 * 60),
            text_len_cap: 4096,
            caption_len_cap: 1024,
            alias_salt: "chat-relay-default-salt".to_string(),
        }
    }
}

impl EngineConfig {
    /// Build from environment variables, falling back to [`Default`] for
    /// anything unset or unparsable.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = env::var("RELAY_GLOBAL_RATE_PER_SEC")
            && let Ok(n) = val.parse::<u32>()
        {
            config.global_rate_per_sec = n;
        }
        if let Ok(val) = env::var("RELAY_WORKER_COUNT")
            && let Ok(n) = val.parse::<usize>()
        {
            config.worker_count = n;
        }
        if let Ok(val) = env::var("RELAY_QUEUE_CAPACITY")
            && let Ok(n) = val.parse::<usize>()
        {
            config.queue_capacity = n;
        }
        if let Ok(val) = env::var("RELAY_BREAKER_ERROR_THRESHOLD")
            && let Ok(n) = val.parse::<u32>()
        {
            config.breaker_error_threshold = n;
        }
        if let Ok(val) = env::var("RELAY_ALIAS_SALT") {
            config.alias_salt = val;
        }

        config
    }
}
