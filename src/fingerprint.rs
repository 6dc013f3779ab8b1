//! Fingerprinter / dedup: derives a stable content fingerprint and
//! suppresses recently-seen duplicates.
//!
//! The dedup marker store needs atomic test-and-set semantics with a TTL —
//! exactly what `moka`'s `entry()` API gives us (`is_fresh()` tells us
//! whether *this* call inserted the marker or found one already there),
//! so no hand-rolled locking is needed here.

use crate::types::{ContentKind, Payload};
use moka::future::Cache;
use sha2::{Digest, Sha256};
use std::time::Duration;
use unicode_normalization::UnicodeNormalization;

pub fn fingerprint(kind: ContentKind, payload: &Payload) -> String {
    match payload {
        Payload::Text { body } => text_fingerprint(body),
        Payload::Media { unique_id, .. } => unique_id.clone(),
        Payload::Album(parts) => {
            let joined: String = parts
                .iter()
                .map(|p| fingerprint(kind, p))
                .collect::<Vec<_>>()
                .join("|");
            hex_sha256(joined.as_bytes())
        }
    }
}

fn text_fingerprint(body: &str) -> String {
    let normalized: String = body.trim_end().nfc().collect();
    hex_sha256(normalized.as_bytes())
}

fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// `dedup:{chat}:{fp}` — 24h TTL test-and-set marker.
pub struct DedupStore {
    cache: Cache<(i64, String), ()>,
}

impl DedupStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: Cache::builder().time_to_live(ttl).build(),
        }
    }

    /// Returns `true` if this is the first time this (chat, fingerprint)
    /// pair has been seen within the TTL window — i.e. the caller should
    /// proceed. Returns `false` if a marker already existed — the caller
    /// should drop the message.
    pub async fn test_and_set(&self, chat_id: i64, fp: &str) -> bool {
        let key = (chat_id, fp.to_string());
        let entry = self.cache.entry(key).or_insert(()).await;
        entry.is_fresh()
    }
}
