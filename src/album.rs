//! Album buffer: groups media-group parts into one atomic send.
//!
//! Parts of one media group arrive as separate normalized messages sharing
//! an album id. The buffer appends parts and (re)arms a 1s idle timer on
//! every append; when the timer fires with no intervening append, the
//! buffered parts flush as one ordered `NormalizedMessage` of kind
//! `Album`. A hard 5s TTL from the *first* part caps latency/memory
//! regardless of idleness.
//!
//! Each buffered album tracks an epoch counter: a spawned idle task only
//! flushes if no append has bumped the epoch since it went to sleep, so a
//! timer armed before the latest append never fires spuriously.

use crate::types::{ContentKind, NormalizedMessage, Payload};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tracing::debug;

struct AlbumEntry {
    parts: Vec<NormalizedMessage>,
    epoch: u64,
    first_seen: tokio::time::Instant,
}

pub struct AlbumBuffer {
    entries: Arc<Mutex<HashMap<String, AlbumEntry>>>,
    idle: Duration,
    hard_ttl: Duration,
    out: mpsc::Sender<NormalizedMessage>,
}

impl AlbumBuffer {
    pub fn new(idle: Duration, hard_ttl: Duration, out: mpsc::Sender<NormalizedMessage>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            idle,
            hard_ttl,
            out,
        }
    }

    /// Append a part. `part.album_id` must be `Some`.
    pub async fn append(&self, part: NormalizedMessage) {
        let album_id = part
            .album_id
            .clone()
            .expect("append called with a non-album message");

        let epoch = {
            let mut entries = self.entries.lock().await;
            let entry = entries.entry(album_id.clone()).or_insert_with(|| AlbumEntry {
                parts: Vec::new(),
                epoch: 0,
                first_seen: tokio::time::Instant::now(),
            });
            entry.parts.push(part);
            entry.epoch += 1;
            entry.epoch
        };

        self.arm_idle(album_id.clone(), epoch);

        // First append also arms the hard TTL, which fires unconditionally.
        if epoch == 1 {
            self.arm_hard_ttl(album_id);
        }
    }

    fn arm_idle(&self, album_id: String, epoch: u64) {
        let entries = self.entries.clone();
        let idle = self.idle;
        let out = self.out.clone();
        tokio::spawn(async move {
            tokio::time::sleep(idle).await;
            flush_if_current(&entries, &out, &album_id, epoch).await;
        });
    }

    fn arm_hard_ttl(&self, album_id: String) {
        let entries = self.entries.clone();
        let hard_ttl = self.hard_ttl;
        let out = self.out.clone();
        tokio::spawn(async move {
            tokio::time::sleep(hard_ttl).await;
            // Hard TTL flushes unconditionally, regardless of epoch: memory
            // and latency are capped even under continuous idle-timer resets.
            let flushed = {
                let mut entries = entries.lock().await;
                entries.remove(&album_id)
            };
            if let Some(entry) = flushed {
                debug!(album_id, parts = entry.parts.len(), "album hard TTL flush");
                emit(&out, album_id, entry.parts).await;
            }
        });
    }
}

async fn flush_if_current(
    entries: &Arc<Mutex<HashMap<String, AlbumEntry>>>,
    out: &mpsc::Sender<NormalizedMessage>,
    album_id: &str,
    epoch: u64,
) {
    let flushed = {
        let mut entries = entries.lock().await;
        match entries.get(album_id) {
            Some(entry) if entry.epoch == epoch => entries.remove(album_id),
            _ => None,
        }
    };
    if let Some(entry) = flushed {
        debug!(album_id, parts = entry.parts.len(), "album idle flush");
        emit(out, album_id.to_string(), entry.parts).await;
    }
}

async fn emit(out: &mpsc::Sender<NormalizedMessage>, album_id: String, mut parts: Vec<NormalizedMessage>) {
    // Fairness: flush preserves arrival order.
    parts.sort_by_key(|p| p.source_message_id);
    let Some(first) = parts.first() else { return };
    let album = NormalizedMessage {
        source_chat: first.source_chat,
        source_message_id: first.source_message_id,
        origin_user_id: first.origin_user_id,
        album_id: Some(album_id),
        kind: ContentKind::Album,
        payload: Payload::Album(parts.iter().map(|p| p.payload.clone()).collect()),
        reply_to: first.reply_to.clone(),
        arrived_at: first.arrived_at,
        album_member_ids: Some(parts.iter().map(|p| p.source_message_id).collect()),
    };
    let _ = out.send(album).await;
}
