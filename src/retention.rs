//! Retention sweeper: an hourly background task pruning SendLog rows past
//! their 48h retention window, as a detached `tokio::spawn` loop owning
//! its own sleep interval.

use crate::send_log::SendLog;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Spawn the background sweeper. The returned handle can be aborted on
/// shutdown; the loop itself never returns on its own.
pub fn spawn(send_log: Arc<dyn SendLog>, interval: Duration, window: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            let cutoff = Utc::now()
                - ChronoDuration::from_std(window).unwrap_or_else(|_| ChronoDuration::hours(48));
            match send_log.prune(cutoff).await {
                Ok(deleted) if deleted > 0 => {
                    info!(deleted, "retention sweep pruned send log rows");
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "retention sweep failed"),
            }
        }
    })
}
