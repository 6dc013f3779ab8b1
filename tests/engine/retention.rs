//! Retention-bound invariant: the background sweeper prunes send log rows
//! once they age past the retention window.

use crate::support::{build_harness, chat, fast_config};
use chat_relay::send_log::SendLog;
use chat_relay::types::ChatKind;
use chat_relay::RawUpdate;
use std::time::Duration;

#[tokio::test]
async fn sweeper_prunes_rows_past_the_retention_window() {
    let mut config = fast_config();
    config.retention_window = Duration::from_millis(50);
    config.retention_interval = Duration::from_millis(30);

    let chats = vec![chat(100, ChatKind::Group), chat(200, ChatKind::Group)];
    let harness = build_harness(config, &chats, &[]).await;

    harness
        .engine
        .distribute(RawUpdate {
            source_chat: 100,
            source_message_id: 1,
            text: Some("hi".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

    // The row is younger than the 50ms window when the sweeper's first
    // tick (at ~30ms) runs, so it should still be there.
    tokio::time::sleep(Duration::from_millis(45)).await;
    assert!(
        !harness.send_log.forward_lookup(100, 1).await.unwrap().is_empty(),
        "row exists before it ages out"
    );

    // By the second tick (~60ms) the row is older than the retention
    // window and the sweeper should have pruned it.
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(
        harness.send_log.forward_lookup(100, 1).await.unwrap().is_empty(),
        "sweeper has pruned the row after the retention window elapsed"
    );
}
