//! Scenario 3 (album intact): parts arrive close together and flush as
//! one grouped send per destination, one send-log row per part.

use crate::support::{build_harness, chat, fast_config};
use chat_relay::send_log::SendLog;
use chat_relay::types::ChatKind;
use chat_relay::{MediaAttachment, RawUpdate};
use std::time::Duration;

fn album_part(source_chat: i64, source_message_id: i64, album_id: &str) -> RawUpdate {
    RawUpdate {
        source_chat,
        source_message_id,
        album_id: Some(album_id.to_string()),
        photo: Some(MediaAttachment {
            media_handle: format!("handle-{source_message_id}"),
            unique_id: format!("unique-{source_message_id}"),
        }),
        ..Default::default()
    }
}

#[tokio::test]
async fn album_parts_flush_as_one_grouped_send_per_destination() {
    let chats = vec![
        chat(100, ChatKind::Group),
        chat(200, ChatKind::Group),
        chat(300, ChatKind::Group),
    ];
    let harness = build_harness(fast_config(), &chats, &[]).await;

    // Three parts arriving within a few ms of each other, well inside the
    // (shrunk) idle window.
    for id in 1..=3 {
        harness.engine.distribute(album_part(100, id, "G1")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    tokio::time::sleep(Duration::from_millis(250)).await;

    for dest in [200, 300] {
        for part_id in 1..=3 {
            let rows = harness.send_log.forward_lookup(100, part_id).await.unwrap();
            assert!(
                rows.iter().any(|(c, _)| *c == dest),
                "part {part_id} must be recorded against destination {dest}"
            );
        }
    }
}
