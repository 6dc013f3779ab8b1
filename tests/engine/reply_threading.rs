//! Scenario 4 (reply threading): a reply to a bot-delivered message is
//! mapped back to its origin, then re-addressed per destination,
//! best-effort.

use crate::support::{build_harness, chat, fast_config};
use chat_relay::send_log::SendLog;
use chat_relay::types::ChatKind;
use chat_relay::RawUpdate;
use std::time::Duration;

fn reply_update(source_chat: i64, source_message_id: i64, reply_to: i64) -> RawUpdate {
    RawUpdate {
        source_chat,
        source_message_id,
        text: Some("re".to_string()),
        reply_to_bot_message: Some(reply_to),
        ..Default::default()
    }
}

#[tokio::test]
async fn reply_is_threaded_where_a_mapping_exists_and_plain_otherwise() {
    let chats = vec![
        chat(100, ChatKind::Group),
        chat(200, ChatKind::Group),
        chat(300, ChatKind::Group),
    ];
    let harness = build_harness(fast_config(), &chats, &[]).await;

    // Bot message 500 in chat 200, and 700 in chat 300, both originated
    // from (100, 9001).
    harness.send_log.record(100, 9001, 200, 500, Some(7)).await.unwrap();
    harness.send_log.record(100, 9001, 300, 700, Some(7)).await.unwrap();

    // A user in chat 200 replies to bot message 500.
    harness
        .engine
        .distribute(reply_update(200, 55, 500))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;

    let to_300 = harness.platform.sent_to(300);
    assert_eq!(to_300.len(), 1);
    let anchor = to_300[0].reply_anchor.expect("300 has a mapping for the origin");
    assert_eq!(anchor.dest_message_id, 700);

    let to_100 = harness.platform.sent_to(100);
    assert_eq!(to_100.len(), 1, "delivery still proceeds with no mapping for 100");
    assert!(to_100[0].reply_anchor.is_none());
}

#[tokio::test]
async fn reply_to_an_unmapped_message_still_delivers_without_an_anchor() {
    let chats = vec![chat(100, ChatKind::Group), chat(200, ChatKind::Group)];
    let harness = build_harness(fast_config(), &chats, &[]).await;

    harness
        .engine
        .distribute(reply_update(100, 55, 999))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;

    let to_200 = harness.platform.sent_to(200);
    assert_eq!(to_200.len(), 1, "reply resolution miss never blocks delivery");
    assert!(to_200[0].reply_anchor.is_none());
}
