//! Scenario 6 (destination lost): a `forbidden` response deactivates the
//! destination and stops further delivery to it without affecting others.

use crate::support::{build_harness, chat, fast_config};
use chat_relay::platform::PlatformError;
use chat_relay::registry::Registry;
use chat_relay::types::ChatKind;
use chat_relay::RawUpdate;
use std::time::Duration;

fn text_update(source_chat: i64, source_message_id: i64, body: &str) -> RawUpdate {
    RawUpdate {
        source_chat,
        source_message_id,
        text: Some(body.to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn forbidden_deactivates_the_destination_and_drops_further_tasks() {
    let chats = vec![
        chat(100, ChatKind::Group),
        chat(200, ChatKind::Group),
        chat(300, ChatKind::Group),
    ];
    let harness = build_harness(fast_config(), &chats, &[]).await;

    harness.platform.queue_error(200, PlatformError::Forbidden);

    harness.engine.distribute(text_update(100, 1, "first")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;

    let chat_200 = harness.registry.get_chat(200).await.unwrap().expect("chat exists");
    assert!(!chat_200.active, "chat 200 is deactivated after forbidden");

    assert_eq!(harness.platform.sent_to(300).len(), 1, "300 is unaffected");
    assert_eq!(harness.platform.sent_to(200).len(), 0);

    // A second message should no longer even be offered to 200, since
    // active_destinations excludes it now.
    harness.engine.distribute(text_update(100, 2, "second")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;

    assert_eq!(harness.platform.sent_to(200).len(), 0, "deactivated destination stays excluded");
    assert_eq!(harness.platform.sent_to(300).len(), 2, "300 keeps receiving");
}
