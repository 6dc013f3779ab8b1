//! Restriction enforcement: a banned or currently-muted user's messages
//! are dropped at ingress, before dedup or fan-out ever see them.

use crate::support::{build_harness, chat, fast_config};
use chat_relay::restriction::RestrictionStore;
use chat_relay::types::{ChatKind, Restriction, RestrictionKind};
use chat_relay::RawUpdate;
use std::time::Duration;

fn text_update(source_chat: i64, source_message_id: i64, origin_user_id: i64, body: &str) -> RawUpdate {
    RawUpdate {
        source_chat,
        source_message_id,
        origin_user_id: Some(origin_user_id),
        text: Some(body.to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn banned_user_message_never_fans_out() {
    let chats = vec![chat(100, ChatKind::Group), chat(200, ChatKind::Group)];
    let harness = build_harness(fast_config(), &chats, &[]).await;
    harness
        .restriction
        .upsert(&Restriction {
            user_id: 7,
            kind: RestrictionKind::Ban,
            expires_at: None,
            issuer: 1,
        })
        .unwrap();

    harness
        .engine
        .distribute(text_update(100, 1, 7, "hello"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;

    assert!(harness.platform.sent_to(200).is_empty(), "banned user's message is dropped at ingress");
}

#[tokio::test]
async fn muted_user_message_is_dropped_until_mute_expires() {
    let chats = vec![chat(100, ChatKind::Group), chat(200, ChatKind::Group)];
    let harness = build_harness(fast_config(), &chats, &[]).await;
    harness
        .restriction
        .upsert(&Restriction {
            user_id: 8,
            kind: RestrictionKind::Mute,
            expires_at: Some(chrono::Utc::now() + chrono::Duration::milliseconds(50)),
            issuer: 1,
        })
        .unwrap();

    harness
        .engine
        .distribute(text_update(100, 1, 8, "while muted"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(harness.platform.sent_to(200).is_empty(), "mute suppresses delivery while active");

    tokio::time::sleep(Duration::from_millis(100)).await;
    harness
        .engine
        .distribute(text_update(100, 2, 8, "after mute"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(harness.platform.sent_to(200).len(), 1, "delivery resumes once the mute expires");
}

#[tokio::test]
async fn unrestricted_user_is_unaffected() {
    let chats = vec![chat(100, ChatKind::Group), chat(200, ChatKind::Group)];
    let harness = build_harness(fast_config(), &chats, &[]).await;

    harness
        .engine
        .distribute(text_update(100, 1, 42, "hi"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;

    assert_eq!(harness.platform.sent_to(200).len(), 1);
}
