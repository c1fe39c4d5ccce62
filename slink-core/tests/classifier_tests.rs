// ABOUTME: Tests for inbound message classification.
// ABOUTME: Suppression rules, text fallback, sender resolution and channel descriptors.

use slink_core::classifier::{classify, Classification, ClassifyContext, SuppressReason};
use slink_core::testing::FakeTransport;
use slink_core::{Attachment, DirectoryCache, EntityRecord, MessageEvent, NormalizedMessage};

async fn setup() -> (FakeTransport, DirectoryCache) {
    let transport = FakeTransport::new()
        .with_channels(vec![EntityRecord::channel("C1", "general")])
        .with_groups(vec![EntityRecord::group("G1", "secret-plans")])
        .with_users(vec![
            EntityRecord::user("U1", "alice").with_real_name("Alice Liddell"),
            EntityRecord::user("UBOT", "slinkbot"),
        ]);
    let directory = DirectoryCache::new();
    directory.refresh(&transport).await;
    (transport, directory)
}

fn ctx<'a>(directory: &'a DirectoryCache, transport: &'a FakeTransport) -> ClassifyContext<'a> {
    ClassifyContext {
        directory,
        transport,
        self_id: Some("UBOT"),
        protocol: "slack",
        server: "acme",
    }
}

fn message(user: Option<&str>, channel: &str, text: &str) -> MessageEvent {
    MessageEvent {
        user: user.map(str::to_string),
        channel: channel.to_string(),
        text: text.to_string(),
        ..Default::default()
    }
}

fn accepted(classification: Classification) -> NormalizedMessage {
    match classification {
        Classification::Accepted(message) => message,
        other => panic!("Expected Accepted, got {:?}", other),
    }
}

#[tokio::test]
async fn test_public_channel_message_from_known_user() {
    let (transport, directory) = setup().await;
    let event = message(Some("U1"), "C1", "hello bot");

    let msg = accepted(classify(&event, &ctx(&directory, &transport)).await);

    assert_eq!(msg.text, "hello bot");
    assert_eq!(msg.channel.protocol, "slack");
    assert_eq!(msg.channel.server, "acme");
    assert_eq!(msg.channel.channel, "#general");
    assert!(!msg.channel.is_private);
    assert_eq!(msg.sender.id, "U1");
    assert_eq!(msg.sender.nick.as_deref(), Some("alice"));
    assert_eq!(msg.sender.real_name.as_deref(), Some("Alice Liddell"));
    assert!(!msg.sender.is_bot);
}

#[tokio::test]
async fn test_hidden_event_is_suppressed_regardless_of_text() {
    let (transport, directory) = setup().await;
    for text in ["", "hello", "!important command"] {
        let mut event = message(Some("U1"), "C1", text);
        event.hidden = true;
        assert_eq!(
            classify(&event, &ctx(&directory, &transport)).await,
            Classification::Suppressed(SuppressReason::Hidden)
        );
    }
}

#[tokio::test]
async fn test_own_message_is_suppressed() {
    let (transport, directory) = setup().await;
    for (channel, text) in [("C1", "reply"), ("G1", ""), ("D123", "dm reply")] {
        let event = message(Some("UBOT"), channel, text);
        assert_eq!(
            classify(&event, &ctx(&directory, &transport)).await,
            Classification::Suppressed(SuppressReason::OwnMessage)
        );
    }
}

#[tokio::test]
async fn test_hidden_checked_before_own_message() {
    let (transport, directory) = setup().await;
    let mut event = message(Some("UBOT"), "C1", "x");
    event.hidden = true;
    assert_eq!(
        classify(&event, &ctx(&directory, &transport)).await,
        Classification::Suppressed(SuppressReason::Hidden)
    );
}

#[tokio::test]
async fn test_attachment_fallback_text() {
    let (transport, directory) = setup().await;
    let mut event = message(Some("U1"), "C1", "");
    event.attachments = vec![Attachment {
        fallback: "see thread".to_string(),
    }];

    let msg = accepted(classify(&event, &ctx(&directory, &transport)).await);
    assert_eq!(msg.text, "see thread");
}

#[tokio::test]
async fn test_empty_text_is_still_forwarded() {
    let (transport, directory) = setup().await;
    let event = message(Some("U1"), "C1", "");

    let msg = accepted(classify(&event, &ctx(&directory, &transport)).await);
    assert_eq!(msg.text, "");
    assert_eq!(msg.sender.id, "U1");
}

#[tokio::test]
async fn test_bot_message_uses_bot_id() {
    let (transport, directory) = setup().await;
    let mut event = message(None, "C1", "deploy finished");
    event.bot_id = Some("B42".to_string());

    let msg = accepted(classify(&event, &ctx(&directory, &transport)).await);
    assert_eq!(msg.sender.id, "B42");
    assert!(msg.sender.is_bot);
    assert!(msg.sender.nick.is_none());
    assert_eq!(transport.user_info_calls(), 0);
}

#[tokio::test]
async fn test_unknown_user_falls_back_to_transport_lookup() {
    let (transport, directory) = setup().await;
    // Joined after the last refresh
    transport.set_users(vec![EntityRecord::user("U7", "newcomer")]);
    let event = message(Some("U7"), "C1", "hi all");

    let msg = accepted(classify(&event, &ctx(&directory, &transport)).await);
    assert_eq!(msg.sender.nick.as_deref(), Some("newcomer"));
    assert_eq!(transport.user_info_calls(), 1);
}

#[tokio::test]
async fn test_failed_user_lookup_degrades_to_id_only() {
    let (transport, directory) = setup().await;
    transport.fail_user_info(true);
    let event = message(Some("U404"), "C1", "who am i");

    let msg = accepted(classify(&event, &ctx(&directory, &transport)).await);
    assert_eq!(msg.sender.id, "U404");
    assert!(msg.sender.nick.is_none());
    assert!(msg.sender.real_name.is_none());
    assert!(!msg.sender.is_bot);
    assert_eq!(msg.text, "who am i");
}

#[tokio::test]
async fn test_group_channel_is_private_raw_id() {
    let (transport, directory) = setup().await;
    let event = message(Some("U1"), "G1", "psst");

    let msg = accepted(classify(&event, &ctx(&directory, &transport)).await);
    assert_eq!(msg.channel.channel, "G1");
    assert!(msg.channel.is_private);
}

#[tokio::test]
async fn test_unknown_channel_is_private_raw_id() {
    let (transport, directory) = setup().await;
    let event = message(Some("U1"), "C999", "just created");

    let msg = accepted(classify(&event, &ctx(&directory, &transport)).await);
    assert_eq!(msg.channel.channel, "C999");
    assert!(msg.channel.is_private);
}

#[tokio::test]
async fn test_no_self_id_accepts_everything_visible() {
    let (transport, directory) = setup().await;
    let mut context = ctx(&directory, &transport);
    context.self_id = None;
    let event = message(Some("UBOT"), "C1", "before whoami");

    let msg = accepted(classify(&event, &context).await);
    assert_eq!(msg.sender.id, "UBOT");
}
