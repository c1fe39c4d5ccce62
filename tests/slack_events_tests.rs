// ABOUTME: Tests for Slack event decoding and its path through the supervisor
// ABOUTME: Feeds Events API payloads into the fake transport and checks what the handler sees

use serde_json::json;
use slack_morphism::models::socket_mode::SlackSocketModeHelloEvent;
use slack_morphism::prelude::SlackEventCallbackBody;
use slink::platform::slack::events::{decode_callback, decode_event, decode_hello, decode_message};
use slink_core::config::AdapterConfig;
use slink_core::testing::{FakeTransport, RecordingHandler};
use slink_core::{Credential, EntityRecord, InboundEvent, RelayError, Supervisor};
use std::sync::Arc;

fn credential() -> Credential {
    Credential {
        bot_token: "xoxb-test".to_string(),
        app_token: "xapp-test".to_string(),
    }
}

fn typed(body: serde_json::Value) -> SlackEventCallbackBody {
    serde_json::from_value(body).unwrap()
}

fn hello(host: &str) -> SlackSocketModeHelloEvent {
    serde_json::from_value(json!({
        "type": "hello",
        "num_connections": 1,
        "debug_info": {"host": host},
        "connection_info": {"app_id": "A123"}
    }))
    .unwrap()
}

// =============================================================================
// Decoding
// =============================================================================

#[test]
fn test_bot_message_keeps_bot_id() {
    let body = json!({
        "type": "message",
        "subtype": "bot_message",
        "bot_id": "B42",
        "channel": "C1",
        "text": "build passed",
        "ts": "1700000000.000200"
    });

    let msg = decode_message(&body).unwrap();
    assert!(msg.user.is_none());
    assert_eq!(msg.bot_id.as_deref(), Some("B42"));
    assert!(!msg.hidden);
}

#[test]
fn test_attachments_are_decoded_in_order() {
    let body = json!({
        "type": "message",
        "channel": "C1",
        "user": "U1",
        "text": "",
        "attachments": [
            {"fallback": "first"},
            {"title": "no fallback"},
            {"fallback": "third"}
        ]
    });

    let msg = decode_message(&body).unwrap();
    let fallbacks: Vec<&str> = msg.attachments.iter().map(|a| a.fallback.as_str()).collect();
    assert_eq!(fallbacks, vec!["first", "", "third"]);
}

#[test]
fn test_explicit_hidden_flag() {
    let body = json!({
        "type": "message",
        "subtype": "message_changed",
        "hidden": true,
        "channel": "C1",
        "message": {"text": "edited"}
    });
    assert!(decode_message(&body).unwrap().hidden);
}

#[test]
fn test_channel_created_and_rename() {
    let created = json!({
        "type": "channel_created",
        "channel": {"id": "C9", "name": "launch", "created": 1700000000, "creator": "U1"}
    });
    assert_eq!(
        decode_event(&created),
        Some(InboundEvent::EntityCreated {
            id: "C9".to_string()
        })
    );

    let renamed = json!({
        "type": "channel_rename",
        "channel": {"id": "C9", "name": "launch-day", "created": 1700000000}
    });
    assert_eq!(
        decode_event(&renamed),
        Some(InboundEvent::EntityRenamed {
            id: "C9".to_string(),
            name: "launch-day".to_string()
        })
    );
}

#[test]
fn test_group_events() {
    let opened = json!({"type": "group_open", "user": "U1", "channel": "G7"});
    assert_eq!(
        decode_event(&opened),
        Some(InboundEvent::EntityCreated {
            id: "G7".to_string()
        })
    );

    let renamed = json!({"type": "group_rename", "channel": {"id": "G7", "name": "ops"}});
    assert!(matches!(
        decode_event(&renamed),
        Some(InboundEvent::EntityRenamed { ref id, .. }) if id == "G7"
    ));
}

#[test]
fn test_team_join_is_a_creation() {
    let body = json!({"type": "team_join", "user": {"id": "U8", "name": "newcomer"}});
    assert_eq!(
        decode_event(&body),
        Some(InboundEvent::EntityCreated {
            id: "U8".to_string()
        })
    );
}

#[test]
fn test_app_mention_is_not_duplicated() {
    // Slack also delivers the same text as a plain message event
    let body = json!({
        "type": "app_mention",
        "user": "U1",
        "channel": "C1",
        "text": "<@UBOT> hi",
        "ts": "1.1"
    });
    assert!(decode_event(&body).is_none());
}

// =============================================================================
// Typed slack-morphism bodies
// =============================================================================

#[test]
fn test_typed_message_keeps_attachment_fallback() {
    let body = typed(json!({
        "type": "message",
        "channel": "C1",
        "user": "U1",
        "text": "",
        "ts": "1700000000.000100",
        "attachments": [{"fallback": "deploy finished"}]
    }));
    assert!(matches!(body, SlackEventCallbackBody::Message(_)));

    let Some(InboundEvent::Message(msg)) = decode_callback(&body).unwrap() else {
        panic!("expected message");
    };
    assert_eq!(msg.channel, "C1");
    assert_eq!(msg.user.as_deref(), Some("U1"));
    assert_eq!(msg.attachments.len(), 1);
    assert_eq!(msg.attachments[0].fallback, "deploy finished");
}

#[test]
fn test_typed_deleted_message_is_hidden() {
    let body = typed(json!({
        "type": "message",
        "subtype": "message_deleted",
        "hidden": true,
        "channel": "C1",
        "ts": "1700000000.000300",
        "deleted_ts": "1700000000.000100"
    }));

    let Some(InboundEvent::Message(msg)) = decode_callback(&body).unwrap() else {
        panic!("expected message");
    };
    assert!(msg.hidden);
}

#[test]
fn test_typed_renames() {
    let body = typed(json!({
        "type": "channel_rename",
        "channel": {"id": "C9", "name": "launch-day", "created": 1700000000}
    }));
    assert_eq!(
        decode_callback(&body).unwrap(),
        Some(InboundEvent::EntityRenamed {
            id: "C9".to_string(),
            name: "launch-day".to_string()
        })
    );

    // Not modelled by slack-morphism; arrives as raw JSON
    let body = typed(json!({
        "type": "group_rename",
        "channel": {"id": "G7", "name": "ops", "created": 1700000000}
    }));
    assert!(matches!(body, SlackEventCallbackBody::Unknown(_)));
    assert_eq!(
        decode_callback(&body).unwrap(),
        Some(InboundEvent::EntityRenamed {
            id: "G7".to_string(),
            name: "ops".to_string()
        })
    );
}

#[test]
fn test_hello_starts_session() {
    assert_eq!(
        decode_hello(&hello("applink-1")),
        InboundEvent::SessionEstablished
    );
}

// =============================================================================
// Through the supervisor
// =============================================================================

#[tokio::test]
async fn test_reconnect_hello_refreshes_directory() {
    let transport = Arc::new(
        FakeTransport::new()
            .with_self_id("UBOT")
            .with_channels(vec![EntityRecord::channel("C1", "general")])
            .with_users(vec![EntityRecord::user("U1", "alice")]),
    );
    let handler = Arc::new(RecordingHandler::new());
    let supervisor = Arc::new(Supervisor::new(
        transport.clone(),
        handler.clone(),
        AdapterConfig::default(),
    ));
    let task = {
        let supervisor = Arc::clone(&supervisor);
        tokio::spawn(async move { supervisor.run(&credential()).await })
    };
    let marker = |text: &str| {
        decode_event(&json!({"type": "message", "channel": "C1", "user": "U1", "text": text}))
            .unwrap()
    };

    transport.push_event(decode_hello(&hello("applink-1")));
    transport.push_event(marker("first"));
    handler.wait_for(1).await;

    let outbound = supervisor.outbound();
    assert!(matches!(
        outbound.send("launch", "hi").await,
        Err(RelayError::DestinationNotFound(_))
    ));

    // Created while the socket was down; no channel_created ever arrives
    transport.set_channels(vec![
        EntityRecord::channel("C1", "general"),
        EntityRecord::channel("C9", "launch"),
    ]);
    transport.push_event(decode_hello(&hello("applink-2")));
    transport.push_event(marker("second"));
    handler.wait_for(2).await;

    assert_eq!(transport.query_rounds(), 2);
    outbound.send("launch", "hi").await.unwrap();
    assert_eq!(transport.posts().len(), 1);

    transport.close_events();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_decoded_events_drive_supervisor() {
    let transport = Arc::new(
        FakeTransport::new()
            .with_self_id("UBOT")
            .with_channels(vec![EntityRecord::channel("C1", "general")])
            .with_users(vec![EntityRecord::user("U1", "alice")]),
    );
    let handler = Arc::new(RecordingHandler::new());
    let supervisor = Supervisor::new(transport.clone(), handler.clone(), AdapterConfig::default());

    let payloads = [
        json!({"type": "message", "channel": "C1", "user": "U1", "text": "hi bot"}),
        json!({"type": "message", "channel": "C1", "user": "UBOT", "text": "hi alice"}),
        json!({"type": "message", "subtype": "message_deleted", "channel": "C1", "deleted_ts": "1.0"}),
        json!({"type": "reaction_added", "user": "U1", "reaction": "thumbsup"}),
        json!({"type": "message", "channel": "D1", "user": "U1", "text": "psst"}),
    ];

    transport.push_event(InboundEvent::SessionEstablished);
    for payload in &payloads {
        if let Some(event) = decode_event(payload) {
            transport.push_event(event);
        }
    }
    transport.close_events();

    supervisor.run(&credential()).await.unwrap();

    let received = handler.received();
    assert_eq!(received.len(), 2);
    assert_eq!(received[0].text, "hi bot");
    assert_eq!(received[0].channel.channel, "#general");
    assert_eq!(received[1].text, "psst");
    assert_eq!(received[1].channel.channel, "D1");
    assert!(received[1].channel.is_private);
}
