// ABOUTME: Decodes Slack Events API payloads into the adapter's inbound event type
// ABOUTME: Works on the raw event JSON so every field Slack sends is visible, typed or not

use serde_json::Value;
use slack_morphism::models::socket_mode::SlackSocketModeHelloEvent;
use slack_morphism::prelude::SlackEventCallbackBody;
use slink_core::{Attachment, InboundEvent, MessageEvent};

/// Message subtypes Slack documents as hidden edits/deletions/thread bookkeeping
const HIDDEN_SUBTYPES: &[&str] = &["message_changed", "message_deleted", "message_replied"];

/// Slack error codes meaning the token itself is no good
const AUTH_FAILURE_CODES: &[&str] = &[
    "invalid_auth",
    "not_authed",
    "account_inactive",
    "token_revoked",
    "token_expired",
    "not_allowed_token_type",
];

/// Decode one Events API `event` body.
///
/// Returns `None` for event types the adapter has no use for; the caller
/// trace-logs those and moves on.
pub fn decode_event(body: &Value) -> Option<InboundEvent> {
    let kind = body.get("type").and_then(Value::as_str)?;

    match kind {
        "message" => decode_message(body).map(InboundEvent::Message),
        "channel_created" | "group_open" | "channel_unarchive" | "group_unarchive" => {
            channel_id(body).map(|id| InboundEvent::EntityCreated { id })
        }
        "team_join" => body
            .get("user")
            .and_then(|u| u.get("id"))
            .and_then(Value::as_str)
            .map(|id| InboundEvent::EntityCreated { id: id.to_string() }),
        "channel_rename" | "group_rename" => {
            let channel = body.get("channel")?;
            let id = channel.get("id").and_then(Value::as_str)?;
            let name = channel.get("name").and_then(Value::as_str).unwrap_or_default();
            Some(InboundEvent::EntityRenamed {
                id: id.to_string(),
                name: name.to_string(),
            })
        }
        _ => None,
    }
}

/// Decode a typed push-event body as delivered by the Socket Mode listener.
///
/// The body goes through its JSON form, so fields slack-morphism does not
/// model (and event types it only carries as `Unknown`) are still seen.
pub fn decode_callback(event: &SlackEventCallbackBody) -> serde_json::Result<Option<InboundEvent>> {
    let body = serde_json::to_value(event)?;
    let decoded = decode_event(&body);
    if decoded.is_none() {
        tracing::trace!(
            platform = "slack",
            event_type = body.get("type").and_then(serde_json::Value::as_str).unwrap_or("unknown"),
            "Ignoring Slack event"
        );
    }
    Ok(decoded)
}

/// Every Socket Mode `hello`, first connection or reconnect, starts a session
pub fn decode_hello(hello: &SlackSocketModeHelloEvent) -> InboundEvent {
    tracing::info!(
        platform = "slack",
        host = %hello.debug_info.host,
        connections = hello.num_connections,
        "Socket Mode hello"
    );
    InboundEvent::SessionEstablished
}

/// Decode a `message` event. Events without a channel are dropped.
pub fn decode_message(body: &Value) -> Option<MessageEvent> {
    let channel = str_field(body, "channel")?;
    let subtype = body.get("subtype").and_then(Value::as_str);

    let hidden = body.get("hidden").and_then(Value::as_bool).unwrap_or(false)
        || subtype.is_some_and(|s| HIDDEN_SUBTYPES.contains(&s));

    let attachments = body
        .get("attachments")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|a| Attachment {
                    fallback: str_field(a, "fallback").unwrap_or_default(),
                })
                .collect()
        })
        .unwrap_or_default();

    Some(MessageEvent {
        user: str_field(body, "user").filter(|u| !u.is_empty()),
        bot_id: str_field(body, "bot_id").filter(|b| !b.is_empty()),
        text: str_field(body, "text").unwrap_or_default(),
        attachments,
        channel,
        hidden,
    })
}

/// Whether a Slack error code means the credentials were rejected
pub fn is_auth_failure(code: &str) -> bool {
    AUTH_FAILURE_CODES.contains(&code)
}

/// Find an auth failure code inside an error message, if there is one
pub fn auth_failure_in(message: &str) -> Option<&'static str> {
    AUTH_FAILURE_CODES
        .iter()
        .copied()
        .find(|code| message.contains(code))
}

/// `channel` is a bare ID on some events and an object on others
fn channel_id(body: &Value) -> Option<String> {
    match body.get("channel")? {
        Value::String(id) => Some(id.clone()),
        Value::Object(channel) => channel
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_message() {
        let body = json!({
            "type": "message",
            "channel": "C1",
            "user": "U1",
            "text": "hello",
            "ts": "1700000000.000100"
        });

        let Some(InboundEvent::Message(msg)) = decode_event(&body) else {
            panic!("expected message");
        };
        assert_eq!(msg.channel, "C1");
        assert_eq!(msg.user.as_deref(), Some("U1"));
        assert_eq!(msg.text, "hello");
        assert!(!msg.hidden);
        assert!(msg.bot_id.is_none());
    }

    #[test]
    fn test_hidden_subtype_without_flag() {
        let body = json!({
            "type": "message",
            "subtype": "message_deleted",
            "channel": "C1",
            "ts": "1.2"
        });
        let msg = decode_message(&body).unwrap();
        assert!(msg.hidden);
    }

    #[test]
    fn test_message_without_channel_is_dropped() {
        assert!(decode_event(&json!({"type": "message", "user": "U1", "text": "x"})).is_none());
    }

    #[test]
    fn test_unknown_event_type() {
        assert!(decode_event(&json!({"type": "reaction_added", "user": "U1"})).is_none());
        assert!(decode_event(&json!({"user": "U1"})).is_none());
    }

    #[test]
    fn test_auth_failure_codes() {
        assert!(is_auth_failure("invalid_auth"));
        assert!(is_auth_failure("token_revoked"));
        assert!(!is_auth_failure("channel_not_found"));
        assert_eq!(
            auth_failure_in("Slack API error: invalid_auth"),
            Some("invalid_auth")
        );
        assert_eq!(auth_failure_in("connection reset by peer"), None);
    }
}
