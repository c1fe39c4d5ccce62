// ABOUTME: Turns raw message events into normalized messages for the bot layer
// ABOUTME: Suppresses hidden and self-originated events; degrades gracefully on lookup failure

use crate::directory::DirectoryCache;
use crate::traits::{
    ChannelData, ChatUser, EntityKind, EntityRecord, MessageEvent, NormalizedMessage, Transport,
};

/// Why a message event was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    /// System-edited or deleted message
    Hidden,
    /// Sent by the adapter itself
    OwnMessage,
}

impl SuppressReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuppressReason::Hidden => "hidden",
            SuppressReason::OwnMessage => "own_message",
        }
    }
}

/// Result of classifying one message event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Accepted(NormalizedMessage),
    Suppressed(SuppressReason),
}

/// Everything classification reads besides the event itself
pub struct ClassifyContext<'a> {
    pub directory: &'a DirectoryCache,
    /// Queried for senders missing from the directory
    pub transport: &'a dyn Transport,
    /// The adapter's own user ID, once known
    pub self_id: Option<&'a str>,
    /// Protocol tag for channel descriptors
    pub protocol: &'a str,
    /// Workspace domain for channel descriptors
    pub server: &'a str,
}

/// Classify a message event.
///
/// Hidden events are suppressed first, then the adapter's own messages.
/// Everything else is accepted, including messages with empty text.
pub async fn classify(event: &MessageEvent, ctx: &ClassifyContext<'_>) -> Classification {
    if event.hidden {
        return Classification::Suppressed(SuppressReason::Hidden);
    }
    if is_own_message(event, ctx.self_id) {
        return Classification::Suppressed(SuppressReason::OwnMessage);
    }

    let sender = extract_sender(event, ctx).await;
    let channel = describe_channel(&event.channel, ctx);

    Classification::Accepted(NormalizedMessage {
        channel,
        text: extract_text(event),
        sender,
    })
}

fn is_own_message(event: &MessageEvent, self_id: Option<&str>) -> bool {
    match (event.user.as_deref(), self_id) {
        (Some(user), Some(me)) => !me.is_empty() && user == me,
        _ => false,
    }
}

/// Direct text, else the first attachment's fallback, else empty
pub fn extract_text(event: &MessageEvent) -> String {
    if !event.text.is_empty() {
        return event.text.clone();
    }
    event
        .attachments
        .first()
        .map(|attachment| attachment.fallback.clone())
        .unwrap_or_default()
}

async fn extract_sender(event: &MessageEvent, ctx: &ClassifyContext<'_>) -> ChatUser {
    let user_id = match event.user.as_deref().filter(|id| !id.is_empty()) {
        Some(id) => id,
        None => return ChatUser::bot(event.bot_id.clone().unwrap_or_default()),
    };

    if let Some(record) = ctx.directory.lookup_user(user_id) {
        return user_from_record(record);
    }

    match ctx.transport.user_info(user_id).await {
        Ok(record) => user_from_record(record),
        Err(e) => {
            tracing::warn!(
                user_id = %user_id,
                error = %e,
                "Failed to look up message sender, forwarding with ID only"
            );
            ChatUser::new(user_id)
        }
    }
}

fn user_from_record(record: EntityRecord) -> ChatUser {
    ChatUser {
        id: record.id,
        nick: Some(record.name).filter(|name| !name.is_empty()),
        real_name: record.real_name,
        // Human-sender path: the bot flag marks messages without a user ID
        is_bot: false,
    }
}

/// Public channels render as "#name"; groups, DMs and unknown IDs stay raw
/// and are treated as private.
pub fn describe_channel(channel_id: &str, ctx: &ClassifyContext<'_>) -> ChannelData {
    let public_name = ctx
        .directory
        .lookup(channel_id)
        .filter(|record| record.kind == EntityKind::PublicChannel)
        .map(|record| record.name);

    let (channel, is_private) = match public_name {
        Some(name) => (format!("#{}", name), false),
        None => (channel_id.to_string(), true),
    };

    ChannelData {
        protocol: ctx.protocol.to_string(),
        server: ctx.server.to_string(),
        channel,
        is_private,
    }
}
