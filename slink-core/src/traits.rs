// ABOUTME: Core types and traits shared by the adapter and its collaborators
// ABOUTME: Transport (chat service), BotHandler (message consumer), OutboundSender (reply path)

use anyhow::Result;
use async_trait::async_trait;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;

use crate::error::RelayError;

// =============================================================================
// Directory Entities
// =============================================================================

/// Which directory category an entity belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// Public channel, visible to the whole workspace
    PublicChannel,
    /// Private group / private channel
    PrivateGroup,
    /// A user (direct-message target)
    DirectUser,
}

impl EntityKind {
    /// Category label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::PublicChannel => "channels",
            EntityKind::PrivateGroup => "groups",
            EntityKind::DirectUser => "users",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An addressable entity in the remote workspace (channel, group or user)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRecord {
    /// Protocol-assigned identifier (e.g., C12345, G12345, U12345)
    pub id: String,
    /// Display name; the public routing key, not guaranteed unique
    pub name: String,
    pub kind: EntityKind,
    /// Real name (users only)
    pub real_name: Option<String>,
}

impl EntityRecord {
    pub fn channel(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(id, name, EntityKind::PublicChannel)
    }

    pub fn group(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(id, name, EntityKind::PrivateGroup)
    }

    pub fn user(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(id, name, EntityKind::DirectUser)
    }

    fn new(id: impl Into<String>, name: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            real_name: None,
        }
    }

    pub fn with_real_name(mut self, real_name: impl Into<String>) -> Self {
        self.real_name = Some(real_name.into());
        self
    }
}

/// Workspace metadata, queried once after authentication
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkspaceInfo {
    pub id: String,
    pub name: String,
    /// Workspace domain (e.g., "acme" for acme.slack.com)
    pub domain: String,
}

// =============================================================================
// Normalized Message
// =============================================================================

/// Identity of a message sender
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChatUser {
    /// Routing ID (user ID, or bot ID for bot messages)
    pub id: String,
    /// Short handle
    pub nick: Option<String>,
    pub real_name: Option<String>,
    pub is_bot: bool,
}

impl ChatUser {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            nick: None,
            real_name: None,
            is_bot: false,
        }
    }

    pub fn bot(id: impl Into<String>) -> Self {
        Self {
            is_bot: true,
            ..Self::new(id)
        }
    }
}

/// Where a message was received, in the form the bot layer expects
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelData {
    /// Protocol tag (e.g., "slack")
    pub protocol: String,
    /// Workspace domain
    pub server: String,
    /// "#name" for public channels, the raw channel ID otherwise
    pub channel: String,
    pub is_private: bool,
}

/// Inbound message after classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedMessage {
    pub channel: ChannelData,
    /// Message text; may be empty
    pub text: String,
    pub sender: ChatUser,
}

// =============================================================================
// Inbound Events
// =============================================================================

/// An attachment carried by a message event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attachment {
    /// Plain-text summary of the attachment
    pub fallback: String,
}

/// A raw message event, decoded at the transport boundary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageEvent {
    /// Human sender; absent for bot and system messages
    pub user: Option<String>,
    /// Bot sender
    pub bot_id: Option<String>,
    pub text: String,
    pub attachments: Vec<Attachment>,
    pub channel: String,
    /// System-edited or deleted messages
    pub hidden: bool,
}

/// Every event category the supervisor reacts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// Connection (re-)established
    SessionEstablished,
    /// A channel or group was created
    EntityCreated { id: String },
    /// A channel or group was renamed
    EntityRenamed { id: String, name: String },
    Message(MessageEvent),
    /// Connection dropped; the transport is reconnecting on its own
    ConnectionLost { reason: String },
    /// Non-fatal protocol-level error
    ProtocolError(String),
    /// Credentials rejected; ends the supervisor
    AuthInvalid(String),
}

impl InboundEvent {
    /// Category label used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            InboundEvent::SessionEstablished => "session_established",
            InboundEvent::EntityCreated { .. } => "entity_created",
            InboundEvent::EntityRenamed { .. } => "entity_renamed",
            InboundEvent::Message(_) => "message",
            InboundEvent::ConnectionLost { .. } => "connection_lost",
            InboundEvent::ProtocolError(_) => "protocol_error",
            InboundEvent::AuthInvalid(_) => "auth_invalid",
        }
    }
}

/// Boxed stream type for transport events
pub type EventStream = Pin<Box<dyn Stream<Item = InboundEvent> + Send>>;

// =============================================================================
// Transport
// =============================================================================

/// Credentials for the chat service
#[derive(Clone)]
pub struct Credential {
    /// Bot OAuth token for Web API calls
    pub bot_token: String,
    /// App-level token for the realtime connection
    pub app_token: String,
}

// Custom Debug impl to redact sensitive fields
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("bot_token", &"[REDACTED]")
            .field("app_token", &"[REDACTED]")
            .finish()
    }
}

/// Options for outbound posts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostOptions {
    /// Post under the adapter's own bot identity
    pub as_user: bool,
}

impl Default for PostOptions {
    fn default() -> Self {
        Self { as_user: true }
    }
}

/// Black-box client for the chat service.
///
/// Implementations own the realtime session. `connect` spawns the background
/// connection-maintenance task, which must stop when `stop` is cancelled.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish the API session with the given credentials
    async fn authenticate(&self, credential: &Credential) -> Result<(), RelayError>;

    /// Start the realtime connection and return its event stream
    async fn connect(&self, stop: CancellationToken) -> Result<EventStream>;

    /// All public channels
    async fn query_channels(&self) -> Result<Vec<EntityRecord>>;

    /// All private groups visible to the adapter
    async fn query_groups(&self) -> Result<Vec<EntityRecord>>;

    /// All users in the workspace
    async fn query_users(&self) -> Result<Vec<EntityRecord>>;

    /// Single user lookup, for senders missing from the cache
    async fn user_info(&self, user_id: &str) -> Result<EntityRecord>;

    /// The adapter's own user ID
    async fn who_am_i(&self) -> Result<String>;

    async fn workspace_info(&self) -> Result<WorkspaceInfo>;

    /// Post a message to a routing ID
    async fn post_message(&self, routing_id: &str, text: &str, options: &PostOptions)
        -> Result<()>;
}

// =============================================================================
// Bot-handling collaborator
// =============================================================================

/// The adapter's send capability, handed to the bot layer
#[async_trait]
pub trait OutboundSender: Send + Sync {
    /// Send `text` to the entity whose display name is `destination`
    async fn send(&self, destination: &str, text: &str) -> Result<(), RelayError>;
}

/// The external bot-handling layer.
///
/// `message_received` is awaited inline by the supervisor loop; a handler
/// that never returns stalls all further event processing.
#[async_trait]
pub trait BotHandler: Send + Sync {
    /// Called once per accepted inbound message
    async fn message_received(&self, channel: &ChannelData, text: &str, sender: &ChatUser);

    /// Receives the adapter's outbound capability at startup
    fn register_outbound(&self, _outbound: Arc<dyn OutboundSender>) {}
}
