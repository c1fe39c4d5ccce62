// ABOUTME: Platform-agnostic core of the chat adapter
// ABOUTME: Directory cache, event classification, connection supervision and outbound routing

pub mod classifier;
pub mod config;
pub mod directory;
pub mod error;
pub mod metrics;
pub mod ready;
pub mod router;
pub mod supervisor;
pub mod testing;
pub mod traits;

pub use classifier::{Classification, ClassifyContext, SuppressReason};
pub use directory::{DirectoryCache, DirectoryCounts, RefreshReport};
pub use error::RelayError;
pub use ready::Readiness;
pub use router::OutboundRouter;
pub use supervisor::{ConnectionState, Supervisor};

// Re-export core traits for convenient access
pub use traits::{
    // Transport
    Credential, EventStream, PostOptions, Transport,
    // Bot-handling layer
    BotHandler, OutboundSender,
    // Data Types
    Attachment, ChannelData, ChatUser, EntityKind, EntityRecord, InboundEvent, MessageEvent,
    NormalizedMessage, WorkspaceInfo,
};
