// ABOUTME: Outbound router: destination name -> routing ID -> transport post
// ABOUTME: The send capability handed to the bot-handling layer

use async_trait::async_trait;
use std::sync::Arc;

use crate::directory::DirectoryCache;
use crate::error::RelayError;
use crate::metrics;
use crate::traits::{OutboundSender, PostOptions, Transport};

/// Sends bot replies to channels, groups or users by display name.
///
/// Safe to call from any task, concurrently with directory refreshes.
#[derive(Clone)]
pub struct OutboundRouter {
    directory: Arc<DirectoryCache>,
    transport: Arc<dyn Transport>,
    options: PostOptions,
}

impl OutboundRouter {
    pub fn new(directory: Arc<DirectoryCache>, transport: Arc<dyn Transport>) -> Self {
        Self {
            directory,
            transport,
            options: PostOptions::default(),
        }
    }

    /// Resolve `destination` and post `text` there.
    ///
    /// Unresolvable names fail without touching the transport. Transport
    /// errors are returned as-is; there is no retry.
    pub async fn send(&self, destination: &str, text: &str) -> Result<(), RelayError> {
        let Some(routing_id) = self.directory.resolve_name(destination) else {
            tracing::warn!(destination = %destination, "Outbound destination not resolvable");
            metrics::record_outbound("not_found");
            return Err(RelayError::DestinationNotFound(destination.to_string()));
        };

        match self
            .transport
            .post_message(&routing_id, text, &self.options)
            .await
        {
            Ok(()) => {
                tracing::debug!(
                    destination = %destination,
                    routing_id = %routing_id,
                    "Outbound message sent"
                );
                metrics::record_outbound("sent");
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    destination = %destination,
                    routing_id = %routing_id,
                    error = %e,
                    "Failed to send outbound message"
                );
                metrics::record_outbound("error");
                Err(RelayError::Transport(e))
            }
        }
    }
}

#[async_trait]
impl OutboundSender for OutboundRouter {
    async fn send(&self, destination: &str, text: &str) -> Result<(), RelayError> {
        OutboundRouter::send(self, destination, text).await
    }
}
