// ABOUTME: Built-in bot handler for the `run` command: logs every accepted message
// ABOUTME: Keeps the outbound sender it is handed so callers can reply through it

use async_trait::async_trait;
use slink_core::{BotHandler, ChannelData, ChatUser, OutboundSender};
use std::sync::{Arc, Mutex};

/// Logs inbound messages as structured `tracing` events
#[derive(Default)]
pub struct LoggingHandler {
    outbound: Mutex<Option<Arc<dyn OutboundSender>>>,
}

impl LoggingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// The send capability, once the supervisor has registered it
    pub fn outbound(&self) -> Option<Arc<dyn OutboundSender>> {
        self.outbound.lock().ok().and_then(|o| o.clone())
    }
}

#[async_trait]
impl BotHandler for LoggingHandler {
    async fn message_received(&self, channel: &ChannelData, text: &str, sender: &ChatUser) {
        tracing::info!(
            protocol = %channel.protocol,
            server = %channel.server,
            channel = %channel.channel,
            private = channel.is_private,
            sender = %sender.id,
            nick = sender.nick.as_deref().unwrap_or(""),
            bot = sender.is_bot,
            text = %text,
            "Message received"
        );
    }

    fn register_outbound(&self, outbound: Arc<dyn OutboundSender>) {
        tracing::debug!("Outbound sender registered");
        if let Ok(mut current) = self.outbound.lock() {
            *current = Some(outbound);
        }
    }
}
