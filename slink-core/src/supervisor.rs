// ABOUTME: Connection supervisor: owns the realtime session and its event loop
// ABOUTME: Refreshes the directory on topology events and dispatches classified messages

use std::sync::{Arc, Mutex, RwLock};

use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::classifier::{self, Classification, ClassifyContext};
use crate::config::AdapterConfig;
use crate::directory::DirectoryCache;
use crate::error::RelayError;
use crate::metrics;
use crate::ready::Readiness;
use crate::router::OutboundRouter;
use crate::traits::{BotHandler, Credential, InboundEvent, MessageEvent, Transport, WorkspaceInfo};

/// Lifecycle of the supervised connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not started
    Disconnected,
    /// Authenticating / waiting for the session to come up
    Connecting,
    /// Session established, events flowing
    Connected,
    /// Connection dropped; the transport is reconnecting
    Reconnecting { reason: String },
    /// Loop ended; final
    Terminated,
}

/// Owns the directory cache and connection state, and runs the event loop.
///
/// Events are handled strictly one at a time, in arrival order, so a message
/// is never classified against a directory older than a preceding rename.
pub struct Supervisor {
    transport: Arc<dyn Transport>,
    handler: Arc<dyn BotHandler>,
    config: AdapterConfig,
    directory: Arc<DirectoryCache>,
    self_id: RwLock<Option<String>>,
    workspace: RwLock<WorkspaceInfo>,
    state: Mutex<ConnectionState>,
    stop: CancellationToken,
}

impl Supervisor {
    pub fn new(
        transport: Arc<dyn Transport>,
        handler: Arc<dyn BotHandler>,
        config: AdapterConfig,
    ) -> Self {
        Self {
            transport,
            handler,
            config,
            directory: Arc::new(DirectoryCache::new()),
            self_id: RwLock::new(None),
            workspace: RwLock::new(WorkspaceInfo::default()),
            state: Mutex::new(ConnectionState::Disconnected),
            stop: CancellationToken::new(),
        }
    }

    /// Shared handle to the directory cache
    pub fn directory(&self) -> Arc<DirectoryCache> {
        Arc::clone(&self.directory)
    }

    /// Fires once the directory has been populated for the first time
    pub fn readiness(&self) -> Readiness {
        self.directory.readiness()
    }

    /// The send capability, usable from any task
    pub fn outbound(&self) -> OutboundRouter {
        OutboundRouter::new(Arc::clone(&self.directory), Arc::clone(&self.transport))
    }

    pub fn state(&self) -> ConnectionState {
        self.state
            .lock()
            .map(|s| s.clone())
            .unwrap_or(ConnectionState::Terminated)
    }

    /// The adapter's own user ID, once the session is established
    pub fn self_id(&self) -> Option<String> {
        self.self_id.read().ok().and_then(|id| id.clone())
    }

    pub fn workspace(&self) -> WorkspaceInfo {
        self.workspace
            .read()
            .map(|w| w.clone())
            .unwrap_or_default()
    }

    /// Stop the event loop and the transport's background task.
    ///
    /// `run` returns `Ok(())` shortly after; a stopped supervisor cannot be
    /// restarted.
    pub fn shutdown(&self) {
        tracing::info!("Supervisor shutdown requested");
        self.stop.cancel();
    }

    fn set_state(&self, state: ConnectionState) {
        if let Ok(mut current) = self.state.lock() {
            if *current != state {
                tracing::debug!(from = ?*current, to = ?state, "Connection state changed");
                *current = state;
            }
        }
    }

    /// Authenticate, connect and consume events until the stream ends,
    /// `shutdown` is called, or the credentials are rejected.
    ///
    /// Rejected credentials end the loop with `RelayError::AuthInvalid`; there
    /// is no retry.
    pub async fn run(&self, credential: &Credential) -> Result<(), RelayError> {
        self.set_state(ConnectionState::Connecting);

        if let Err(e) = self.transport.authenticate(credential).await {
            tracing::error!(error = %e, "Authentication failed");
            self.set_state(ConnectionState::Terminated);
            return Err(e);
        }

        match self.transport.workspace_info().await {
            Ok(info) => {
                tracing::info!(team = %info.name, domain = %info.domain, "Workspace info loaded");
                if let Ok(mut workspace) = self.workspace.write() {
                    *workspace = info;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load workspace info, using empty domain");
            }
        }

        self.handler.register_outbound(Arc::new(self.outbound()));

        let stop = self.stop.child_token();
        // Cancels the transport's background task however this function exits
        let _stop_guard = stop.clone().drop_guard();

        let mut events = match self.transport.connect(stop).await {
            Ok(events) => events,
            Err(e) => {
                tracing::error!(error = %e, "Failed to start realtime connection");
                self.set_state(ConnectionState::Terminated);
                return Err(RelayError::Transport(e));
            }
        };

        let result = loop {
            let next = tokio::select! {
                biased;
                _ = self.stop.cancelled() => {
                    tracing::info!("Supervisor stopped");
                    break Ok(());
                }
                next = events.next() => next,
            };

            let Some(event) = next else {
                tracing::info!("Event stream closed");
                break Ok(());
            };

            if let Err(e) = self.handle_event(event).await {
                break Err(e);
            }
        };

        self.set_state(ConnectionState::Terminated);
        result
    }

    /// Handle one inbound event. Only rejected credentials are an error.
    async fn handle_event(&self, event: InboundEvent) -> Result<(), RelayError> {
        metrics::record_event(event.kind());

        match event {
            InboundEvent::SessionEstablished => {
                self.set_state(ConnectionState::Connected);
                tracing::info!("Session established");
                self.resolve_self_id().await;
                self.refresh_directory("session_established").await;
            }
            InboundEvent::EntityCreated { id } => {
                tracing::debug!(id = %id, "Entity created");
                self.refresh_directory("entity_created").await;
            }
            InboundEvent::EntityRenamed { id, name } => {
                tracing::debug!(id = %id, name = %name, "Entity renamed");
                self.refresh_directory("entity_renamed").await;
            }
            InboundEvent::Message(message) => {
                self.dispatch_message(&message).await;
            }
            InboundEvent::ConnectionLost { reason } => {
                tracing::warn!(reason = %reason, "Connection lost, transport reconnecting");
                self.set_state(ConnectionState::Reconnecting { reason });
            }
            InboundEvent::ProtocolError(error) => {
                tracing::error!(error = %error, "Protocol error");
            }
            InboundEvent::AuthInvalid(reason) => {
                tracing::error!(reason = %reason, "Invalid credentials, stopping");
                return Err(RelayError::AuthInvalid(reason));
            }
        }

        Ok(())
    }

    async fn resolve_self_id(&self) {
        match self.transport.who_am_i().await {
            Ok(id) => {
                tracing::info!(self_id = %id, "Resolved own user ID");
                if let Ok(mut current) = self.self_id.write() {
                    *current = Some(id);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to resolve own user ID");
            }
        }
    }

    async fn refresh_directory(&self, trigger: &'static str) {
        let report = self.directory.refresh(self.transport.as_ref()).await;
        if report.is_complete() {
            tracing::debug!(trigger, "Directory refreshed");
        } else {
            tracing::warn!(trigger, failed = ?report.failed, "Directory refresh incomplete");
        }
    }

    async fn dispatch_message(&self, event: &MessageEvent) {
        let self_id = self.self_id();
        let workspace = self.workspace();
        let ctx = ClassifyContext {
            directory: &self.directory,
            transport: self.transport.as_ref(),
            self_id: self_id.as_deref(),
            protocol: &self.config.protocol,
            server: &workspace.domain,
        };

        match classifier::classify(event, &ctx).await {
            Classification::Accepted(message) => {
                tracing::debug!(
                    channel = %message.channel.channel,
                    sender = %message.sender.id,
                    is_bot = message.sender.is_bot,
                    "Dispatching message"
                );
                metrics::record_message("dispatched");
                self.handler
                    .message_received(&message.channel, &message.text, &message.sender)
                    .await;
            }
            Classification::Suppressed(reason) => {
                tracing::trace!(
                    channel = %event.channel,
                    reason = reason.as_str(),
                    "Message suppressed"
                );
                metrics::record_message(reason.as_str());
            }
        }
    }
}
