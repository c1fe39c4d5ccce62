// ABOUTME: Slack transport for the adapter core, built on slack-morphism
// ABOUTME: Web API for directory queries and posting, Socket Mode for the realtime event stream

pub mod events;

use anyhow::{Context, Result};
use async_trait::async_trait;
use slack_morphism::errors::SlackClientError;
use slack_morphism::models::socket_mode::SlackSocketModeHelloEvent;
use slack_morphism::prelude::*;
use slink_core::{
    Credential, EntityKind, EntityRecord, EventStream, InboundEvent, PostOptions, RelayError,
    Transport, WorkspaceInfo,
};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

/// Page size for cursor-paginated list calls
const PAGE_LIMIT: u16 = 200;

// =============================================================================
// Shared state passed to Socket Mode callbacks via SlackClientEventsUserState
// =============================================================================

/// State shared with Socket Mode callback functions via user state storage.
/// Callbacks are fn pointers (not closures), so the event sender travels
/// through `with_user_state()` instead of a capture.
#[derive(Clone)]
struct SlackBridgeState {
    tx: mpsc::Sender<InboundEvent>,
}

// =============================================================================
// Socket Mode callback functions (must be fn pointers, not closures)
// =============================================================================

/// Decode push events and feed them to the event stream
async fn handle_push_event(
    event: SlackPushEventCallback,
    _client: Arc<SlackHyperClient>,
    states: SlackClientEventsUserState,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let bridge = {
        let guard = states.read().await;
        guard
            .get_user_state::<SlackBridgeState>()
            .cloned()
            .ok_or("SlackBridgeState not found in user state")?
    };

    if let Some(inbound) = events::decode_callback(&event.event)? {
        if bridge.tx.send(inbound).await.is_err() {
            tracing::warn!(platform = "slack", "Event stream receiver dropped");
        }
    }
    Ok(())
}

/// Slack says hello on every (re)connection; each one starts a new session
async fn handle_hello_event(
    hello: SlackSocketModeHelloEvent,
    _client: Arc<SlackHyperClient>,
    states: SlackClientEventsUserState,
) {
    let event = events::decode_hello(&hello);
    let bridge = states.read().await.get_user_state::<SlackBridgeState>().cloned();
    match bridge {
        Some(bridge) => {
            if bridge.tx.send(event).await.is_err() {
                tracing::warn!(platform = "slack", "Event stream receiver dropped");
            }
        }
        None => tracing::error!(platform = "slack", "SlackBridgeState not found in user state"),
    }
}

/// Socket Mode error handler; errors become events so the supervisor sees them
fn socket_mode_error_handler(
    err: Box<dyn std::error::Error + Send + Sync>,
    _client: Arc<SlackHyperClient>,
    states: SlackClientEventsUserState,
) -> HttpStatusCode {
    let message = err.to_string();
    tracing::error!(platform = "slack", error = %message, "Socket Mode error");

    let event = match events::auth_failure_in(&message) {
        Some(code) => InboundEvent::AuthInvalid(code.to_string()),
        None => InboundEvent::ProtocolError(message),
    };

    // Sync callback: never wait on the state lock or the channel
    if let Ok(guard) = states.try_read() {
        if let Some(bridge) = guard.get_user_state::<SlackBridgeState>() {
            if bridge.tx.try_send(event).is_err() {
                tracing::warn!(platform = "slack", "Event stream full or closed, error event dropped");
            }
        }
    }
    HttpStatusCode::OK
}

/// Map a Web API error, splitting rejected credentials from everything else
fn api_error(err: SlackClientError, call: &'static str) -> RelayError {
    if let SlackClientError::ApiError(api) = &err {
        if events::is_auth_failure(&api.code) {
            return RelayError::AuthInvalid(api.code.clone());
        }
    }
    RelayError::Transport(anyhow::Error::new(err).context(format!("Slack {} failed", call)))
}

// =============================================================================
// Entity conversion
// =============================================================================

fn channel_record(info: &SlackChannelInfo, kind: EntityKind) -> Option<EntityRecord> {
    let name = info.name.clone().filter(|n| !n.is_empty())?;
    let id = info.id.to_string();
    Some(match kind {
        EntityKind::PrivateGroup => EntityRecord::group(id, name),
        _ => EntityRecord::channel(id, name),
    })
}

fn user_record(user: &SlackUser) -> EntityRecord {
    let id = user.id.to_string();
    let name = user
        .name
        .clone()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| id.clone());
    let mut record = EntityRecord::user(id, name);
    record.real_name = user
        .profile
        .as_ref()
        .and_then(|p| p.real_name.clone())
        .filter(|n| !n.trim().is_empty());
    record
}

// =============================================================================
// SlackTransport
// =============================================================================

#[derive(Clone)]
struct Tokens {
    bot: SlackApiToken,
    app: SlackApiToken,
}

/// Slack implementation of the adapter's `Transport`
pub struct SlackTransport {
    /// Shared Slack client for Web API calls
    client: Arc<SlackHyperClient>,
    /// Set by `authenticate`
    tokens: RwLock<Option<Tokens>>,
    /// Capacity of the Socket Mode event channel
    event_buffer: usize,
}

impl SlackTransport {
    pub fn new(event_buffer: usize) -> Result<Self> {
        let client = Arc::new(SlackClient::new(
            SlackClientHyperConnector::new().context("Failed to create Slack HTTP connector")?,
        ));
        Ok(Self {
            client,
            tokens: RwLock::new(None),
            event_buffer: event_buffer.max(1),
        })
    }

    fn tokens(&self) -> Result<Tokens, RelayError> {
        self.tokens
            .read()
            .ok()
            .and_then(|tokens| tokens.clone())
            .ok_or(RelayError::NotAuthenticated)
    }

    fn bot_token(&self) -> Result<SlackApiToken> {
        Ok(self.tokens()?.bot)
    }

    /// Every conversation of one type, following `next_cursor` to the end.
    /// Archived conversations are excluded.
    async fn list_conversations(
        &self,
        conversation_type: SlackConversationType,
        kind: EntityKind,
    ) -> Result<Vec<EntityRecord>> {
        let token = self.bot_token()?;
        let session = self.client.open_session(&token);

        let mut request = SlackApiConversationsListRequest::new()
            .with_types(vec![conversation_type])
            .with_exclude_archived(true)
            .with_limit(PAGE_LIMIT);
        let mut records = Vec::new();

        loop {
            let response = session
                .conversations_list(&request)
                .await
                .with_context(|| format!("Failed to list Slack {}", kind))?;

            records.extend(
                response
                    .channels
                    .iter()
                    .filter_map(|info| channel_record(info, kind)),
            );

            match next_cursor(response.response_metadata.as_ref()) {
                Some(cursor) => request = request.with_cursor(cursor),
                None => break,
            }
        }

        tracing::debug!(platform = "slack", category = %kind, count = records.len(), "Listed conversations");
        Ok(records)
    }
}

fn next_cursor(metadata: Option<&SlackResponseMetadata>) -> Option<SlackCursorId> {
    metadata
        .and_then(|m| m.next_cursor.clone())
        .filter(|cursor| !cursor.0.is_empty())
}

#[async_trait]
impl Transport for SlackTransport {
    async fn authenticate(&self, credential: &Credential) -> Result<(), RelayError> {
        let tokens = Tokens {
            bot: SlackApiToken::new(SlackApiTokenValue(credential.bot_token.clone())),
            app: SlackApiToken::new(SlackApiTokenValue(credential.app_token.clone())),
        };

        let session = self.client.open_session(&tokens.bot);
        let response = session
            .auth_test()
            .await
            .map_err(|e| api_error(e, "auth.test"))?;

        tracing::info!(
            platform = "slack",
            bot_user = %response.user_id,
            team = %response.team,
            "Slack bot authenticated"
        );

        if let Ok(mut current) = self.tokens.write() {
            *current = Some(tokens);
        }
        Ok(())
    }

    async fn connect(&self, stop: CancellationToken) -> Result<EventStream> {
        let app_token = self.tokens()?.app;
        let (tx, rx) = mpsc::channel(self.event_buffer);
        let client = Arc::clone(&self.client);
        let bridge_state = SlackBridgeState { tx: tx.clone() };

        // Spawn Socket Mode listener; it reconnects on its own until stopped and
        // reports every new connection through the hello callback
        tokio::spawn(async move {
            let socket_mode_callbacks = SlackSocketModeListenerCallbacks::new()
                .with_hello_events(handle_hello_event)
                .with_push_events(handle_push_event);

            let listener_environment = Arc::new(
                SlackClientEventsListenerEnvironment::new(client)
                    .with_error_handler(socket_mode_error_handler)
                    .with_user_state(bridge_state),
            );

            let socket_mode_listener = SlackClientSocketModeListener::new(
                &SlackClientSocketModeConfig::new(),
                listener_environment,
                socket_mode_callbacks,
            );

            if let Err(e) = socket_mode_listener.listen_for(&app_token).await {
                tracing::error!(
                    platform = "slack",
                    error = %e,
                    "Failed to start Socket Mode listener"
                );
                let event = match &e {
                    SlackClientError::ApiError(api) if events::is_auth_failure(&api.code) => {
                        InboundEvent::AuthInvalid(api.code.clone())
                    }
                    _ => InboundEvent::ProtocolError(format!("Socket Mode listener failed: {}", e)),
                };
                let _ = tx.send(event).await;
                return;
            }

            tracing::info!(platform = "slack", "Socket Mode listener started");

            tokio::select! {
                exit_code = socket_mode_listener.serve() => {
                    tracing::info!(platform = "slack", exit_code, "Socket Mode listener stopped");
                }
                _ = stop.cancelled() => {
                    tracing::info!(platform = "slack", "Socket Mode shutting down");
                    socket_mode_listener.shutdown().await;
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn query_channels(&self) -> Result<Vec<EntityRecord>> {
        self.list_conversations(SlackConversationType::Public, EntityKind::PublicChannel)
            .await
    }

    async fn query_groups(&self) -> Result<Vec<EntityRecord>> {
        self.list_conversations(SlackConversationType::Private, EntityKind::PrivateGroup)
            .await
    }

    async fn query_users(&self) -> Result<Vec<EntityRecord>> {
        let token = self.bot_token()?;
        let session = self.client.open_session(&token);

        let mut request = SlackApiUsersListRequest::new().with_limit(PAGE_LIMIT);
        let mut records = Vec::new();

        loop {
            let response = session
                .users_list(&request)
                .await
                .context("Failed to list Slack users")?;

            records.extend(
                response
                    .members
                    .iter()
                    .filter(|user| !user.deleted.unwrap_or(false))
                    .map(user_record),
            );

            match next_cursor(response.response_metadata.as_ref()) {
                Some(cursor) => request = request.with_cursor(cursor),
                None => break,
            }
        }

        tracing::debug!(platform = "slack", count = records.len(), "Listed users");
        Ok(records)
    }

    async fn user_info(&self, user_id: &str) -> Result<EntityRecord> {
        let token = self.bot_token()?;
        let session = self.client.open_session(&token);

        let response = session
            .users_info(&SlackApiUsersInfoRequest::new(SlackUserId(user_id.to_string())))
            .await
            .with_context(|| format!("Failed to look up Slack user {}", user_id))?;

        Ok(user_record(&response.user))
    }

    async fn who_am_i(&self) -> Result<String> {
        let token = self.bot_token()?;
        let session = self.client.open_session(&token);

        let response = session
            .auth_test()
            .await
            .context("Failed to call Slack auth.test")?;
        Ok(response.user_id.to_string())
    }

    async fn workspace_info(&self) -> Result<WorkspaceInfo> {
        let token = self.bot_token()?;
        let session = self.client.open_session(&token);

        let response = session
            .team_info(&SlackApiTeamInfoRequest::new())
            .await
            .context("Failed to call Slack team.info")?;

        let team = response.team;
        Ok(WorkspaceInfo {
            id: team.id.to_string(),
            name: team.name.unwrap_or_default(),
            domain: team.domain.unwrap_or_default(),
        })
    }

    async fn post_message(
        &self,
        routing_id: &str,
        text: &str,
        options: &PostOptions,
    ) -> Result<()> {
        let token = self.bot_token()?;
        let session = self.client.open_session(&token);

        let request = SlackApiChatPostMessageRequest::new(
            routing_id.into(),
            SlackMessageContent::new().with_text(text.to_string()),
        )
        .with_as_user(options.as_user);

        // Errors go back untouched; the caller sees Slack's own error code
        session.chat_post_message(&request).await?;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
