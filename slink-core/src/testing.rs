// ABOUTME: Test doubles for the adapter: a scripted in-memory transport and a recording handler.
// ABOUTME: Lets directory, classifier, router and supervisor tests run without a chat service.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::error::RelayError;
use crate::traits::{
    BotHandler, ChannelData, ChatUser, Credential, EntityKind, EntityRecord, EventStream,
    InboundEvent, OutboundSender, PostOptions, Transport, WorkspaceInfo,
};

/// A message posted through the fake transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedMessage {
    pub routing_id: String,
    pub text: String,
    pub options: PostOptions,
}

#[derive(Default)]
struct FakeState {
    channels: Vec<EntityRecord>,
    groups: Vec<EntityRecord>,
    users: Vec<EntityRecord>,
    failing: HashSet<EntityKind>,
    user_info_fails: bool,
    self_id: String,
    workspace: WorkspaceInfo,
    auth_rejection: Option<String>,
    post_error: Option<String>,
    authenticated_with: Option<Credential>,
    posts: Vec<PostedMessage>,
}

/// In-memory transport with a scripted directory and event stream.
///
/// Events pushed with `push_event` are delivered in order to whoever called
/// `connect`; `close_events` ends the stream.
pub struct FakeTransport {
    state: Mutex<FakeState>,
    event_tx: Mutex<Option<mpsc::UnboundedSender<InboundEvent>>>,
    event_rx: Mutex<Option<mpsc::UnboundedReceiver<InboundEvent>>>,
    query_rounds: AtomicUsize,
    user_info_calls: AtomicUsize,
    maintenance_running: Arc<AtomicBool>,
}

impl FakeTransport {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            state: Mutex::new(FakeState {
                self_id: "UBOT".to_string(),
                workspace: WorkspaceInfo {
                    id: "T1".to_string(),
                    name: "Acme".to_string(),
                    domain: "acme".to_string(),
                },
                ..Default::default()
            }),
            event_tx: Mutex::new(Some(tx)),
            event_rx: Mutex::new(Some(rx)),
            query_rounds: AtomicUsize::new(0),
            user_info_calls: AtomicUsize::new(0),
            maintenance_running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_channels(self, channels: Vec<EntityRecord>) -> Self {
        self.set_channels(channels);
        self
    }

    pub fn with_groups(self, groups: Vec<EntityRecord>) -> Self {
        self.set_groups(groups);
        self
    }

    pub fn with_users(self, users: Vec<EntityRecord>) -> Self {
        self.set_users(users);
        self
    }

    pub fn with_self_id(self, id: &str) -> Self {
        self.state.lock().unwrap().self_id = id.to_string();
        self
    }

    pub fn with_domain(self, domain: &str) -> Self {
        self.state.lock().unwrap().workspace.domain = domain.to_string();
        self
    }

    pub fn set_channels(&self, channels: Vec<EntityRecord>) {
        self.state.lock().unwrap().channels = channels;
    }

    pub fn set_groups(&self, groups: Vec<EntityRecord>) {
        self.state.lock().unwrap().groups = groups;
    }

    pub fn set_users(&self, users: Vec<EntityRecord>) {
        self.state.lock().unwrap().users = users;
    }

    /// Make queries for one category fail (or succeed again)
    pub fn fail_category(&self, kind: EntityKind, fail: bool) {
        let mut state = self.state.lock().unwrap();
        if fail {
            state.failing.insert(kind);
        } else {
            state.failing.remove(&kind);
        }
    }

    pub fn fail_user_info(&self, fail: bool) {
        self.state.lock().unwrap().user_info_fails = fail;
    }

    /// Reject `authenticate` with the given reason
    pub fn reject_auth(&self, reason: &str) {
        self.state.lock().unwrap().auth_rejection = Some(reason.to_string());
    }

    /// Make `post_message` fail with the given message (None to succeed)
    pub fn fail_posts(&self, error: Option<&str>) {
        self.state.lock().unwrap().post_error = error.map(str::to_string);
    }

    /// Queue an event for the connected stream
    pub fn push_event(&self, event: InboundEvent) {
        if let Some(tx) = self.event_tx.lock().unwrap().as_ref() {
            let _ = tx.send(event);
        }
    }

    /// End the event stream after the queued events
    pub fn close_events(&self) {
        self.event_tx.lock().unwrap().take();
    }

    pub fn posts(&self) -> Vec<PostedMessage> {
        self.state.lock().unwrap().posts.clone()
    }

    pub fn authenticated_with(&self) -> Option<Credential> {
        self.state.lock().unwrap().authenticated_with.clone()
    }

    /// Number of channel queries made, i.e. refresh rounds
    pub fn query_rounds(&self) -> usize {
        self.query_rounds.load(Ordering::SeqCst)
    }

    pub fn user_info_calls(&self) -> usize {
        self.user_info_calls.load(Ordering::SeqCst)
    }

    /// Whether the background task spawned by `connect` is still alive
    pub fn maintenance_running(&self) -> bool {
        self.maintenance_running.load(Ordering::SeqCst)
    }

    fn query(&self, kind: EntityKind) -> Result<Vec<EntityRecord>> {
        let state = self.state.lock().unwrap();
        if state.failing.contains(&kind) {
            anyhow::bail!("{} query failed", kind);
        }
        Ok(match kind {
            EntityKind::PublicChannel => state.channels.clone(),
            EntityKind::PrivateGroup => state.groups.clone(),
            EntityKind::DirectUser => state.users.clone(),
        })
    }
}

impl Default for FakeTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn authenticate(&self, credential: &Credential) -> Result<(), RelayError> {
        let mut state = self.state.lock().unwrap();
        if let Some(reason) = state.auth_rejection.clone() {
            return Err(RelayError::AuthInvalid(reason));
        }
        state.authenticated_with = Some(credential.clone());
        Ok(())
    }

    async fn connect(&self, stop: CancellationToken) -> Result<EventStream> {
        let rx = self
            .event_rx
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| anyhow::anyhow!("fake transport already connected"))?;

        let running = Arc::clone(&self.maintenance_running);
        running.store(true, Ordering::SeqCst);
        tokio::spawn(async move {
            stop.cancelled().await;
            running.store(false, Ordering::SeqCst);
        });

        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    async fn query_channels(&self) -> Result<Vec<EntityRecord>> {
        self.query_rounds.fetch_add(1, Ordering::SeqCst);
        self.query(EntityKind::PublicChannel)
    }

    async fn query_groups(&self) -> Result<Vec<EntityRecord>> {
        self.query(EntityKind::PrivateGroup)
    }

    async fn query_users(&self) -> Result<Vec<EntityRecord>> {
        self.query(EntityKind::DirectUser)
    }

    async fn user_info(&self, user_id: &str) -> Result<EntityRecord> {
        self.user_info_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        if state.user_info_fails {
            anyhow::bail!("user_not_found");
        }
        state
            .users
            .iter()
            .find(|user| user.id == user_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("user_not_found"))
    }

    async fn who_am_i(&self) -> Result<String> {
        Ok(self.state.lock().unwrap().self_id.clone())
    }

    async fn workspace_info(&self) -> Result<WorkspaceInfo> {
        Ok(self.state.lock().unwrap().workspace.clone())
    }

    async fn post_message(
        &self,
        routing_id: &str,
        text: &str,
        options: &PostOptions,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.post_error.clone() {
            anyhow::bail!(error);
        }
        state.posts.push(PostedMessage {
            routing_id: routing_id.to_string(),
            text: text.to_string(),
            options: options.clone(),
        });
        Ok(())
    }
}

/// A message seen by the recording handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub channel: ChannelData,
    pub text: String,
    pub sender: ChatUser,
}

/// Bot handler that records every message and keeps the outbound capability
#[derive(Default)]
pub struct RecordingHandler {
    received: Mutex<Vec<ReceivedMessage>>,
    outbound: Mutex<Option<Arc<dyn OutboundSender>>>,
    notify: tokio::sync::Notify,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn received(&self) -> Vec<ReceivedMessage> {
        self.received.lock().unwrap().clone()
    }

    pub fn outbound(&self) -> Option<Arc<dyn OutboundSender>> {
        self.outbound.lock().unwrap().clone()
    }

    /// Wait until at least `count` messages have been received
    pub async fn wait_for(&self, count: usize) {
        loop {
            let notified = self.notify.notified();
            if self.received.lock().unwrap().len() >= count {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl BotHandler for RecordingHandler {
    async fn message_received(&self, channel: &ChannelData, text: &str, sender: &ChatUser) {
        self.received.lock().unwrap().push(ReceivedMessage {
            channel: channel.clone(),
            text: text.to_string(),
            sender: sender.clone(),
        });
        self.notify.notify_waiters();
    }

    fn register_outbound(&self, outbound: Arc<dyn OutboundSender>) {
        *self.outbound.lock().unwrap() = Some(outbound);
    }
}
