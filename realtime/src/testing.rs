//! Shared fixtures for the crate's unit tests.

use crate::auth::{AuthError, Authenticator};
use crate::hub::Hub;
use crate::message::{Outbox, ServerEvent};
use crate::store::memory::MemoryStore;
use crate::RelayConfig;
use async_trait::async_trait;
use dashmap::DashMap;
use events::Id;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver};

/// Accepts exactly the tokens it issued.
#[derive(Clone, Default)]
pub(crate) struct StaticAuthenticator {
    tokens: Arc<DashMap<String, Id>>,
}

impl StaticAuthenticator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn issue(&self, user_id: Id) -> String {
        let token = format!("token-{}", uuid::Uuid::new_v4());
        self.tokens.insert(token.clone(), user_id);
        token
    }
}

#[async_trait]
impl Authenticator for StaticAuthenticator {
    async fn verify(&self, credential_token: &str) -> Result<Id, AuthError> {
        self.tokens
            .get(credential_token)
            .map(|user| *user)
            .ok_or_else(|| AuthError::invalid("unknown token"))
    }
}

pub(crate) fn outbox() -> (Outbox, UnboundedReceiver<ServerEvent>) {
    mpsc::unbounded_channel()
}

pub(crate) struct Fixture {
    pub(crate) hub: Arc<Hub>,
    pub(crate) store: Arc<MemoryStore>,
    pub(crate) auth: StaticAuthenticator,
}

pub(crate) fn fixture(config: RelayConfig) -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let auth = StaticAuthenticator::new();
    let hub = Hub::new(config, store.clone(), Arc::new(auth.clone()));
    Fixture { hub, store, auth }
}

/// Connects a fresh user and returns its session plus the receiving end of its outbox,
/// with the initial `ready` event already consumed.
pub(crate) async fn connect(
    fixture: &Fixture,
) -> (crate::session::Session, UnboundedReceiver<ServerEvent>) {
    connect_as(fixture, Id::new_v4()).await
}

pub(crate) async fn connect_as(
    fixture: &Fixture,
    user_id: Id,
) -> (crate::session::Session, UnboundedReceiver<ServerEvent>) {
    let (tx, mut rx) = outbox();
    let session = fixture
        .hub
        .connect(&fixture.auth.issue(user_id), tx)
        .await
        .expect("connect");
    match rx.recv().await {
        Some(ServerEvent::Ready { .. }) => {}
        other => panic!("expected ready, got {other:?}"),
    }
    (session, rx)
}

/// Everything currently queued for a connection.
pub(crate) fn drain(rx: &mut UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub(crate) fn sequences(events: &[ServerEvent]) -> Vec<i64> {
    events
        .iter()
        .filter_map(|event| match event {
            ServerEvent::Message(message) => Some(message.sequence),
            _ => None,
        })
        .collect()
}
