use crate::auth::Authenticator;
use crate::channel::ChannelTable;
use crate::liveness;
use crate::message::{ClientEvent, EventType, Outbox, ServerEvent};
use crate::presence::PresencePublisher;
use crate::router::ChannelRouter;
use crate::session::{Reaper, Session, SessionId, SessionRegistry};
use crate::signaling::{CallRegistry, SignalEnvelope, SignalingRelay};
use crate::store::MessageStore;
use crate::{RelayConfig, Result};
use events::{EventPublisher, TerminationReason};
use log::*;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Composition root of the relay. One instance per process, shared by every
/// connection handler.
pub struct Hub {
    config: RelayConfig,
    registry: Arc<SessionRegistry>,
    router: ChannelRouter,
    relay: SignalingRelay,
}

impl Hub {
    /// Wires the components together and starts the cleanup task for sessions
    /// found unreachable during fanout. Must be called inside a Tokio runtime.
    pub fn new(
        config: RelayConfig,
        store: Arc<dyn MessageStore>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Arc<Self> {
        let (reaper_tx, mut reaper_rx) = mpsc::unbounded_channel::<SessionId>();
        let reaper = Reaper::new(reaper_tx);

        let table = Arc::new(ChannelTable::new(reaper.clone()));
        let calls = Arc::new(CallRegistry::new());
        let presence = Arc::new(PresencePublisher::new(table.clone()));

        let events = EventPublisher::new()
            .with_handler(calls.clone())
            .with_handler(presence);

        let registry = Arc::new(SessionRegistry::new(authenticator, events.clone()));
        let router = ChannelRouter::new(
            registry.clone(),
            table,
            store,
            events,
            config.clone(),
        );
        let relay = SignalingRelay::new(registry.clone(), calls, reaper);

        let cleanup_registry = registry.clone();
        tokio::spawn(async move {
            while let Some(session_id) = reaper_rx.recv().await {
                cleanup_registry
                    .terminate(&session_id, TerminationReason::DeliveryFailed)
                    .await;
            }
            debug!("Session cleanup task stopped");
        });

        Arc::new(Self {
            config,
            registry,
            router,
            relay,
        })
    }

    /// Authenticates a new connection and greets it with `ready`.
    pub async fn connect(&self, credential_token: &str, outbox: Outbox) -> Result<Session> {
        let session = self.registry.register(credential_token, outbox).await?;
        let _ = session.outbox().send(ServerEvent::Ready {
            session_id: session.id.clone(),
            user_id: session.user_id,
        });
        Ok(session)
    }

    pub async fn disconnect(&self, session_id: &SessionId) {
        self.registry
            .terminate(session_id, TerminationReason::Disconnected)
            .await;
    }

    /// Handles one inbound client event and returns the reply for its sender.
    /// Any event counts as activity for the liveness check.
    pub async fn dispatch(&self, session_id: &SessionId, event: ClientEvent) -> Result<ServerEvent> {
        self.registry.touch(session_id)?;
        trace!("Dispatching {} from {session_id}", event.event_type());

        match event {
            ClientEvent::Subscribe { channel_id } => {
                let members = self.router.subscribe(session_id, &channel_id).await?;
                Ok(ServerEvent::Subscribed {
                    channel_id,
                    members,
                })
            }
            ClientEvent::Unsubscribe { channel_id } => {
                self.router.unsubscribe(session_id, &channel_id).await?;
                Ok(ServerEvent::Unsubscribed { channel_id })
            }
            ClientEvent::Publish {
                channel_id,
                payload,
            } => {
                let sequence = self.router.publish(session_id, &channel_id, payload).await?;
                Ok(ServerEvent::Published {
                    channel_id,
                    sequence,
                })
            }
            ClientEvent::Signal { to, kind, payload } => {
                self.relay.send_signal(SignalEnvelope {
                    from: session_id.clone(),
                    to: to.clone(),
                    kind,
                    payload,
                })?;
                Ok(ServerEvent::Signaled { to, kind })
            }
            ClientEvent::History {
                channel_id,
                before_seq,
                limit,
            } => {
                let messages = self.router.history(&channel_id, before_seq, limit).await?;
                Ok(ServerEvent::History {
                    channel_id,
                    messages,
                })
            }
            ClientEvent::Ping => Ok(ServerEvent::Pong),
        }
    }

    /// Starts the periodic idle-session sweep configured in [`RelayConfig`].
    pub fn spawn_liveness_sweeper(&self) -> JoinHandle<()> {
        liveness::spawn(
            self.registry.clone(),
            self.config.session_idle_timeout,
            self.config.liveness_sweep_interval,
        )
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn router(&self) -> &ChannelRouter {
        &self.router
    }

    pub fn relay(&self) -> &SignalingRelay {
        &self.relay
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelId;
    use crate::signaling::SignalKind;
    use crate::testing::{connect, drain, fixture, outbox, sequences};
    use crate::Error;
    use serde_json::json;

    fn general() -> ChannelId {
        ChannelId::parse("general").unwrap()
    }

    #[tokio::test]
    async fn connect_with_bad_token_is_unauthenticated() {
        let fx = fixture(RelayConfig::default());
        let (tx, mut rx) = outbox();

        let result = fx.hub.connect("nope", tx).await;

        assert!(matches!(result, Err(Error::Unauthenticated)));
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn dispatch_after_disconnect_fails() {
        let fx = fixture(RelayConfig::default());
        let (s1, _rx1) = connect(&fx).await;
        fx.hub.disconnect(&s1.id).await;

        let result = fx.hub.dispatch(&s1.id, ClientEvent::Ping).await;

        assert!(matches!(result, Err(Error::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn dispatch_replies_to_each_request_kind() {
        let fx = fixture(RelayConfig::default());
        let (s1, _rx1) = connect(&fx).await;
        let (s2, _rx2) = connect(&fx).await;
        let hub = &fx.hub;

        assert_eq!(
            hub.dispatch(&s1.id, ClientEvent::Ping).await.unwrap(),
            ServerEvent::Pong
        );
        assert!(matches!(
            hub.dispatch(&s1.id, ClientEvent::Subscribe { channel_id: general() })
                .await
                .unwrap(),
            ServerEvent::Subscribed { .. }
        ));
        assert_eq!(
            hub.dispatch(
                &s1.id,
                ClientEvent::Publish {
                    channel_id: general(),
                    payload: "hi".to_string()
                }
            )
            .await
            .unwrap(),
            ServerEvent::Published {
                channel_id: general(),
                sequence: 1
            }
        );
        assert_eq!(
            hub.dispatch(
                &s1.id,
                ClientEvent::Signal {
                    to: s2.id.clone(),
                    kind: SignalKind::Offer,
                    payload: json!({})
                }
            )
            .await
            .unwrap(),
            ServerEvent::Signaled {
                to: s2.id.clone(),
                kind: SignalKind::Offer
            }
        );
        assert!(matches!(
            hub.dispatch(
                &s1.id,
                ClientEvent::History {
                    channel_id: general(),
                    before_seq: None,
                    limit: None
                }
            )
            .await
            .unwrap(),
            ServerEvent::History { messages, .. } if messages.len() == 1
        ));
        assert_eq!(
            hub.dispatch(&s1.id, ClientEvent::Unsubscribe { channel_id: general() })
                .await
                .unwrap(),
            ServerEvent::Unsubscribed {
                channel_id: general()
            }
        );
    }

    #[tokio::test]
    async fn general_channel_scenario_with_mid_stream_disconnect() {
        let fx = fixture(RelayConfig::default());
        let (s1, _rx1) = connect(&fx).await;
        let (s2, mut rx2) = connect(&fx).await;
        let router = fx.hub.router();
        router.subscribe(&s1.id, &general()).await.unwrap();
        router.subscribe(&s2.id, &general()).await.unwrap();

        assert_eq!(router.publish(&s1.id, &general(), "hi".to_string()).await.unwrap(), 1);
        assert_eq!(sequences(&drain(&mut rx2)), vec![1]);
        assert_eq!(router.publish(&s1.id, &general(), "hi2".to_string()).await.unwrap(), 2);
        assert_eq!(sequences(&drain(&mut rx2)), vec![2]);

        // S2's connection drops while the third message is in flight
        drop(rx2);
        assert_eq!(router.publish(&s1.id, &general(), "hi3".to_string()).await.unwrap(), 3);

        // S2 reconnects and recovers from history
        let (s2_again, _rx) = connect(&fx).await;
        let recovered = fx
            .hub
            .dispatch(
                &s2_again.id,
                ClientEvent::History {
                    channel_id: general(),
                    before_seq: None,
                    limit: Some(2),
                },
            )
            .await
            .unwrap();
        match recovered {
            ServerEvent::History { messages, .. } => {
                let payloads: Vec<(i64, &str)> = messages
                    .iter()
                    .map(|m| (m.sequence, m.payload.as_str()))
                    .collect();
                assert_eq!(payloads, vec![(2, "hi2"), (3, "hi3")]);
            }
            other => panic!("unexpected reply {other:?}"),
        }
    }

    #[tokio::test]
    async fn terminated_session_receives_no_further_fanout() {
        let fx = fixture(RelayConfig::default());
        let (s1, _rx1) = connect(&fx).await;
        let (s2, mut rx2) = connect(&fx).await;
        let router = fx.hub.router();
        router.subscribe(&s1.id, &general()).await.unwrap();
        router.subscribe(&s2.id, &general()).await.unwrap();

        fx.hub.disconnect(&s2.id).await;
        router.publish(&s1.id, &general(), "after".to_string()).await.unwrap();

        assert!(sequences(&drain(&mut rx2)).is_empty());
    }
}
