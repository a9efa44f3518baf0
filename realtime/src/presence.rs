use crate::channel::{ChannelId, ChannelState, ChannelTable};
use crate::message::{PresenceState, ServerEvent};
use crate::session::SessionId;
use async_trait::async_trait;
use events::{DomainEvent, EventHandler, Id};
use log::*;
use std::sync::Arc;

/// Enqueues a presence change of `session_id` to the other members of the
/// channel. Must be called with the channel lock held by the same critical
/// section that changed the membership, so an observer can never see the
/// changes of one session out of order. Returns the members found unreachable.
pub(crate) fn announce(
    state: &mut ChannelState,
    channel_id: &ChannelId,
    session_id: &SessionId,
    user_id: Id,
    presence: PresenceState,
) -> Vec<SessionId> {
    let event = ServerEvent::Presence {
        channel_id: channel_id.clone(),
        user_id,
        session_id: session_id.clone(),
        state: presence,
    };
    // The subject never receives its own presence change
    state.fanout(&event, Some(session_id))
}

/// Drops terminated sessions from their channels and tells the remaining
/// members they went `offline`.
///
/// Presence uses the channel's out-of-band fanout: it is serialized with regular
/// messages by the channel lock but never consumes a sequence number. `joined`
/// and `left` are announced by the router while it holds the channel lock.
pub struct PresencePublisher {
    table: Arc<ChannelTable>,
}

impl PresencePublisher {
    pub fn new(table: Arc<ChannelTable>) -> Self {
        Self { table }
    }

    async fn go_offline(&self, channel_id: &str, session_id: &SessionId, user_id: Id) {
        let Ok(channel_id) = ChannelId::parse(channel_id) else {
            return;
        };
        let Some(channel) = self.table.get(&channel_id) else {
            trace!("Skipping offline notice for unloaded channel {channel_id}");
            return;
        };

        let unreachable = {
            let mut state = channel.lock().await;
            if state.remove(session_id).is_some() {
                debug!("Removed terminated session {session_id} from channel {channel_id}");
            }
            announce(
                &mut state,
                &channel_id,
                session_id,
                user_id,
                PresenceState::Offline,
            )
        };
        self.table.reap(unreachable);
    }
}

#[async_trait]
impl EventHandler for PresencePublisher {
    async fn handle(&self, event: &DomainEvent) {
        let DomainEvent::SessionTerminated {
            session_id,
            user_id,
            channel_ids,
            ..
        } = event
        else {
            return;
        };

        debug!(
            "Publishing offline presence of {session_id} to {} channel(s)",
            channel_ids.len()
        );
        let session_id = SessionId::from(session_id.clone());
        for channel_id in channel_ids {
            self.go_offline(channel_id, &session_id, *user_id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::PresencePublisher;
    use crate::channel::{ChannelId, ChannelTable};
    use crate::message::{PresenceState, ServerEvent};
    use crate::session::{Reaper, SessionId};
    use crate::testing::{connect, connect_as, drain, fixture, outbox};
    use crate::RelayConfig;
    use events::{DomainEvent, EventHandler, Id, TerminationReason};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    const RACE_ROUNDS: usize = 1000;

    fn presence_states(events: &[ServerEvent]) -> Vec<PresenceState> {
        events
            .iter()
            .filter_map(|event| match event {
                ServerEvent::Presence { state, .. } => Some(*state),
                _ => None,
            })
            .collect()
    }

    fn presence_of(events: &[ServerEvent], subject: &SessionId) -> Vec<PresenceState> {
        events
            .iter()
            .filter_map(|event| match event {
                ServerEvent::Presence {
                    session_id, state, ..
                } if session_id == subject => Some(*state),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn terminated_session_is_removed_from_listed_channels() {
        let (tx, _reaped) = mpsc::unbounded_channel();
        let table = Arc::new(ChannelTable::new(Reaper::new(tx)));
        let publisher = PresencePublisher::new(table.clone());
        let general = ChannelId::parse("general").unwrap();
        let random = ChannelId::parse("random").unwrap();
        let session = SessionId::new();
        let observer = SessionId::new();
        let (observer_tx, mut observer_rx) = outbox();
        for channel_id in [&general, &random] {
            let (tx, _rx) = outbox();
            let channel = table.get_or_insert(channel_id);
            let mut state = channel.lock().await;
            state.insert(session.clone(), Id::new_v4(), tx);
            state.insert(observer.clone(), Id::new_v4(), observer_tx.clone());
        }

        publisher
            .handle(&DomainEvent::SessionTerminated {
                session_id: session.to_string(),
                user_id: Id::new_v4(),
                channel_ids: vec!["general".to_string(), "random".to_string()],
                reason: TerminationReason::Disconnected,
            })
            .await;

        assert!(!table.get(&general).unwrap().lock().await.contains(&session));
        assert!(!table.get(&random).unwrap().lock().await.contains(&session));
        assert_eq!(
            presence_of(&drain(&mut observer_rx), &session),
            vec![PresenceState::Offline, PresenceState::Offline]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn offline_never_precedes_joined_when_subscribe_races_terminate() {
        let fx = fixture(RelayConfig::default());
        let general = ChannelId::parse("general").unwrap();
        let (observer, mut observer_rx) = connect(&fx).await;
        fx.hub.router().subscribe(&observer.id, &general).await.unwrap();

        for _ in 0..RACE_ROUNDS {
            let (phone, _phone_rx) = connect(&fx).await;

            let hub = fx.hub.clone();
            let (session_id, channel_id) = (phone.id.clone(), general.clone());
            let subscribe = tokio::spawn(async move {
                let _ = hub.router().subscribe(&session_id, &channel_id).await;
            });
            let hub = fx.hub.clone();
            let session_id = phone.id.clone();
            let terminate = tokio::spawn(async move {
                hub.registry()
                    .terminate(&session_id, TerminationReason::Disconnected)
                    .await;
            });
            subscribe.await.unwrap();
            terminate.await.unwrap();

            let seen = presence_of(&drain(&mut observer_rx), &phone.id);
            assert!(
                seen.is_empty() || seen == vec![PresenceState::Joined, PresenceState::Offline],
                "observer saw {seen:?}"
            );
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn left_never_follows_offline_when_unsubscribe_races_terminate() {
        let fx = fixture(RelayConfig::default());
        let general = ChannelId::parse("general").unwrap();
        let (observer, mut observer_rx) = connect(&fx).await;
        fx.hub.router().subscribe(&observer.id, &general).await.unwrap();

        for _ in 0..RACE_ROUNDS {
            let (phone, _phone_rx) = connect(&fx).await;
            fx.hub.router().subscribe(&phone.id, &general).await.unwrap();
            drain(&mut observer_rx);

            let hub = fx.hub.clone();
            let (session_id, channel_id) = (phone.id.clone(), general.clone());
            let unsubscribe = tokio::spawn(async move {
                let _ = hub.router().unsubscribe(&session_id, &channel_id).await;
            });
            let hub = fx.hub.clone();
            let session_id = phone.id.clone();
            let terminate = tokio::spawn(async move {
                hub.registry()
                    .terminate(&session_id, TerminationReason::Disconnected)
                    .await;
            });
            unsubscribe.await.unwrap();
            terminate.await.unwrap();

            let seen = presence_of(&drain(&mut observer_rx), &phone.id);
            assert!(
                seen == vec![PresenceState::Left]
                    || seen == vec![PresenceState::Offline]
                    || seen == vec![PresenceState::Left, PresenceState::Offline],
                "observer saw {seen:?}"
            );
        }
    }

    #[tokio::test]
    async fn offline_fires_once_per_channel_even_when_terminated_twice() {
        let fx = fixture(RelayConfig::default());
        let general = ChannelId::parse("general").unwrap();
        let random = ChannelId::parse("random").unwrap();
        let (observer, mut observer_rx) = connect(&fx).await;
        let (leaver, _leaver_rx) = connect(&fx).await;
        let router = fx.hub.router();
        for channel_id in [&general, &random] {
            router.subscribe(&observer.id, channel_id).await.unwrap();
            router.subscribe(&leaver.id, channel_id).await.unwrap();
        }
        drain(&mut observer_rx);

        let registry = fx.hub.registry();
        registry
            .terminate(&leaver.id, TerminationReason::Disconnected)
            .await;
        registry
            .terminate(&leaver.id, TerminationReason::Disconnected)
            .await;

        let events = drain(&mut observer_rx);
        assert_eq!(
            presence_states(&events),
            vec![PresenceState::Offline, PresenceState::Offline]
        );
        for channel_id in [&general, &random] {
            let members = router.members(channel_id).await.unwrap();
            assert!(members.iter().all(|m| m.session_id != leaver.id));
        }
    }

    #[tokio::test]
    async fn join_and_leave_reach_observers_in_order() {
        let fx = fixture(RelayConfig::default());
        let general = ChannelId::parse("general").unwrap();
        let (observer, mut observer_rx) = connect(&fx).await;
        let user = events::Id::new_v4();
        let (phone, _phone_rx) = connect_as(&fx, user).await;
        let router = fx.hub.router();
        router.subscribe(&observer.id, &general).await.unwrap();

        router.subscribe(&phone.id, &general).await.unwrap();
        router.unsubscribe(&phone.id, &general).await.unwrap();
        router.subscribe(&phone.id, &general).await.unwrap();
        fx.hub
            .registry()
            .terminate(&phone.id, TerminationReason::Disconnected)
            .await;

        assert_eq!(
            presence_states(&drain(&mut observer_rx)),
            vec![
                PresenceState::Joined,
                PresenceState::Left,
                PresenceState::Joined,
                PresenceState::Offline
            ]
        );
    }

    #[tokio::test]
    async fn presence_does_not_consume_sequence_numbers() {
        let fx = fixture(RelayConfig::default());
        let general = ChannelId::parse("general").unwrap();
        let (s1, _rx1) = connect(&fx).await;
        let (s2, _rx2) = connect(&fx).await;
        let router = fx.hub.router();
        router.subscribe(&s1.id, &general).await.unwrap();
        router.subscribe(&s2.id, &general).await.unwrap();
        router.unsubscribe(&s2.id, &general).await.unwrap();

        assert_eq!(
            router.publish(&s1.id, &general, "hi".to_string()).await.unwrap(),
            1
        );
    }
}
