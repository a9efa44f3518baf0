//! Call-setup signaling relay.
//!
//! Envelopes are routed by session id and never inspected: the relay only looks
//! at `kind` to maintain its call pairing table. Media negotiation itself
//! (ICE, STUN/TURN, codecs) happens between the clients.

use crate::message::{Outbox, ServerEvent};
use crate::session::{Reaper, Session, SessionId, SessionRegistry};
use crate::{Error, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use events::{DomainEvent, EventHandler};
use log::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Offer,
    Answer,
    Candidate,
    Hangup,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignalEnvelope {
    pub from: SessionId,
    pub to: SessionId,
    pub kind: SignalKind,
    pub payload: Value,
}

struct Pairing {
    peer: SessionId,
    peer_outbox: Outbox,
}

/// Active call pairings, indexed from both ends.
#[derive(Default)]
pub struct CallRegistry {
    pairings: DashMap<SessionId, Pairing>,
}

impl CallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn peer_of(&self, session_id: &SessionId) -> Option<SessionId> {
        self.pairings.get(session_id).map(|p| p.peer.clone())
    }

    pub fn len(&self) -> usize {
        self.pairings.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.pairings.is_empty()
    }

    /// Pairs `a` and `b`, releasing any earlier pairing either of them had.
    fn pair(&self, a: (&SessionId, &Outbox), b: (&SessionId, &Outbox)) {
        self.unpair(a.0);
        self.unpair(b.0);
        self.pairings.insert(
            a.0.clone(),
            Pairing {
                peer: b.0.clone(),
                peer_outbox: b.1.clone(),
            },
        );
        self.pairings.insert(
            b.0.clone(),
            Pairing {
                peer: a.0.clone(),
                peer_outbox: a.1.clone(),
            },
        );
    }

    /// Releases the pairing of `session_id` on both ends, returning the peer's side.
    fn unpair(&self, session_id: &SessionId) -> Option<Pairing> {
        let (_, pairing) = self.pairings.remove(session_id)?;
        self.pairings
            .remove_if(&pairing.peer, |_, back| &back.peer == session_id);
        Some(pairing)
    }

    /// Releases the pairing of `a` only when its peer is `b`.
    fn unpair_peers(&self, a: &SessionId, b: &SessionId) -> bool {
        if self.pairings.remove_if(a, |_, p| &p.peer == b).is_none() {
            return false;
        }
        self.pairings.remove_if(b, |_, back| &back.peer == a);
        true
    }
}

/// Invalidates the pairing of a terminated session and hangs up on its peer.
#[async_trait]
impl EventHandler for CallRegistry {
    async fn handle(&self, event: &DomainEvent) {
        let DomainEvent::SessionTerminated {
            session_id, reason, ..
        } = event
        else {
            return;
        };

        let session_id = SessionId::from(session_id.clone());
        if let Some(pairing) = self.unpair(&session_id) {
            debug!(
                "Call between {session_id} and {} ended by termination",
                pairing.peer
            );
            let hangup = ServerEvent::Signal {
                from: session_id,
                kind: SignalKind::Hangup,
                payload: json!({ "reason": reason }),
            };
            if pairing.peer_outbox.send(hangup).is_err() {
                trace!("Peer {} already gone", pairing.peer);
            }
        }
    }
}

pub struct SignalingRelay {
    registry: Arc<SessionRegistry>,
    calls: Arc<CallRegistry>,
    reaper: Reaper,
}

impl SignalingRelay {
    pub fn new(registry: Arc<SessionRegistry>, calls: Arc<CallRegistry>, reaper: Reaper) -> Self {
        Self {
            registry,
            calls,
            reaper,
        }
    }

    /// Delivers the envelope to its target at most once.
    pub fn send_signal(&self, envelope: SignalEnvelope) -> Result<()> {
        if envelope.from == envelope.to {
            return Err(Error::InvalidTarget);
        }

        let sender = self.registry.lookup(&envelope.from)?;
        let target = self
            .registry
            .lookup(&envelope.to)
            .map_err(|_| Error::TargetNotFound(envelope.to.to_string()))?;

        let event = ServerEvent::Signal {
            from: envelope.from.clone(),
            kind: envelope.kind,
            payload: envelope.payload,
        };
        if target.outbox().send(event).is_err() {
            warn!("Signal target {} is unreachable", envelope.to);
            self.reaper.reap(envelope.to.clone());
            return Err(Error::TargetUnreachable(envelope.to.to_string()));
        }

        match envelope.kind {
            SignalKind::Offer => self.record_offer(&sender, &target),
            SignalKind::Hangup => {
                if self.calls.unpair_peers(&sender.id, &target.id) {
                    debug!("Call between {} and {} hung up", sender.id, target.id);
                }
            }
            SignalKind::Answer | SignalKind::Candidate => {}
        }

        Ok(())
    }

    /// Pairs the two parties of an offer. A party terminated since it was looked
    /// up has already had its pairing cleared, so the fresh pairing is dropped.
    fn record_offer(&self, sender: &Session, target: &Session) {
        self.calls
            .pair((&sender.id, sender.outbox()), (&target.id, target.outbox()));

        let gone = [&sender.id, &target.id]
            .into_iter()
            .find(|id| self.registry.lookup(id).is_err());
        match gone {
            Some(id) => {
                debug!("Dropping call pairing with terminated session {id}");
                self.calls.unpair_peers(&sender.id, &target.id);
            }
            None => debug!("Call offered from {} to {}", sender.id, target.id),
        }
    }

    pub fn calls(&self) -> &CallRegistry {
        &self.calls
    }
}
