//! Session message delivery
//!
//! **Effect Classification**: Infrastructure. The runtime only needs
//! point-to-point, per-sender FIFO delivery of [`SessionEnvelope`]s between
//! named parties; framing and persistence of the transport are out of scope.
//! [`InMemoryNetwork`] provides that for tests and single-process setups.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tessera_core::PartyName;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::error::FlowError;
use crate::session::SessionEnvelope;

/// A message as received: sender plus envelope
pub type Inbound = (PartyName, SessionEnvelope);

/// Receiving half of a node's mailbox
pub type InboundReceiver = mpsc::UnboundedReceiver<Inbound>;

/// Outbound message delivery
#[async_trait]
pub trait MessagingService: Send + Sync {
    /// Deliver `envelope` to the node named `to`
    async fn send(&self, to: &PartyName, envelope: SessionEnvelope) -> Result<(), FlowError>;
}

#[async_trait]
impl<T: MessagingService + ?Sized> MessagingService for Arc<T> {
    async fn send(&self, to: &PartyName, envelope: SessionEnvelope) -> Result<(), FlowError> {
        (**self).send(to, envelope).await
    }
}

#[derive(Debug, Default)]
struct Mailbox {
    sender: Option<mpsc::UnboundedSender<Inbound>>,
    /// Held while the node is detached, delivered on re-registration
    pending: Vec<Inbound>,
}

/// In-process network connecting named nodes
///
/// Messages for a node that is detached (its receiver dropped, as after a
/// simulated crash) are held and delivered in order when it registers again.
#[derive(Debug, Default, Clone)]
pub struct InMemoryNetwork {
    mailboxes: Arc<Mutex<HashMap<PartyName, Mailbox>>>,
    accepted: Arc<AtomicU64>,
}

impl InMemoryNetwork {
    /// Create an empty network
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages accepted for delivery so far
    pub fn messages_sent(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    /// Attach `name` to the network, replacing any previous attachment
    pub fn register(&self, name: PartyName) -> (InMemoryEndpoint, InboundReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut mailboxes = self.mailboxes.lock();
        let mailbox = mailboxes.entry(name.clone()).or_default();
        let held = std::mem::take(&mut mailbox.pending);
        debug!(node = %name, held = held.len(), "Node attached to network");
        for message in held {
            // The receiver was created above and is still alive.
            let _ = tx.send(message);
        }
        mailbox.sender = Some(tx);
        drop(mailboxes);

        let endpoint = InMemoryEndpoint {
            local: name,
            network: self.clone(),
        };
        (endpoint, rx)
    }

    /// Detach `name`; later messages are held until it registers again
    pub fn detach(&self, name: &PartyName) {
        if let Some(mailbox) = self.mailboxes.lock().get_mut(name) {
            mailbox.sender = None;
        }
    }

    fn deliver(&self, from: &PartyName, to: &PartyName, envelope: SessionEnvelope) -> Result<(), FlowError> {
        let mut mailboxes = self.mailboxes.lock();
        let mailbox = mailboxes
            .get_mut(to)
            .ok_or_else(|| FlowError::transport(format!("unknown node {to}")))?;

        let message = (from.clone(), envelope);
        self.accepted.fetch_add(1, Ordering::Relaxed);
        match mailbox.sender.as_ref() {
            Some(sender) => {
                if let Err(mpsc::error::SendError(message)) = sender.send(message) {
                    mailbox.sender = None;
                    mailbox.pending.push(message);
                }
            }
            None => mailbox.pending.push(message),
        }
        Ok(())
    }
}

/// A node's sending handle on an [`InMemoryNetwork`]
#[derive(Debug, Clone)]
pub struct InMemoryEndpoint {
    local: PartyName,
    network: InMemoryNetwork,
}

impl InMemoryEndpoint {
    /// Name this endpoint sends as
    pub fn local_name(&self) -> &PartyName {
        &self.local
    }
}

#[async_trait]
impl MessagingService for InMemoryEndpoint {
    async fn send(&self, to: &PartyName, envelope: SessionEnvelope) -> Result<(), FlowError> {
        trace!(from = %self.local, to = %to, kind = envelope.kind(), session = %envelope.session_id, "Sending");
        self.network.deliver(&self.local, to, envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{SessionId, SessionMessage, SessionRole};

    fn name(s: &str) -> PartyName {
        PartyName::new(s).unwrap()
    }

    fn data(byte: u8) -> SessionEnvelope {
        SessionEnvelope {
            session_id: SessionId::new(),
            sender_role: SessionRole::Initiator,
            body: SessionMessage::Data(vec![byte]),
        }
    }

    #[tokio::test]
    async fn test_delivery_is_fifo() {
        let network = InMemoryNetwork::new();
        let (alice, _alice_rx) = network.register(name("Alice"));
        let (_bob, mut bob_rx) = network.register(name("Bob"));

        for i in 0..5 {
            alice.send(&name("Bob"), data(i)).await.unwrap();
        }
        for i in 0..5 {
            let (from, envelope) = bob_rx.recv().await.unwrap();
            assert_eq!(from, name("Alice"));
            assert_eq!(envelope.body, SessionMessage::Data(vec![i]));
        }
        assert_eq!(network.messages_sent(), 5);
    }

    #[tokio::test]
    async fn test_unknown_destination_fails() {
        let network = InMemoryNetwork::new();
        let (alice, _rx) = network.register(name("Alice"));
        assert!(alice.send(&name("Nobody"), data(0)).await.is_err());
        assert_eq!(network.messages_sent(), 0);
    }

    #[tokio::test]
    async fn test_messages_held_while_detached() {
        let network = InMemoryNetwork::new();
        let (alice, _alice_rx) = network.register(name("Alice"));
        let (_bob, bob_rx) = network.register(name("Bob"));
        drop(bob_rx);

        alice.send(&name("Bob"), data(1)).await.unwrap();
        alice.send(&name("Bob"), data(2)).await.unwrap();

        let (_bob, mut bob_rx) = network.register(name("Bob"));
        assert_eq!(bob_rx.recv().await.unwrap().1.body, SessionMessage::Data(vec![1]));
        assert_eq!(bob_rx.recv().await.unwrap().1.body, SessionMessage::Data(vec![2]));
    }
}
