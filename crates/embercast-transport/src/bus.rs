//! Namespaced message bus.
//!
//! A bus is a virtual bidirectional text channel keyed by a namespace
//! string, multiplexed over the signaling connection. The receiver opens a
//! bus per namespace it cares about; inbound `message` frames are routed to
//! the matching bus, outbound sends are queued onto the target sender's
//! connection. Send failures are logged, never propagated.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use embercast_core::SenderId;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::server::SenderTable;
use crate::wire::CastFrame;

// MARK: - BusMessage

/// An inbound payload delivered on a message bus.
#[derive(Debug, Clone, PartialEq)]
pub struct BusMessage {
    pub sender_id: SenderId,
    pub payload: String,
}

// MARK: - BusRouter

/// Routes inbound `message` frames to whichever bus opened their namespace.
#[derive(Clone, Default)]
pub(crate) struct BusRouter {
    routes: Arc<Mutex<HashMap<String, mpsc::Sender<BusMessage>>>>,
}

impl BusRouter {
    pub(crate) fn open(&self, namespace: &str, senders: SenderTable) -> MessageBus {
        let (tx, rx) = mpsc::channel(64);
        let previous = self
            .routes
            .lock()
            .unwrap()
            .insert(namespace.to_owned(), tx);
        if previous.is_some() {
            warn!("Bus for namespace {namespace} reopened — previous handle goes silent");
        }
        MessageBus {
            namespace: namespace.to_owned(),
            inbound: rx,
            senders,
        }
    }

    pub(crate) async fn route(&self, namespace: &str, message: BusMessage) {
        let tx = self.routes.lock().unwrap().get(namespace).cloned();
        match tx {
            Some(tx) => {
                if tx.send(message).await.is_err() {
                    warn!("Bus for namespace {namespace} dropped — discarding message");
                }
            }
            None => debug!("No bus open for namespace {namespace} — discarding message"),
        }
    }
}

// MARK: - MessageBus

/// Application handle to one namespace.
///
/// Obtained from [`CastReceiver::message_bus`](crate::CastReceiver::message_bus).
/// `recv` yields inbound payloads; `send`/`broadcast` enqueue outbound text
/// toward one or all connected senders.
pub struct MessageBus {
    namespace: String,
    inbound: mpsc::Receiver<BusMessage>,
    senders: SenderTable,
}

impl MessageBus {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Next inbound message on this namespace. `None` once the transport
    /// has shut down.
    pub async fn recv(&mut self) -> Option<BusMessage> {
        self.inbound.recv().await
    }

    /// Unicast a text payload to one sender. Fire-and-forget.
    pub fn send(&self, sender_id: &SenderId, payload: impl Into<String>) {
        let frame = CastFrame::message(&self.namespace, payload);
        let target = self
            .senders
            .lock()
            .unwrap()
            .get(sender_id)
            .map(|entry| entry.outbound.clone());
        match target {
            Some(tx) => {
                if let Err(e) = tx.try_send(frame) {
                    warn!("Bus send to sender {sender_id} failed: {e}");
                }
            }
            None => warn!("Bus send to unknown sender {sender_id}"),
        }
    }

    /// Broadcast a text payload to every connected sender. Fire-and-forget.
    pub fn broadcast(&self, payload: &str) {
        let targets: Vec<_> = self
            .senders
            .lock()
            .unwrap()
            .iter()
            .map(|(id, entry)| (id.clone(), entry.outbound.clone()))
            .collect();
        for (id, tx) in targets {
            if let Err(e) = tx.try_send(CastFrame::message(&self.namespace, payload)) {
                warn!("Bus broadcast to sender {id} failed: {e}");
            }
        }
    }
}
