//! Single-subscriber bindings between a bridge and a pass session
//!
//! A bridge has one inbound slot (who receives frames read from ground
//! equipment) and one outbound slot (who may queue frames for ground
//! equipment). Binding a slot displaces its previous holder, so two sessions
//! never race for the same frames. Displaced holders wait underneath the new
//! one and get the slot back, most recent first, once it is released.

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use crate::{GatewayError, Result};

/// Frames buffered between a connection's inbound loop and the bound session.
pub const INBOUND_QUEUE_DEPTH: usize = 64;

/// Frames buffered per connection on the outbound side.
pub const OUTBOUND_QUEUE_DEPTH: usize = 64;

pub(crate) type ConnectionId = u64;

struct InboundSlot {
    id: u64,
    owner: String,
    tx: mpsc::Sender<Bytes>,
}

#[derive(Default)]
struct OutboundSlots {
    holders: Vec<(u64, String)>,
    connections: HashMap<ConnectionId, mpsc::Sender<Bytes>>,
}

impl OutboundSlots {
    fn holder(&self) -> Option<&(u64, String)> {
        self.holders.last()
    }
}

/// Binding state shared by a bridge, its connections and its bound sessions.
pub(crate) struct Bindings {
    channel: Arc<str>,
    inbound: Mutex<Vec<InboundSlot>>,
    outbound: Mutex<OutboundSlots>,
    next_id: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Bindings {
    pub(crate) fn new(channel: Arc<str>) -> Self {
        Self {
            channel,
            inbound: Mutex::new(Vec::new()),
            outbound: Mutex::new(OutboundSlots::default()),
            next_id: AtomicU64::new(1),
        }
    }

    pub(crate) fn channel(&self) -> &Arc<str> {
        &self.channel
    }

    pub(crate) fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Sender of the current inbound subscriber, if any.
    pub(crate) fn inbound_sender(&self) -> Option<mpsc::Sender<Bytes>> {
        lock(&self.inbound).last().map(|slot| slot.tx.clone())
    }

    /// Register a new connection and return its outbound queue.
    pub(crate) fn register_connection(&self, id: ConnectionId) -> mpsc::Receiver<Bytes> {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
        lock(&self.outbound).connections.insert(id, tx);
        rx
    }

    pub(crate) fn unregister_connection(&self, id: ConnectionId) {
        lock(&self.outbound).connections.remove(&id);
    }

    pub(crate) fn connection_count(&self) -> usize {
        lock(&self.outbound).connections.len()
    }

    pub(crate) fn bind_inbound(self: &Arc<Self>, owner: &str) -> InboundBinding {
        let (tx, rx) = mpsc::channel(INBOUND_QUEUE_DEPTH);
        let id = self.next_id();
        let mut slots = lock(&self.inbound);
        if let Some(previous) = slots.last() {
            warn!(
                channel = %self.channel,
                displaced = %previous.owner,
                owner,
                "Inbound binding displaced"
            );
        } else {
            debug!(channel = %self.channel, owner, "Inbound bound");
        }
        slots.push(InboundSlot {
            id,
            owner: owner.to_string(),
            tx,
        });
        drop(slots);

        InboundBinding {
            id,
            bindings: Arc::clone(self),
            rx,
        }
    }

    pub(crate) fn bind_outbound(self: &Arc<Self>, owner: &str) -> OutboundBinding {
        let id = self.next_id();
        let mut slots = lock(&self.outbound);
        if let Some((_, displaced)) = slots.holder() {
            warn!(channel = %self.channel, %displaced, owner, "Outbound binding displaced");
        } else {
            debug!(channel = %self.channel, owner, "Outbound bound");
        }
        slots.holders.push((id, owner.to_string()));
        drop(slots);

        OutboundBinding {
            id,
            bindings: Arc::clone(self),
        }
    }

    fn release_inbound(&self, id: u64) {
        let mut slots = lock(&self.inbound);
        let Some(index) = slots.iter().position(|slot| slot.id == id) else {
            return;
        };
        slots.remove(index);
        if index < slots.len() {
            return;
        }
        match slots.last() {
            Some(slot) => {
                info!(channel = %self.channel, owner = %slot.owner, "Inbound handed back");
            }
            None => debug!(channel = %self.channel, "Inbound released"),
        }
    }

    fn release_outbound(&self, id: u64) {
        let mut slots = lock(&self.outbound);
        let Some(index) = slots.holders.iter().position(|(holder, _)| *holder == id) else {
            return;
        };
        slots.holders.remove(index);
        if index < slots.holders.len() {
            return;
        }
        match slots.holder() {
            Some((_, owner)) => {
                info!(channel = %self.channel, %owner, "Outbound handed back");
            }
            None => debug!(channel = %self.channel, "Outbound released"),
        }
    }
}

/// Receiving end of a bridge's inbound slot.
///
/// Yields frames from every connection of the bridge, in the order each
/// connection delivered them, while this binding holds the slot. A displaced
/// binding receives nothing until the bindings above it are dropped.
pub struct InboundBinding {
    id: u64,
    bindings: Arc<Bindings>,
    rx: mpsc::Receiver<Bytes>,
}

impl InboundBinding {
    /// Next frame. Waits while another binding holds the slot.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    /// Whether this binding still holds the inbound slot.
    pub fn is_current(&self) -> bool {
        lock(&self.bindings.inbound)
            .last()
            .is_some_and(|slot| slot.id == self.id)
    }
}

impl Drop for InboundBinding {
    fn drop(&mut self) {
        self.bindings.release_inbound(self.id);
    }
}

/// Sending side of a bridge's outbound slot.
pub struct OutboundBinding {
    id: u64,
    bindings: Arc<Bindings>,
}

impl OutboundBinding {
    /// Queue `payload` for every open connection of the bridge.
    ///
    /// Never waits: a connection whose queue is full misses the payload and
    /// a warning is logged. Returns the number of connections that accepted
    /// it, or [`GatewayError::NotBound`] while another binding holds the slot.
    pub fn send(&self, payload: Bytes) -> Result<usize> {
        let slots = lock(&self.bindings.outbound);
        match slots.holder() {
            Some((holder, _)) if *holder == self.id => {}
            other => {
                return Err(GatewayError::NotBound {
                    channel: self.bindings.channel.to_string(),
                    direction: "outbound",
                    holder: other.map_or_else(|| "nobody".to_string(), |(_, o)| o.clone()),
                });
            }
        }

        let mut queued = 0;
        for (connection, tx) in &slots.connections {
            match tx.try_send(payload.clone()) {
                Ok(()) => queued += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(
                        channel = %self.bindings.channel,
                        connection,
                        bytes = payload.len(),
                        "Outbound queue full, frame dropped"
                    );
                }
                Err(TrySendError::Closed(_)) => {}
            }
        }
        Ok(queued)
    }

    /// Whether this binding still holds the outbound slot.
    pub fn is_current(&self) -> bool {
        lock(&self.bindings.outbound)
            .holder()
            .is_some_and(|(holder, _)| *holder == self.id)
    }
}

impl Drop for OutboundBinding {
    fn drop(&mut self) {
        self.bindings.release_outbound(self.id);
    }
}
