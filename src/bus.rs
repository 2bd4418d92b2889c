//! In-process publish/subscribe for live message delivery.
//!
//! The bus owns a registry of subscribers, each with its own unbounded channel.
//! Publishing writes the message to the store first and fans it out only after
//! the write succeeded. The registry lock is held while enqueueing a message on
//! every matching channel, so:
//! - concurrent publish/subscribe/unsubscribe never see a half-updated registry,
//!   and a subscriber added mid-publish either gets that message or does not;
//! - messages published one after another reach each subscriber in that order.
//!
//! The lock is never held across an await. Dropping a [`Subscription`] removes
//! it from the registry; senders whose receiver is gone are pruned on publish.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use futures_util::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::storage::{Audience, Message, NewMessage, SharedStore};

/// What a subscriber listens to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topic {
    Broadcast,
    /// Unicast messages sent or received by `participant`, optionally only those
    /// exchanged with `peer`.
    Unicast { participant: String, peer: Option<String> },
}

impl Topic {
    pub fn matches(&self, m: &Message) -> bool {
        match (self, m.audience()) {
            (Topic::Broadcast, Audience::Broadcast) => true,
            (Topic::Unicast { participant, peer: None }, Audience::Unicast { .. }) => m.involves(participant),
            (Topic::Unicast { participant, peer: Some(peer) }, Audience::Unicast { .. }) => m.is_between(participant, peer),
            _ => false,
        }
    }
}

struct Subscriber {
    topic: Topic,
    tx: mpsc::UnboundedSender<Message>,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    subscribers: HashMap<u64, Subscriber>,
    closed: bool,
}

impl Registry {
    fn remove(&mut self, id: u64) -> bool {
        self.subscribers.remove(&id).is_some()
    }
}

/// Explicitly constructed pub/sub hub; create one at startup, share it through
/// `Arc`, call [`MessageBus::shutdown`] on exit.
pub struct MessageBus {
    store: SharedStore,
    registry: Arc<Mutex<Registry>>,
}

impl MessageBus {
    pub fn new(store: SharedStore) -> Self {
        Self { store, registry: Arc::new(Mutex::new(Registry::default())) }
    }

    pub async fn publish_broadcast(&self, message: NewMessage) -> AppResult<Message> {
        if message.receiver_id.is_some() {
            return Err(AppError::validation("unexpected_receiver", "broadcast messages have no receiver"));
        }
        self.publish(message).await
    }

    pub async fn publish_unicast(&self, message: NewMessage) -> AppResult<Message> {
        if message.receiver_id.as_deref().map(str::trim).unwrap_or("").is_empty() {
            return Err(AppError::validation("missing_receiver", "unicast messages need a receiver"));
        }
        self.publish(message).await
    }

    async fn publish(&self, message: NewMessage) -> AppResult<Message> {
        if self.registry.lock().closed {
            return Err(AppError::internal("bus_closed", "message bus is shut down"));
        }
        // Durable first; a failed write never reaches subscribers
        let stored = self.store.insert_message(message).await?;
        let delivered = self.fan_out(&stored);
        debug!(target: "bus", "bus.publish id={} audience={:?} delivered={}", stored.id, stored.audience(), delivered);
        Ok(stored)
    }

    fn fan_out(&self, message: &Message) -> usize {
        let mut reg = self.registry.lock();
        let mut dead: Vec<u64> = Vec::new();
        let mut delivered = 0usize;
        for (id, sub) in reg.subscribers.iter() {
            if !sub.topic.matches(message) { continue; }
            if sub.tx.send(message.clone()).is_ok() {
                delivered += 1;
            } else {
                dead.push(*id);
            }
        }
        for id in dead {
            reg.remove(id);
            debug!(target: "bus", "bus.prune subscriber={}", id);
        }
        delivered
    }

    pub fn subscribe_broadcast(&self) -> AppResult<Subscription> {
        self.subscribe(Topic::Broadcast)
    }

    pub fn subscribe_unicast(&self, participant: &str, peer: Option<&str>) -> AppResult<Subscription> {
        self.subscribe(Topic::Unicast { participant: participant.to_string(), peer: peer.map(str::to_string) })
    }

    pub fn subscribe(&self, topic: Topic) -> AppResult<Subscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut reg = self.registry.lock();
        if reg.closed {
            return Err(AppError::internal("bus_closed", "message bus is shut down"));
        }
        let id = reg.next_id;
        reg.next_id += 1;
        debug!(target: "bus", "bus.subscribe subscriber={} topic={:?}", id, topic);
        reg.subscribers.insert(id, Subscriber { topic, tx });
        Ok(Subscription { id, rx, registry: Arc::downgrade(&self.registry), active: true })
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.lock().subscribers.len()
    }

    /// Close the bus: every live stream ends and new subscriptions or publishes are
    /// refused. Idempotent.
    pub fn shutdown(&self) {
        let mut reg = self.registry.lock();
        if reg.closed { return; }
        reg.closed = true;
        let n = reg.subscribers.len();
        reg.subscribers.clear();
        info!(target: "bus", "message bus shut down, dropped {} subscriber(s)", n);
    }
}

/// Live stream of messages for one subscriber. Yields `None` once unsubscribed
/// or once the bus shuts down.
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<Message>,
    registry: Weak<Mutex<Registry>>,
    active: bool,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    /// Leave the registry. Calling it again is a no-op. Messages already queued
    /// are discarded.
    pub fn unsubscribe(&mut self) {
        if !self.active { return; }
        self.active = false;
        if let Some(reg) = self.registry.upgrade() {
            if reg.lock().remove(self.id) {
                debug!(target: "bus", "bus.unsubscribe subscriber={}", self.id);
            }
        }
        self.rx.close();
        while self.rx.try_recv().is_ok() {}
    }
}

impl Stream for Subscription {
    type Item = Message;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Message>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
