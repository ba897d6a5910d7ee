//! Live subscriptions over store collections.
//!
//! # Responsibility
//! - Track subscribers per collection/filter.
//! - Push fresh matching sets after mutations.
//!
//! # Invariants
//! - Consumers only ever need the newest pushed value; older ones are stale.
//! - Subscribers whose receiver is gone are dropped on the next push.

use super::{Collection, Document, DocumentSet, Filter, StoreResult};
use log::warn;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Mutex, PoisonError};

/// Value pushed through a subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionEvent {
    Snapshot(DocumentSet),
    /// The store could not evaluate the subscription this time.
    Failed(String),
}

/// Receiving side of one live subscription.
pub struct Subscription {
    receiver: Receiver<SubscriptionEvent>,
    closed: bool,
}

impl Subscription {
    pub fn new(receiver: Receiver<SubscriptionEvent>) -> Self {
        Self {
            receiver,
            closed: false,
        }
    }

    /// Drains pending pushes and returns the newest one, if any.
    pub fn latest(&mut self) -> Option<SubscriptionEvent> {
        let mut newest = None;
        loop {
            match self.receiver.try_recv() {
                Ok(event) => newest = Some(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.closed = true;
                    break;
                }
            }
        }
        newest
    }

    /// Returns whether the store side has gone away.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

struct Subscriber {
    collection: Collection,
    filter: Filter,
    sender: Sender<SubscriptionEvent>,
}

/// Subscriber bookkeeping shared by the store adapters.
#[derive(Default)]
pub(crate) struct SubscriberRegistry {
    subscribers: Mutex<Vec<Subscriber>>,
}

impl SubscriberRegistry {
    /// Registers a subscriber and pushes `initial` to it.
    pub fn register(
        &self,
        collection: Collection,
        filter: Filter,
        initial: Vec<Document>,
    ) -> Subscription {
        let (sender, receiver) = mpsc::channel();
        let _ = sender.send(SubscriptionEvent::Snapshot(DocumentSet {
            collection,
            documents: initial,
        }));
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscriber {
                collection,
                filter,
                sender,
            });
        Subscription::new(receiver)
    }

    /// Pushes fresh sets to every subscriber whose filter matches the
    /// document before or after the change.
    ///
    /// Must be called without holding the adapter's data lock; `load` reads
    /// the current matching set.
    pub fn notify<F>(
        &self,
        collection: Collection,
        before: Option<&Document>,
        after: Option<&Document>,
        load: F,
    ) where
        F: Fn(&Filter) -> StoreResult<Vec<Document>>,
    {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|subscriber| {
            if subscriber.collection != collection {
                return true;
            }
            let affected = before.is_some_and(|doc| subscriber.filter.matches(doc))
                || after.is_some_and(|doc| subscriber.filter.matches(doc));
            if !affected {
                return true;
            }
            let event = match load(&subscriber.filter) {
                Ok(documents) => SubscriptionEvent::Snapshot(DocumentSet {
                    collection,
                    documents,
                }),
                Err(err) => {
                    warn!(
                        "event=subscription_push module=store status=error collection={} error={}",
                        collection, err
                    );
                    SubscriptionEvent::Failed(err.to_string())
                }
            };
            subscriber.sender.send(event).is_ok()
        });
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
