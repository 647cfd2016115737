//! Change notification bus for affected-table sets.
//!
//! # Responsibility
//! - Broadcast the set of tables touched by each committed mutation.
//! - Deliver to each subscriber only the publications whose affected set
//!   intersects the subscriber's table set.
//!
//! # Invariants
//! - Each subscriber owns its own queue; unrelated subscribers never share
//!   one.
//! - Delivery order to a single subscriber matches publish order.
//! - A subscriber registered before `publish` returns sees that publication
//!   (or drops it by filter); there is no buffering beyond the queue.

use log::debug;
use std::collections::HashSet;
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Publish/subscribe channel for affected-table sets.
///
/// Safe for concurrent subscribe/publish; this is the only multi-consumer
/// structure in the crate.
#[derive(Default)]
pub struct ChangeBus {
    inner: Mutex<BusInner>,
}

#[derive(Default)]
struct BusInner {
    next_id: u64,
    subscribers: Vec<Subscriber>,
}

struct Subscriber {
    id: u64,
    tables: HashSet<String>,
    sender: Sender<HashSet<String>>,
}

impl ChangeBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Broadcasts an affected-table set to every matching subscriber.
    ///
    /// Synchronous: every subscriber registered before this call returns has
    /// the publication in its queue (or filtered it out). Subscribers whose
    /// receiving end is gone are pruned.
    pub fn publish(&self, affected_tables: &HashSet<String>) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        inner.subscribers.retain(|subscriber| {
            if !intersects(&subscriber.tables, affected_tables) {
                return true;
            }
            subscriber.sender.send(affected_tables.clone()).is_ok()
        });

        debug!(
            "event=bus_publish module=bus status=ok tables={} subscribers={}",
            affected_tables.len(),
            inner.subscribers.len()
        );
    }

    /// Registers a subscriber interested in the given tables.
    ///
    /// The returned watch yields every future publication whose affected set
    /// intersects `tables`, in publish order, until it is cancelled or
    /// dropped.
    pub fn subscribe(self: &Arc<Self>, tables: HashSet<String>) -> TableWatch {
        let (sender, receiver) = channel();

        let id = {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            let id = inner.next_id;
            inner.next_id += 1;
            inner.subscribers.push(Subscriber { id, tables, sender });
            id
        };

        debug!("event=bus_subscribe module=bus status=ok subscriber_id={id}");

        TableWatch {
            bus: Arc::clone(self),
            id,
            receiver,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .subscribers
            .len()
    }

    fn unsubscribe(&self, id: u64) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.subscribers.retain(|subscriber| subscriber.id != id);
        debug!("event=bus_unsubscribe module=bus status=ok subscriber_id={id}");
    }
}

fn intersects(subscribed: &HashSet<String>, affected: &HashSet<String>) -> bool {
    // Iterate the smaller set against the larger one.
    if subscribed.len() <= affected.len() {
        subscribed.iter().any(|table| affected.contains(table))
    } else {
        affected.iter().any(|table| subscribed.contains(table))
    }
}

/// One live subscription to the change bus.
///
/// A lazy, infinite sequence of affected-table sets. The subscription stays
/// registered until `cancel` is called or the watch is dropped.
pub struct TableWatch {
    bus: Arc<ChangeBus>,
    id: u64,
    receiver: Receiver<HashSet<String>>,
}

impl TableWatch {
    /// Blocks until the next matching publication arrives.
    ///
    /// The sending side lives in the bus for as long as this watch is
    /// registered, so `None` only occurs if the bus pruned this subscriber.
    pub fn recv(&self) -> Option<HashSet<String>> {
        self.receiver.recv().ok()
    }

    /// Returns the next matching publication if one is already queued.
    pub fn try_recv(&self) -> Option<HashSet<String>> {
        match self.receiver.try_recv() {
            Ok(tables) => Some(tables),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Blocks up to `timeout` for the next matching publication.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<HashSet<String>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(tables) => Some(tables),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Cancels the subscription explicitly.
    ///
    /// Publications already queued are discarded with the watch. Dropping the
    /// watch has the same effect.
    pub fn cancel(self) {}
}

impl Iterator for TableWatch {
    type Item = HashSet<String>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.receiver.recv() {
            Ok(tables) => Some(tables),
            Err(_) => None,
        }
    }
}

impl Drop for TableWatch {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.id);
    }
}
