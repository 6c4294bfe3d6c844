//! The serializing worker that owns the cache and the subscription table.

use super::handle::RouterConfig;
use super::transaction::{CancelRequest, Registration, Transaction};
use crate::cache::ReplayCache;
use crate::error::Result;
use crate::scope::Scope;
use crate::types::{SubscribeMode, SubscriptionId};
use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::thread;
use tracing::{debug, trace};

/// Internal subscription state.
struct Subscription<T> {
    mode: SubscribeMode,
    queue: Sender<T>,
    /// Cancelled when the subscription leaves the table.
    removed: Scope,
}

/// Sole owner of the router's mutable state.
///
/// Transactions are handled one at a time in arrival order, which makes every
/// operation linearizable without locks.
pub(crate) struct Actor<T> {
    inbox: Receiver<Transaction<T>>,
    /// Cancel requests from delivery threads.
    cancels: Receiver<CancelRequest>,
    /// Cloned into every registration; keeps `cancels` connected.
    cancel_tx: Sender<CancelRequest>,
    scope: Scope,
    cache: ReplayCache<T>,
    /// Ordered by id so broadcasts visit subscribers in registration order.
    subscriptions: BTreeMap<SubscriptionId, Subscription<T>>,
    next_id: SubscriptionId,
    queue_capacity: usize,
}

/// Start the actor thread and return its inbox.
pub(crate) fn spawn<T>(config: &RouterConfig, scope: Scope) -> Result<Sender<Transaction<T>>>
where
    T: Clone + Send + 'static,
{
    let (inbox_tx, inbox_rx) = bounded(0);
    let (cancel_tx, cancels) = unbounded();
    let actor = Actor {
        inbox: inbox_rx,
        cancels,
        cancel_tx,
        scope,
        cache: ReplayCache::new(config.max_cache_depth),
        subscriptions: BTreeMap::new(),
        next_id: SubscriptionId::default(),
        queue_capacity: config.queue_capacity,
    };

    thread::Builder::new()
        .name(config.thread_name.clone())
        .spawn(move || actor.run())?;

    Ok(inbox_tx)
}

impl<T: Clone + Send + 'static> Actor<T> {
    fn run(mut self) {
        debug!(depth = ?self.cache.depth(), "router started");

        while !self.scope.is_cancelled() {
            let transaction = select! {
                recv(self.inbox) -> msg => match msg {
                    Ok(transaction) => transaction,
                    // Every router handle is gone.
                    Err(_) => break,
                },
                recv(self.cancels) -> msg => match msg {
                    Ok(CancelRequest { id, reply }) => Transaction::Cancel { id, reply },
                    // Unreachable while `cancel_tx` is held.
                    Err(_) => continue,
                },
                recv(self.scope.signal()) -> _ => break,
            };
            // Several arms may have been ready; never act after cancellation.
            if self.scope.is_cancelled() {
                break;
            }

            trace!(kind = transaction.kind(), "transaction");
            if self.handle(transaction).is_break() {
                break;
            }
        }

        debug!(
            subscriptions = self.subscriptions.len(),
            cached = self.cache.len(),
            "router stopped"
        );
        // Marks the router closed for every handle and ends every subscription's
        // removal scope. Dropping the table then disconnects every queue.
        self.scope.cancel();
    }

    fn handle(&mut self, transaction: Transaction<T>) -> ControlFlow<()> {
        // Reply errors mean the caller stopped waiting; the work is done either way.
        match transaction {
            Transaction::Register { mode, reply } => {
                let registration = self.register(mode);
                let id = registration.id;
                // Nobody will run a delivery thread for it.
                if reply.send(registration).is_err() {
                    self.cancel(id);
                }
            }
            Transaction::Cancel { id, reply } => {
                let removed = self.cancel(id);
                let _ = reply.send(removed);
            }
            Transaction::Send { item, reply } => {
                let Some(delivered) = self.broadcast(&item) else {
                    return ControlFlow::Break(());
                };
                let evicted = self.cache.push(item);
                trace!(delivered, evicted, cached = self.cache.len(), "item routed");
                let _ = reply.send(delivered);
            }
            Transaction::Count { reply } => {
                let _ = reply.send(self.cache.len());
            }
            Transaction::Items { reply } => {
                let _ = reply.send(self.cache.snapshot());
            }
            Transaction::Clear { reply } => {
                self.cache.clear();
                let _ = reply.send(());
            }
            Transaction::SubscriptionCount { reply } => {
                let _ = reply.send(self.subscriptions.len());
            }
        }
        ControlFlow::Continue(())
    }

    fn register(&mut self, mode: SubscribeMode) -> Registration<T> {
        let id = self.next_id;
        self.next_id = id.next();

        let (queue_tx, queue_rx) = bounded(self.queue_capacity);
        let backlog = if mode.replays_cache() {
            self.cache.snapshot()
        } else {
            Vec::new()
        };

        let removed = self.scope.child();

        debug!(subscription = %id, ?mode, backlog = backlog.len(), "subscription registered");
        self.subscriptions.insert(
            id,
            Subscription {
                mode,
                queue: queue_tx,
                removed: removed.clone(),
            },
        );

        Registration {
            id,
            backlog,
            queue: queue_rx,
            removed,
            cancel: self.cancel_tx.clone(),
        }
    }

    fn cancel(&mut self, id: SubscriptionId) -> bool {
        match self.subscriptions.remove(&id) {
            Some(sub) => {
                sub.removed.cancel();
                debug!(subscription = %id, mode = ?sub.mode, "subscription cancelled");
                true
            }
            None => false,
        }
    }

    /// Hand `item` to every subscriber, waiting for each to accept it.
    ///
    /// Returns the number of subscribers reached, or `None` if the router was
    /// cancelled mid-broadcast.
    fn broadcast(&mut self, item: &T) -> Option<usize> {
        let mut delivered = 0;
        let mut closed = Vec::new();

        for (id, sub) in &self.subscriptions {
            select! {
                send(sub.queue, item.clone()) -> res => match res {
                    Ok(()) => delivered += 1,
                    Err(_) => closed.push(*id),
                },
                recv(self.scope.signal()) -> _ => return None,
            }
        }

        for id in closed {
            if let Some(sub) = self.subscriptions.remove(&id) {
                sub.removed.cancel();
                debug!(subscription = %id, mode = ?sub.mode, "subscription queue closed, removed");
            }
        }

        Some(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::transaction::reply_channel;
    use std::time::Duration;

    fn start(depth: usize) -> (Sender<Transaction<u32>>, Scope) {
        let scope = Scope::new();
        let config = RouterConfig {
            max_cache_depth: depth,
            ..Default::default()
        };
        (spawn(&config, scope.clone()).unwrap(), scope)
    }

    fn send(inbox: &Sender<Transaction<u32>>, item: u32) -> usize {
        let (reply, rx) = reply_channel();
        inbox.send(Transaction::Send { item, reply }).unwrap();
        rx.recv().unwrap()
    }

    fn register(inbox: &Sender<Transaction<u32>>, mode: SubscribeMode) -> Registration<u32> {
        let (reply, rx) = reply_channel();
        inbox.send(Transaction::Register { mode, reply }).unwrap();
        rx.recv().unwrap()
    }

    #[test]
    fn test_register_assigns_increasing_ids() {
        let (inbox, scope) = start(0);

        let first = register(&inbox, SubscribeMode::Live);
        let second = register(&inbox, SubscribeMode::Live);

        assert_eq!(first.id, SubscriptionId(1000));
        assert_eq!(second.id, SubscriptionId(1001));
        scope.cancel();
    }

    #[test]
    fn test_tail_backlog_is_cache_snapshot() {
        let (inbox, scope) = start(2);

        send(&inbox, 1);
        send(&inbox, 2);
        send(&inbox, 3);

        let tail = register(&inbox, SubscribeMode::Tail);
        let live = register(&inbox, SubscribeMode::Live);

        assert_eq!(tail.backlog, vec![2, 3]);
        assert!(live.backlog.is_empty());
        scope.cancel();
    }

    #[test]
    fn test_dropped_queue_is_removed_on_broadcast() {
        let (inbox, scope) = start(0);

        let registration = register(&inbox, SubscribeMode::Live);
        drop(registration);

        // Nobody accepted the item, and the dead subscription is gone.
        assert_eq!(send(&inbox, 7), 0);

        let (reply, rx) = reply_channel();
        inbox.send(Transaction::SubscriptionCount { reply }).unwrap();
        assert_eq!(rx.recv().unwrap(), 0);
        scope.cancel();
    }

    #[test]
    fn test_cancel_unknown_id_is_noop() {
        let (inbox, scope) = start(0);

        let (reply, rx) = reply_channel();
        inbox
            .send(Transaction::Cancel {
                id: SubscriptionId(42),
                reply,
            })
            .unwrap();
        assert!(!rx.recv().unwrap());
        scope.cancel();
    }

    #[test]
    fn test_register_abandoned_by_caller_is_removed() {
        let (inbox, scope) = start(0);

        let (reply, rx) = reply_channel::<Registration<u32>>();
        drop(rx);
        inbox
            .send(Transaction::Register {
                mode: SubscribeMode::Live,
                reply,
            })
            .unwrap();

        let (reply, rx) = reply_channel();
        inbox.send(Transaction::SubscriptionCount { reply }).unwrap();
        assert_eq!(rx.recv().unwrap(), 0);
        scope.cancel();
    }

    #[test]
    fn test_removal_scope_follows_subscription() {
        let (inbox, scope) = start(0);

        let cancelled = register(&inbox, SubscribeMode::Live);
        let kept = register(&inbox, SubscribeMode::Tail);

        let (reply, rx) = reply_channel();
        cancelled
            .cancel
            .send(CancelRequest {
                id: cancelled.id,
                reply,
            })
            .unwrap();
        assert!(rx.recv().unwrap());
        assert!(cancelled.removed.is_cancelled());
        assert!(!kept.removed.is_cancelled());

        scope.cancel();
        assert!(kept.removed.wait_timeout(Duration::from_secs(2)));
    }

    #[test]
    fn test_actor_stops_when_inbox_dropped() {
        let (inbox, scope) = start(0);

        // Holds the cancel channel, which must not keep the actor alive.
        let registration = register(&inbox, SubscribeMode::Live);
        drop(inbox);

        assert!(scope.wait_timeout(Duration::from_secs(2)));
        assert!(registration.removed.is_cancelled());
        assert!(registration.queue.recv().is_err());
    }

    #[test]
    fn test_cancel_during_blocked_broadcast_stops_actor() {
        let (inbox, scope) = start(0);

        // Registered but never drained.
        let _stalled = register(&inbox, SubscribeMode::Live);

        let (reply, rx) = reply_channel();
        inbox.send(Transaction::Send { item: 1, reply }).unwrap();
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

        scope.cancel();

        // The pending reply is dropped with the actor.
        assert!(rx.recv_timeout(Duration::from_secs(2)).is_err());
        let (reply, _rx) = reply_channel();
        assert!(inbox
            .send_timeout(Transaction::Count { reply }, Duration::from_secs(2))
            .is_err());
    }
}
