//! Public router handle and its configuration.

use super::actor;
use super::delivery;
use super::transaction::{reply_channel, Reply, Transaction};
use crate::error::{Result, RouterError};
use crate::scope::Scope;
use crate::types::{SubscribeMode, SubscriptionId};
use crossbeam_channel::{after, never, select, Receiver, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Router configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Maximum number of cached items. Zero keeps every item.
    pub max_cache_depth: usize,

    /// Per-subscription queue capacity.
    /// Default: 0, a direct hand-off where `send` waits for every subscriber.
    pub queue_capacity: usize,

    /// Upper bound on how long a call waits for the router.
    /// Default: none, calls wait until the router answers or closes.
    ///
    /// A call that times out may still take effect. A subscription registered
    /// after its caller gave up is removed again by the router.
    pub reply_timeout: Option<Duration>,

    /// Name of the actor thread. Delivery threads append `-sub-<id>`.
    pub thread_name: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_cache_depth: 0,
            queue_capacity: 0,
            reply_timeout: None,
            thread_name: "event-router".to_string(),
        }
    }
}

impl RouterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.thread_name.is_empty() {
            return Err(RouterError::InvalidConfig(
                "thread_name must not be empty".to_string(),
            ));
        }
        if self.thread_name.contains('\0') {
            return Err(RouterError::InvalidConfig(
                "thread_name must not contain NUL bytes".to_string(),
            ));
        }
        Ok(())
    }
}

/// Handle to a running router.
///
/// Cloning is cheap; all clones talk to the same actor. Every call blocks the
/// calling thread until the actor has processed it.
pub struct Router<T> {
    inbox: Sender<Transaction<T>>,
    scope: Scope,
    reply_timeout: Option<Duration>,
    thread_name: Arc<str>,
}

impl<T> Clone for Router<T> {
    fn clone(&self) -> Self {
        Self {
            inbox: self.inbox.clone(),
            scope: self.scope.clone(),
            reply_timeout: self.reply_timeout,
            thread_name: Arc::clone(&self.thread_name),
        }
    }
}

impl<T> fmt::Debug for Router<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("thread_name", &self.thread_name)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<T: Clone + Send + 'static> Router<T> {
    /// Start a router that lives until `scope` is cancelled.
    ///
    /// `max_cache_depth` of zero leaves the cache unbounded.
    pub fn new(scope: &Scope, max_cache_depth: usize) -> Result<Self> {
        Self::with_config(
            scope,
            RouterConfig {
                max_cache_depth,
                ..Default::default()
            },
        )
    }

    /// Start a router with custom configuration.
    pub fn with_config(scope: &Scope, config: RouterConfig) -> Result<Self> {
        config.validate()?;

        let scope = scope.child();
        let inbox = actor::spawn(&config, scope.clone())?;

        Ok(Self {
            inbox,
            scope,
            reply_timeout: config.reply_timeout,
            thread_name: Arc::from(config.thread_name),
        })
    }

    /// Broadcast `item` to every subscriber, then cache it.
    ///
    /// Blocks until every current subscriber has accepted the item, so a slow
    /// subscriber slows down all producers. Returns how many subscribers were
    /// reached.
    pub fn send(&self, item: T) -> Result<usize> {
        self.call(|reply| Transaction::Send { item, reply })
    }

    /// Deliver every item sent from now on to `on_item`.
    ///
    /// `on_item` runs on a dedicated thread until `scope` is cancelled, the
    /// subscription is removed, or the router closes. It must not call back into this router's `send` when
    /// the queue capacity is zero: the actor would wait on the very thread
    /// that waits on the actor.
    pub fn subscribe<F>(&self, scope: &Scope, on_item: F) -> Result<SubscriptionHandle>
    where
        F: FnMut(T) + Send + 'static,
    {
        self.register(scope, SubscribeMode::Live, on_item)
    }

    /// Deliver every cached item to `on_item`, then every item sent from now on.
    ///
    /// Each item reaches the callback exactly once, whether it was sent
    /// before or after registration.
    pub fn tail<F>(&self, scope: &Scope, on_item: F) -> Result<SubscriptionHandle>
    where
        F: FnMut(T) + Send + 'static,
    {
        self.register(scope, SubscribeMode::Tail, on_item)
    }

    /// Snapshot of the cache, oldest first.
    pub fn items(&self) -> Result<Vec<T>> {
        self.call(|reply| Transaction::Items { reply })
    }

    /// Empty the cache. Subscriptions are unaffected.
    pub fn clear(&self) -> Result<()> {
        self.call(|reply| Transaction::Clear { reply })
    }

    /// Number of cached items.
    pub fn count(&self) -> Result<usize> {
        self.call(|reply| Transaction::Count { reply })
    }

    /// Remove a subscription.
    ///
    /// Returns `false` if `id` was unknown or already removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<bool> {
        self.call(|reply| Transaction::Cancel { id, reply })
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> Result<usize> {
        self.call(|reply| Transaction::SubscriptionCount { reply })
    }

    fn register<F>(
        &self,
        scope: &Scope,
        mode: SubscribeMode,
        on_item: F,
    ) -> Result<SubscriptionHandle>
    where
        F: FnMut(T) + Send + 'static,
    {
        let registration = self.call(|reply| Transaction::Register { mode, reply })?;
        let id = registration.id;
        let scope = scope.child();

        let name = format!("{}-sub-{}", self.thread_name, id);
        match delivery::spawn(name, registration, scope.clone(), on_item) {
            Ok(finished) => Ok(SubscriptionHandle {
                id,
                scope,
                finished,
            }),
            Err(e) => {
                let _ = self.unsubscribe(id);
                Err(e)
            }
        }
    }

    /// Submit a transaction and wait for its reply.
    fn call<R>(&self, build: impl FnOnce(Reply<R>) -> Transaction<T>) -> Result<R> {
        if self.scope.is_cancelled() {
            return Err(RouterError::Closed);
        }

        let (reply, response) = reply_channel();
        let transaction = build(reply);

        let deadline = match self.reply_timeout {
            Some(timeout) => after(timeout),
            None => never::<Instant>(),
        };
        let timed_out = || RouterError::Timeout(self.reply_timeout.unwrap_or_default());

        select! {
            send(self.inbox, transaction) -> res => {
                res.map_err(|_| RouterError::Closed)?;
            },
            recv(self.scope.signal()) -> _ => return Err(RouterError::Closed),
            recv(deadline) -> _ => return Err(timed_out()),
        }

        select! {
            recv(response) -> msg => msg.map_err(|_| RouterError::Closed),
            // The actor may have answered as the deadline fired.
            recv(deadline) -> _ => response.try_recv().map_err(|_| timed_out()),
        }
    }
}

impl<T> Router<T> {
    /// Stop the router. Pending and later calls fail with [`RouterError::Closed`].
    ///
    /// Every subscription stops before its next item, including one still
    /// replaying the cache. The router also stops once every handle is dropped.
    pub fn close(&self) {
        self.scope.cancel();
    }

    /// `true` once [`close`](Self::close) was called or the router stopped.
    pub fn is_closed(&self) -> bool {
        self.scope.is_cancelled()
    }
}

/// Handle to a running subscription.
///
/// Dropping the handle does not end the subscription; its scope does.
#[derive(Debug)]
pub struct SubscriptionHandle {
    id: SubscriptionId,
    scope: Scope,
    /// Disconnects when the delivery thread exits.
    finished: Receiver<()>,
}

impl SubscriptionHandle {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Stop delivery. The callback is not interrupted if it is running.
    pub fn cancel(&self) {
        self.scope.cancel();
    }

    /// `false` once the subscription was cancelled or its delivery ended.
    pub fn is_active(&self) -> bool {
        !self.scope.is_cancelled()
    }

    /// Wait for the delivery thread to exit.
    ///
    /// Returns `true` if it exited within `timeout`.
    pub fn wait_finished(&self, timeout: Duration) -> bool {
        matches!(
            self.finished.recv_timeout(timeout),
            Err(RecvTimeoutError::Disconnected) | Ok(())
        )
    }
}
