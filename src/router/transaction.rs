//! Request/response transactions exchanged with the actor.
//!
//! Every request carries a single-use reply channel. The caller creates the
//! transaction, the actor consumes it exactly once and answers on `reply`.

use crate::scope::Scope;
use crate::types::{SubscribeMode, SubscriptionId};
use crossbeam_channel::{bounded, Receiver, Sender};

/// One-shot reply channel.
pub(crate) type Reply<R> = Sender<R>;

/// Create a reply channel pair.
///
/// Capacity is one so the actor never waits for a caller that gave up.
pub(crate) fn reply_channel<R>() -> (Reply<R>, Receiver<R>) {
    bounded(1)
}

/// Result of registering a subscription.
pub(crate) struct Registration<T> {
    pub id: SubscriptionId,
    /// Cache contents at registration time. Empty unless tailing.
    pub backlog: Vec<T>,
    /// Live items, in broadcast order.
    pub queue: Receiver<T>,
    /// Cancelled by the actor once the subscription leaves its table.
    pub removed: Scope,
    /// Cancel path for the delivery thread. Does not keep the actor alive.
    pub cancel: Sender<CancelRequest>,
}

/// Removal requested by a delivery thread.
///
/// Travels on its own channel so delivery threads never hold the inbox open.
pub(crate) struct CancelRequest {
    pub id: SubscriptionId,
    pub reply: Reply<bool>,
}

/// Requests understood by the actor loop.
pub(crate) enum Transaction<T> {
    Register {
        mode: SubscribeMode,
        reply: Reply<Registration<T>>,
    },
    Cancel {
        id: SubscriptionId,
        /// `true` if a subscription was actually removed.
        reply: Reply<bool>,
    },
    Send {
        item: T,
        /// Number of subscribers that accepted the item.
        reply: Reply<usize>,
    },
    Count {
        reply: Reply<usize>,
    },
    Items {
        reply: Reply<Vec<T>>,
    },
    Clear {
        reply: Reply<()>,
    },
    SubscriptionCount {
        reply: Reply<usize>,
    },
}

impl<T> Transaction<T> {
    /// Short name used in logs.
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Transaction::Register { .. } => "register",
            Transaction::Cancel { .. } => "cancel",
            Transaction::Send { .. } => "send",
            Transaction::Count { .. } => "count",
            Transaction::Items { .. } => "items",
            Transaction::Clear { .. } => "clear",
            Transaction::SubscriptionCount { .. } => "subscription_count",
        }
    }
}
