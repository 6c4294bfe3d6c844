//! Core types for the event router.

use std::fmt;

/// First id handed out by a fresh router.
pub(crate) const FIRST_SUBSCRIPTION_ID: u64 = 1000;

/// Unique identifier for a subscription.
///
/// Ids increase monotonically per router and are never reused.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(pub u64);

impl SubscriptionId {
    pub fn next(self) -> Self {
        SubscriptionId(self.0 + 1)
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        SubscriptionId(FIRST_SUBSCRIPTION_ID)
    }
}

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionId({})", self.0)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a new subscription treats the items already in the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SubscribeMode {
    /// Only items sent after registration.
    Live,
    /// Every cached item first, then live items.
    Tail,
}

impl SubscribeMode {
    pub fn replays_cache(self) -> bool {
        matches!(self, SubscribeMode::Tail)
    }
}
