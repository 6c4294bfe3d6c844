//! Actor-backed publish/subscribe router.
//!
//! A single actor thread owns the replay cache and the subscription table.
//! Every public call is a transaction sent to that thread, so all reads and
//! writes are totally ordered:
//! - `send` hands the item to every subscriber, then caches it
//! - `subscribe` registers for items sent afterwards
//! - `tail` registers and receives a snapshot of the cache in the same step,
//!   so no item is seen twice or missed
//!
//! Each subscription gets its own delivery thread that calls the consumer's
//! callback in order until the consumer's scope is cancelled.
//!
//! # Example
//!
//! ```
//! use event_router::{Router, Scope};
//! use std::sync::mpsc;
//!
//! let scope = Scope::new();
//! let router = Router::new(&scope, 2)?;
//!
//! router.send("a")?;
//! router.send("b")?;
//! router.send("c")?;
//! assert_eq!(router.items()?, vec!["b", "c"]);
//!
//! let (tx, rx) = mpsc::channel();
//! router.tail(&scope, move |item| {
//!     let _ = tx.send(item);
//! })?;
//! assert_eq!(rx.recv().unwrap(), "b");
//! assert_eq!(rx.recv().unwrap(), "c");
//!
//! scope.cancel();
//! # Ok::<(), event_router::RouterError>(())
//! ```

mod actor;
mod delivery;
mod handle;
mod transaction;

pub use handle::{Router, RouterConfig, SubscriptionHandle};
