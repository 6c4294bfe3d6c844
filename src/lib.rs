//! # Event Router
//!
//! An in-process, typed publish/subscribe router with a bounded replay cache.
//!
//! ## Core Concepts
//!
//! - **Router**: Broadcasts every item sent to all current subscribers
//! - **Cache**: Keeps the most recent items (or all of them) for late readers
//! - **Tail**: Subscription that replays the cache before going live
//! - **Scope**: Cancellation handle bounding the life of routers and subscriptions
//!
//! ## Example
//!
//! ```
//! use event_router::{Router, Scope};
//! use std::sync::mpsc;
//!
//! let app = Scope::new();
//! let router = Router::new(&app, 100)?;
//!
//! let consumer = app.child();
//! let (tx, rx) = mpsc::channel();
//! router.subscribe(&consumer, move |event: String| {
//!     let _ = tx.send(event);
//! })?;
//!
//! router.send("started".to_string())?;
//! assert_eq!(rx.recv().unwrap(), "started");
//! assert_eq!(router.count()?, 1);
//!
//! // Ends the subscription; the router keeps running.
//! consumer.cancel();
//!
//! app.cancel();
//! # Ok::<(), event_router::RouterError>(())
//! ```

pub mod cache;
pub mod codec;
pub mod error;
pub mod router;
pub mod scope;
pub mod types;

// Re-exports
pub use cache::ReplayCache;
pub use codec::{Bytes, Codec, EncodedRouter, JsonCodec, MsgPackCodec};
pub use error::{Result, RouterError};
pub use router::{Router, RouterConfig, SubscriptionHandle};
pub use scope::Scope;
pub use types::*;
