//! Per-subscription delivery threads.

use super::transaction::{reply_channel, CancelRequest, Registration};
use crate::error::Result;
use crate::scope::Scope;
use crate::types::SubscriptionId;
use crossbeam_channel::{bounded, select, Receiver};
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use tracing::{debug, debug_span, error};

/// Why a delivery loop ended.
#[derive(Debug, PartialEq, Eq)]
enum Exit {
    /// The consumer's scope was cancelled.
    Cancelled,
    /// The actor removed the subscription or stopped.
    Removed,
    /// The callback panicked.
    Panicked,
}

struct Delivery<T, F> {
    id: SubscriptionId,
    scope: Scope,
    removed: Scope,
    on_item: F,
    _item: std::marker::PhantomData<fn(T)>,
}

/// Start the delivery thread for a fresh registration.
///
/// The returned receiver disconnects when the thread exits.
pub(crate) fn spawn<T, F>(
    name: String,
    registration: Registration<T>,
    scope: Scope,
    on_item: F,
) -> Result<Receiver<()>>
where
    T: Send + 'static,
    F: FnMut(T) + Send + 'static,
{
    let (finished_tx, finished_rx) = bounded::<()>(0);
    let delivery = Delivery {
        id: registration.id,
        scope,
        removed: registration.removed.clone(),
        on_item,
        _item: std::marker::PhantomData,
    };

    thread::Builder::new().name(name).spawn(move || {
        let _finished = finished_tx;
        delivery.run(registration);
    })?;

    Ok(finished_rx)
}

impl<T, F> Delivery<T, F>
where
    T: Send + 'static,
    F: FnMut(T) + Send + 'static,
{
    fn run(mut self, registration: Registration<T>) {
        let _span = debug_span!("delivery", subscription = %self.id).entered();

        let Registration {
            backlog,
            queue,
            cancel,
            ..
        } = registration;
        let exit = self.deliver(backlog, &queue);

        // Release the queue before asking the actor to cancel, in case it is
        // blocked handing us an item.
        drop(queue);
        self.scope.cancel();

        if exit != Exit::Removed {
            let (reply, response) = reply_channel();
            let request = CancelRequest { id: self.id, reply };
            if cancel.send(request).is_err() {
                debug!("router stopped before cancel");
            } else {
                // A request queued as the actor stops is never answered, but
                // the removal scope still fires.
                select! {
                    recv(response) -> _ => {},
                    recv(self.removed.signal()) -> _ => {},
                }
            }
        }
        debug!(?exit, "delivery stopped");
    }

    /// Why delivery must stop before the next item, if it must.
    fn stop_reason(&self) -> Option<Exit> {
        if self.removed.is_cancelled() {
            Some(Exit::Removed)
        } else if self.scope.is_cancelled() {
            Some(Exit::Cancelled)
        } else {
            None
        }
    }

    fn deliver(&mut self, backlog: Vec<T>, queue: &Receiver<T>) -> Exit {
        for item in backlog {
            if let Some(exit) = self.stop_reason() {
                return exit;
            }
            if !self.invoke(item) {
                return Exit::Panicked;
            }
        }

        let cancelled = self.scope.signal().clone();
        let removed = self.removed.signal().clone();
        loop {
            select! {
                recv(queue) -> msg => match msg {
                    Ok(item) => {
                        // Several arms may be ready; stopping wins.
                        if let Some(exit) = self.stop_reason() {
                            return exit;
                        }
                        if !self.invoke(item) {
                            return Exit::Panicked;
                        }
                    }
                    Err(_) => return Exit::Removed,
                },
                recv(cancelled) -> _ => return Exit::Cancelled,
                recv(removed) -> _ => return Exit::Removed,
            }
        }
    }

    /// Run the callback, returning `false` if it panicked.
    fn invoke(&mut self, item: T) -> bool {
        let on_item = &mut self.on_item;
        match panic::catch_unwind(AssertUnwindSafe(|| on_item(item))) {
            Ok(()) => true,
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                error!(panic = %message, "subscriber callback panicked, dropping subscription");
                false
            }
        }
    }
}
