//! Cancellation scopes.
//!
//! A [`Scope`] bounds how long a router or a subscription stays active. Scopes
//! form a tree: cancelling a scope cancels every child created from it.
//!
//! Cancellation is observable from a blocking `crossbeam_channel::select!`
//! through [`Scope::signal`]. Nothing is ever sent on that channel; it becomes
//! ready (disconnected) once the scope is cancelled.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

struct Inner {
    /// Dropped on cancel so every clone of `signal` disconnects.
    trigger: Mutex<Option<Sender<()>>>,
    signal: Receiver<()>,
    children: Mutex<Vec<Weak<Inner>>>,
}

impl Inner {
    fn cancel(&self) {
        if self.trigger.lock().take().is_none() {
            return;
        }

        let children = std::mem::take(&mut *self.children.lock());
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel();
        }
    }

    fn is_cancelled(&self) -> bool {
        self.trigger.lock().is_none()
    }
}

/// Cloneable cancellation handle. Clones share the same cancellation state.
#[derive(Clone)]
pub struct Scope {
    inner: Arc<Inner>,
}

impl Scope {
    /// Create a new root scope.
    pub fn new() -> Self {
        let (trigger, signal) = bounded(0);
        Self {
            inner: Arc::new(Inner {
                trigger: Mutex::new(Some(trigger)),
                signal,
                children: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Create a scope that is cancelled together with `self`.
    ///
    /// Cancelling the child does not affect the parent. A child of an already
    /// cancelled scope starts out cancelled.
    pub fn child(&self) -> Scope {
        let child = Scope::new();

        let mut children = self.inner.children.lock();
        if self.inner.is_cancelled() {
            drop(children);
            child.cancel();
            return child;
        }
        children.retain(|weak| weak.strong_count() > 0);
        children.push(Arc::downgrade(&child.inner));

        child
    }

    /// Cancel this scope and all of its descendants. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Channel that becomes ready once the scope is cancelled.
    pub fn signal(&self) -> &Receiver<()> {
        &self.inner.signal
    }

    /// Block until the scope is cancelled.
    pub fn wait(&self) {
        let _ = self.inner.signal.recv();
    }

    /// Block until the scope is cancelled or `timeout` elapses.
    ///
    /// Returns `true` if the scope was cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        matches!(
            self.inner.signal.recv_timeout(timeout),
            Err(RecvTimeoutError::Disconnected) | Ok(())
        )
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::select;
    use std::thread;

    #[test]
    fn test_cancel_is_visible_to_clones() {
        let scope = Scope::new();
        let clone = scope.clone();
        assert!(!clone.is_cancelled());

        scope.cancel();
        assert!(clone.is_cancelled());

        // Idempotent
        scope.cancel();
        assert!(scope.is_cancelled());
    }

    #[test]
    fn test_parent_cancels_children() {
        let root = Scope::new();
        let child = root.child();
        let grandchild = child.child();

        root.cancel();

        assert!(child.is_cancelled());
        assert!(grandchild.is_cancelled());
    }

    #[test]
    fn test_child_cancel_leaves_parent() {
        let root = Scope::new();
        let child = root.child();

        child.cancel();

        assert!(child.is_cancelled());
        assert!(!root.is_cancelled());
    }

    #[test]
    fn test_child_of_cancelled_scope() {
        let root = Scope::new();
        root.cancel();
        assert!(root.child().is_cancelled());
    }

    #[test]
    fn test_signal_wakes_select() {
        let scope = Scope::new();
        let (_tx, never) = bounded::<u32>(0);

        let waiter = {
            let scope = scope.clone();
            thread::spawn(move || {
                select! {
                    recv(never) -> _ => false,
                    recv(scope.signal()) -> _ => true,
                }
            })
        };

        scope.cancel();
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_wait_timeout() {
        let scope = Scope::new();
        assert!(!scope.wait_timeout(Duration::from_millis(20)));

        scope.cancel();
        assert!(scope.wait_timeout(Duration::from_millis(20)));
        scope.wait();
    }
}
