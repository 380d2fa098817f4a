use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;

/// Ordered list of notification callbacks for one event kind.
///
/// Registration may happen at any time, including from inside a callback
/// that is currently being dispatched. Callbacks run in registration order.
pub struct CallbackList<F: ?Sized> {
    entries: RwLock<Vec<Arc<F>>>,
}

impl<F: ?Sized> CallbackList<F> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Append a callback.
    pub fn register(&self, callback: Arc<F>) {
        self.entries.write().push(callback);
    }

    /// Clone of the current callbacks, taken under the lock.
    pub fn snapshot(&self) -> Vec<Arc<F>> {
        self.entries.read().clone()
    }

    /// Invoke `call` once per registered callback.
    ///
    /// Iterates a snapshot so no lock is held while callbacks run. A panic in
    /// one callback is logged and the remaining callbacks still run. Returns
    /// the number of callbacks that completed normally.
    pub fn dispatch(&self, event: &'static str, mut call: impl FnMut(&F)) -> usize {
        let mut completed = 0;
        for callback in self.snapshot() {
            match catch_unwind(AssertUnwindSafe(|| call(&*callback))) {
                Ok(()) => completed += 1,
                Err(panic) => {
                    tracing::error!(
                        event,
                        panic = panic_message(panic.as_ref()),
                        "callback panicked"
                    );
                }
            }
        }
        completed
    }
}

impl<F: ?Sized> Default for CallbackList<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: ?Sized> std::fmt::Debug for CallbackList<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackList")
            .field("len", &self.entries.read().len())
            .finish()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "non-string panic payload"
    }
}
