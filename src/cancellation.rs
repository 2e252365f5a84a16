//! Cancellation primitive shared by outbound and inbound cancellation.
//!
//! A `CancellationToken` can be linked to a remote request id (the
//! dispatcher's inbound-cancellation table), observed cheaply via
//! `is_cancelled`, and fires registered hooks exactly once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

struct Inner {
    triggered: AtomicBool,
    notify: Notify,
    hooks: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
}

/// The observing half: passed to target handlers that accept cancellation.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

/// The triggering half: held by whichever side can cancel (the correlator
/// for outbound calls, the dispatcher's inbound-cancellation table for
/// inbound ones).
#[derive(Clone)]
pub struct CancellationTrigger {
    inner: Arc<Inner>,
}

impl CancellationToken {
    /// Create a linked token/trigger pair.
    pub fn new() -> (CancellationToken, CancellationTrigger) {
        let inner = Arc::new(Inner {
            triggered: AtomicBool::new(false),
            notify: Notify::new(),
            hooks: Mutex::new(Vec::new()),
        });
        (
            CancellationToken {
                inner: inner.clone(),
            },
            CancellationTrigger { inner },
        )
    }

    /// A token that can never be canceled; used as the default when a
    /// caller does not supply one. Dropping the trigger immediately
    /// leaves `token` as the sole owner of the shared state, so it is
    /// freed like any other token once the caller is done with it.
    pub fn none() -> CancellationToken {
        let (token, _trigger) = CancellationToken::new();
        token
    }

    /// Cheap, non-blocking observation of whether cancellation already
    /// fired.
    pub fn is_cancelled(&self) -> bool {
        self.inner.triggered.load(Ordering::Acquire)
    }

    /// Register a hook to run on cancellation. Runs immediately, inline,
    /// if the token was already triggered.
    pub fn on_cancel(&self, hook: impl FnOnce() + Send + 'static) {
        if self.is_cancelled() {
            hook();
            return;
        }
        let mut hooks = self.inner.hooks.lock().expect("cancellation hooks poisoned");
        if self.is_cancelled() {
            drop(hooks);
            hook();
        } else {
            hooks.push(Box::new(hook));
        }
    }

    /// Suspend until canceled.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.inner.notify.notified().await;
    }
}

impl CancellationTrigger {
    /// Fire the linked token's hooks exactly once; idempotent.
    pub fn cancel(&self) {
        if self.inner.triggered.swap(true, Ordering::AcqRel) {
            return;
        }
        let hooks = std::mem::take(&mut *self.inner.hooks.lock().expect("cancellation hooks poisoned"));
        for hook in hooks {
            hook();
        }
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.triggered.load(Ordering::Acquire)
    }
}
