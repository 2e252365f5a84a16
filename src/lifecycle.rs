//! Lifecycle / disconnect events (component H).
//!
//! Grounded on `AppFlowy-IO-AppFlowy-LAI`'s `RunningState`/
//! `RunningStateSender` peer-state pattern: a small state machine plus a
//! fan-out list of handlers, generalized here to also replay the
//! disconnect event synchronously to handlers that subscribe *after* it
//! already fired.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Monotone peer state. `Disconnected` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Active,
    Disconnecting,
    Disconnected,
}

/// The payload carried by the `Disconnected` event.
#[derive(Debug, Clone)]
pub struct DisconnectEvent {
    pub description: String,
}

type Handler = Box<dyn Fn(&DisconnectEvent) + Send + Sync>;

/// Peer state plus idempotent disconnect-event fan-out.
pub struct Lifecycle {
    state: Mutex<PeerState>,
    fired: AtomicBool,
    event: Mutex<Option<DisconnectEvent>>,
    handlers: Mutex<Vec<Handler>>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Lifecycle {
            state: Mutex::new(PeerState::Active),
            fired: AtomicBool::new(false),
            event: Mutex::new(None),
            handlers: Mutex::new(Vec::new()),
        }
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Lifecycle::default()
    }

    pub fn state(&self) -> PeerState {
        *self.state.lock().expect("lifecycle state poisoned")
    }

    /// Transition into `Disconnecting` if not already past it. Monotone:
    /// does nothing once `Disconnecting`/`Disconnected`.
    pub fn begin_disconnecting(&self) {
        let mut state = self.state.lock().expect("lifecycle state poisoned");
        if *state == PeerState::Active {
            *state = PeerState::Disconnecting;
        }
    }

    /// Fire the `Disconnected` event exactly once. Subsequent calls are
    /// no-ops.
    pub fn fire_disconnected(&self, description: impl Into<String>) {
        if self.fired.swap(true, Ordering::AcqRel) {
            return;
        }
        *self.state.lock().expect("lifecycle state poisoned") = PeerState::Disconnected;
        let event = DisconnectEvent {
            description: description.into(),
        };
        *self.event.lock().expect("lifecycle event poisoned") = Some(event.clone());

        let handlers = self.handlers.lock().expect("lifecycle handlers poisoned");
        for handler in handlers.iter() {
            handler(&event);
        }
    }

    /// Subscribe to the disconnect event. If it already fired, the
    /// handler is invoked synchronously, inline, with the stored event —
    /// a handler attached after the event has already occurred still
    /// observes it, at subscription time.
    pub fn on_disconnect<F>(&self, handler: F)
    where
        F: Fn(&DisconnectEvent) + Send + Sync + 'static,
    {
        if let Some(event) = self.event.lock().expect("lifecycle event poisoned").clone() {
            handler(&event);
            return;
        }
        self.handlers
            .lock()
            .expect("lifecycle handlers poisoned")
            .push(Box::new(handler));
    }

    pub fn is_disconnected(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// The description carried by the disconnect event, if it has fired.
    pub fn description(&self) -> Option<String> {
        self.event
            .lock()
            .expect("lifecycle event poisoned")
            .as_ref()
            .map(|event| event.description.clone())
    }
}
