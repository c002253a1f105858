//! Local event dispatch
//!
//! Each client owns an [`EventDispatcher`]: a map from event name to the
//! ordered list of listeners registered for it. Listeners are identified by
//! reference, so the same [`Listener`] value is needed to remove it again.

use crate::error::UofError;
use crate::messages::FeedMessage;

use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{error, trace};

/// Emitted once the transport is open
pub const CONNECTED: &str = "connected";
/// Emitted whenever a transport closes
pub const DISCONNECTED: &str = "disconnected";
/// Emitted on connection and transport failures
pub const ERROR: &str = "error";
/// Emitted for every inbound message
pub const MESSAGE: &str = "message";

/// Argument passed to listeners
#[derive(Debug, Clone)]
pub enum Event {
    Connected,
    Disconnected,
    Error(Arc<UofError>),
    Message(Arc<FeedMessage>),
}

impl Event {
    pub fn error(err: UofError) -> Self {
        Event::Error(Arc::new(err))
    }

    pub fn message(msg: FeedMessage) -> Self {
        Event::Message(Arc::new(msg))
    }

    /// The inbound message, for `message` and per-type events
    pub fn as_message(&self) -> Option<&FeedMessage> {
        match self {
            Event::Message(msg) => Some(msg),
            _ => None,
        }
    }

    /// The failure, for `error` events
    pub fn as_error(&self) -> Option<&UofError> {
        match self {
            Event::Error(err) => Some(err),
            _ => None,
        }
    }
}

/// Callback registered for an event name
pub type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

/// Wrap a closure as a [`Listener`]
///
/// Keep the returned value around to pass it to `off` later.
pub fn listener<F>(f: F) -> Listener
where
    F: Fn(&Event) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Event name -> ordered listeners
#[derive(Default)]
pub struct EventDispatcher {
    listeners: Mutex<HashMap<String, Vec<Listener>>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener for `name`
    ///
    /// Registering the same listener twice means it runs twice per emit.
    pub fn on(&self, name: impl Into<String>, listener: Listener) {
        self.listeners
            .lock()
            .entry(name.into())
            .or_default()
            .push(listener);
    }

    /// Remove `listener` from `name`, or every listener for `name` when `None`
    pub fn off(&self, name: &str, listener: Option<&Listener>) {
        let mut listeners = self.listeners.lock();

        match listener {
            Some(target) => {
                if let Some(registered) = listeners.get_mut(name) {
                    registered.retain(|l| !Arc::ptr_eq(l, target));
                    if registered.is_empty() {
                        listeners.remove(name);
                    }
                }
            }
            None => {
                listeners.remove(name);
            }
        }
    }

    /// Invoke every listener registered for `name`, in registration order
    ///
    /// Listeners run against a snapshot taken on entry, without the registry
    /// lock held. A panicking listener is logged and skipped. Returns the
    /// number of listeners invoked.
    pub fn emit(&self, name: &str, event: &Event) -> usize {
        let snapshot = match self.listeners.lock().get(name) {
            Some(registered) => registered.clone(),
            None => return 0,
        };

        trace!(event = name, listeners = snapshot.len(), "Emitting event");

        for listener in &snapshot {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| listener(event))) {
                error!(event = name, panic = %panic_message(&*panic), "Event listener panicked");
            }
        }

        snapshot.len()
    }

    /// Number of listeners currently registered for `name`
    pub fn listener_count(&self, name: &str) -> usize {
        self.listeners.lock().get(name).map_or(0, Vec::len)
    }

    /// Names that currently have at least one listener
    pub fn event_names(&self) -> Vec<String> {
        self.listeners.lock().keys().cloned().collect()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
