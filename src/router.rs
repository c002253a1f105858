//! Inbound message routing
//!
//! Every parsed frame is emitted under `"message"`, then under its own `type`
//! and `message_type` values when present.

use crate::events::{Event, EventDispatcher, MESSAGE};
use crate::messages::FeedMessage;

use std::sync::Arc;
use tracing::{debug, warn};

/// Fans inbound frames out through the dispatcher
#[derive(Clone)]
pub struct MessageRouter {
    dispatcher: Arc<EventDispatcher>,
}

impl MessageRouter {
    pub fn new(dispatcher: Arc<EventDispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Route a raw text frame
    ///
    /// Frames that do not parse are logged and dropped. Returns the number of
    /// listener invocations.
    pub fn route_text(&self, text: &str) -> usize {
        match FeedMessage::parse(text) {
            Ok(msg) => self.route(msg),
            Err(e) => {
                warn!(error = %e, len = text.len(), "Failed to parse message");
                0
            }
        }
    }

    /// Route a raw binary frame, which must hold UTF-8 JSON
    pub fn route_binary(&self, data: &[u8]) -> usize {
        match std::str::from_utf8(data) {
            Ok(text) => self.route_text(text),
            Err(e) => {
                warn!(error = %e, len = data.len(), "Dropping non-UTF-8 binary frame");
                0
            }
        }
    }

    /// Route an already-parsed message
    pub fn route(&self, msg: FeedMessage) -> usize {
        let keys = dispatch_keys(&msg);
        debug!(keys = ?keys, "Routing message");

        let event = Event::message(msg);
        self.dispatcher.emit(MESSAGE, &event)
            + keys
                .iter()
                .map(|key| self.dispatcher.emit(key, &event))
                .sum::<usize>()
    }
}

/// Per-type dispatch keys for a message, in emit order
fn dispatch_keys(msg: &FeedMessage) -> Vec<String> {
    msg.frame_type()
        .into_iter()
        .chain(msg.message_type())
        .map(str::to_string)
        .collect()
}
