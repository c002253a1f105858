//! Desired subscription filters
//!
//! Holds what should be sent to the backend if a connection opened right now.
//! The backend keeps no filters across connections, so this is replayed on
//! every open transition.

use crate::messages::ControlFrame;

/// Message-type and event-id filters requested by the application
///
/// Empty lists mean "no filter requested yet", not "subscribe to nothing".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionState {
    message_types: Vec<String>,
    event_ids: Vec<String>,
}

impl SubscriptionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace both filter lists and return the frame announcing them
    pub fn replace(&mut self, message_types: Vec<String>, event_ids: Vec<String>) -> ControlFrame {
        self.message_types = message_types;
        self.event_ids = event_ids;
        self.subscribe_frame()
    }

    /// Drop both filter lists and return the frame announcing it
    pub fn clear(&mut self) -> ControlFrame {
        self.message_types.clear();
        self.event_ids.clear();
        ControlFrame::Unsubscribe
    }

    /// Frame to replay after a (re)connect, if any filter is set
    pub fn resubscribe_frame(&self) -> Option<ControlFrame> {
        (!self.is_empty()).then(|| self.subscribe_frame())
    }

    /// True when neither list carries a filter
    pub fn is_empty(&self) -> bool {
        self.message_types.is_empty() && self.event_ids.is_empty()
    }

    pub fn message_types(&self) -> &[String] {
        &self.message_types
    }

    pub fn event_ids(&self) -> &[String] {
        &self.event_ids
    }

    fn subscribe_frame(&self) -> ControlFrame {
        ControlFrame::Subscribe {
            message_types: self.message_types.clone(),
            event_ids: self.event_ids.clone(),
        }
    }
}
