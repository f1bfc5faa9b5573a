//! # Event and message types crossing the bridge.
//!
//! [`StreamEvent`] is what the upstream connection yields; [`PublishMessage`]
//! is what the fan-out loop hands to the broker sink. One `PublishMessage` is
//! built per received event and shared to all consumers behind an `Arc`.

use std::sync::Arc;

/// One message received from the upstream stream.
///
/// Immutable once received; fields are `Arc<str>` so clones are cheap when
/// the event crosses the hand-off queue.
#[derive(Clone, Debug)]
pub struct StreamEvent {
    /// Identity of the event's source (used to derive the topic name).
    pub source: Arc<str>,
    /// Event payload text.
    pub text: Arc<str>,
}

impl StreamEvent {
    /// Creates a new event.
    pub fn new(source: impl Into<Arc<str>>, text: impl Into<Arc<str>>) -> Self {
        Self {
            source: source.into(),
            text: text.into(),
        }
    }
}

/// Outbound broker message built from one [`StreamEvent`].
///
/// Built exactly once per event by the fan-out loop and delivered to every
/// subscribed consumer as `Arc<PublishMessage>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublishMessage {
    /// Full topic name, `"<namespace>/<source>"`.
    pub topic: String,
    /// Raw payload bytes (the event text).
    pub payload: Vec<u8>,
    /// Delivery quality of service. Bridged events are always published at 0.
    pub qos: u8,
}

impl PublishMessage {
    /// Builds the message for `event` under the given topic namespace.
    pub fn from_event(namespace: &str, event: &StreamEvent) -> Self {
        Self {
            topic: format!("{namespace}/{}", event.source),
            payload: event.text.as_bytes().to_vec(),
            qos: 0,
        }
    }
}
