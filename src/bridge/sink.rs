//! Outbound delivery capability consumed from the host broker.

use std::sync::Arc;

use crate::bridge::consumer::ConsumerRef;
use crate::events::PublishMessage;

/// Best-effort, non-blocking enqueue into a consumer's outbound channel.
///
/// ### Implementation requirements
/// - `enqueue` must not block and must not panic; it is called from the
///   fan-out loop for every subscribed consumer, and a slow or failing
///   consumer must not affect delivery to the others.
/// - The same `Arc<PublishMessage>` instance is handed to every consumer for
///   one event; implementations must not mutate it.
pub trait PublishSink: Send + Sync + 'static {
    /// Enqueues `message` for `consumer`.
    fn enqueue(&self, consumer: &ConsumerRef, message: Arc<PublishMessage>);
}
