//! # Bridge core: consumer set, session lifecycle, fan-out.
//!
//! The only public entry point is [`BridgeManager`], the single authoritative
//! owner of "is there an active upstream session, and who is subscribed".
//!
//! Internal modules:
//! - [`consumer`]: opaque consumer identity;
//! - [`sink`]: outbound delivery capability consumed from the host broker;
//! - [`manager`]: subscribe/unsubscribe state machine and the fan-out loop.

mod consumer;
mod manager;
mod sink;

pub use consumer::ConsumerRef;
pub use manager::BridgeManager;
pub use sink::PublishSink;
