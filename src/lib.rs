//! # streambridge
//!
//! **streambridge** bridges a single external push-based event stream into a
//! multi-subscriber publish/subscribe topic space. Each incoming event is
//! re-published to every currently interested consumer under a topic name
//! derived from event content.
//!
//! ## Architecture
//! ```text
//!                         subscribe / unsubscribe / shutdown
//!                                       │
//!                                       ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  BridgeManager                                                    │
//! │  - ConsumerSet (identity → interest level, under one RwLock)      │
//! │  - current StreamSession slot (at most one live session)          │
//! │  - fan-out loop (per session)                                     │
//! └───────┬───────────────────────────────────────────────────────────┘
//!         │ opens when consumers appear, closes when the last leaves
//!         ▼
//! ┌──────────────────┐   Connect::connect(filter)   ┌─────────────────┐
//! │  StreamSession   │ ───────────────────────────► │ upstream stream │
//! │  (receive loop)  │ ◄─── StreamConnection::next  └─────────────────┘
//! └───────┬──────────┘
//!         │ bounded hand-off queue (slow fan-out never stalls receive)
//!         ▼
//!    fan-out loop ──► PublishSink::enqueue(consumer, "<ns>/<source>" msg)
//!                       (every subscribed consumer, per event, in order)
//! ```
//!
//! ## Lifecycle
//! - The upstream connection exists only while at least one consumer is
//!   subscribed; the last unsubscribe tears it down immediately.
//! - A subscribe with a different filter replaces the session in place; the
//!   old connection is cancelled and closed before the new session's events
//!   reach anyone.
//! - Both the receive loop and the fan-out loop stop on a one-shot broadcast
//!   [`CancellationToken`](tokio_util::sync::CancellationToken); closing is
//!   idempotent.
//!
//! ## Features
//! | Area          | Description                                             | Key types / traits                  |
//! |---------------|---------------------------------------------------------|-------------------------------------|
//! | **Bridging**  | Subscription lifecycle and per-event fan-out.           | [`BridgeManager`], [`ConsumerRef`]  |
//! | **Sessions**  | One upstream connection's open/receive/close cycle.     | [`StreamSession`]                   |
//! | **Transport** | Capability consumed from the upstream client.           | [`Connect`], [`StreamConnection`]   |
//! | **Delivery**  | Capability consumed from the host broker.               | [`PublishSink`], [`PublishMessage`] |
//! | **Config**    | Runtime knobs and the upstream credential record.       | [`BridgeConfig`], [`Credentials`]   |
//! | **Errors**    | Typed errors for the bridge surface and the transport.  | [`BridgeError`], [`TransportError`] |
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use streambridge::{
//!     BridgeConfig, BridgeManager, Connect, ConsumerRef, PublishMessage, PublishSink,
//!     StreamConnection, StreamEvent, TransportError,
//! };
//!
//! struct Upstream;
//!
//! #[async_trait]
//! impl Connect for Upstream {
//!     async fn connect(&self, _filter: &str) -> Result<Box<dyn StreamConnection>, TransportError> {
//!         Ok(Box::new(Conn))
//!     }
//! }
//!
//! struct Conn;
//!
//! #[async_trait]
//! impl StreamConnection for Conn {
//!     async fn next(&mut self) -> Result<StreamEvent, TransportError> {
//!         Ok(StreamEvent::new("alice", "hi"))
//!     }
//!     async fn close(&mut self) {}
//! }
//!
//! struct Broker;
//!
//! impl PublishSink for Broker {
//!     fn enqueue(&self, consumer: &ConsumerRef, message: Arc<PublishMessage>) {
//!         println!("{consumer} <- {}", message.topic);
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bridge = BridgeManager::new(
//!         BridgeConfig::default(),
//!         Arc::new(Upstream),
//!         Arc::new(Broker),
//!     );
//!
//!     let consumer = ConsumerRef::new("client-1");
//!     bridge
//!         .subscribe(consumer.clone(), &["track".to_string(), "rust".to_string()], 0)
//!         .await?;
//!
//!     tokio::time::sleep(std::time::Duration::from_millis(50)).await;
//!
//!     bridge.unsubscribe(&consumer).await?;
//!     bridge.shutdown().await;
//!     Ok(())
//! }
//! ```

mod bridge;
mod config;
mod error;
mod events;
mod session;
mod transport;

// ---- Public re-exports ----

pub use bridge::{BridgeManager, ConsumerRef, PublishSink};
pub use config::{BridgeConfig, Credentials};
pub use error::{BridgeError, TransportError};
pub use events::{PublishMessage, StreamEvent};
pub use session::StreamSession;
pub use transport::{Connect, StreamConnection};
