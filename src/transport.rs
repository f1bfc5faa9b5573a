//! # Upstream transport capability.
//!
//! The bridge never speaks the upstream wire protocol itself; it consumes the
//! two traits below. A transport implementation owns authentication, framing,
//! and decoding, and surfaces typed [`StreamEvent`]s.
//!
//! ## Contract
//! - [`Connect::connect`] scopes the connection to a filter expression
//!   (e.g. a keyword/track term). A rejected filter or unreachable upstream
//!   is a [`TransportError::Connect`].
//! - [`StreamConnection::next`] pulls exactly one event, suspending until one
//!   arrives. Any error is terminal for the connection; callers must not call
//!   `next` again after an `Err`.
//! - [`StreamConnection::close`] releases the connection. Called exactly once
//!   by the session's receive loop on exit.

use async_trait::async_trait;

use crate::error::TransportError;
use crate::events::StreamEvent;

/// Factory capability for opening filtered upstream connections.
#[async_trait]
pub trait Connect: Send + Sync + 'static {
    /// Establishes a connection scoped to `filter`.
    async fn connect(&self, filter: &str) -> Result<Box<dyn StreamConnection>, TransportError>;
}

/// One established upstream connection.
///
/// Exclusively owned by a session's receive loop; `&mut self` receivers make
/// that ownership explicit.
#[async_trait]
pub trait StreamConnection: Send + 'static {
    /// Pulls the next event, suspending until one is available.
    ///
    /// An `Err` is terminal for this connection.
    async fn next(&mut self) -> Result<StreamEvent, TransportError>;

    /// Releases the connection.
    async fn close(&mut self);
}
