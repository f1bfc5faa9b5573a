//! Error types used by the bridge and by transport implementations.
//!
//! This module defines two main error enums:
//!
//! - [`BridgeError`] — errors raised by the bridge surface itself
//!   (initialization, subscribe/unsubscribe, shutdown).
//! - [`TransportError`] — errors raised by the upstream transport while
//!   connecting or receiving.
//!
//! Both types provide helper methods (`as_label`, `as_message`) for
//! logging/metrics.

use thiserror::Error;

/// # Errors produced by the upstream transport.
///
/// Both variants are terminal for the operation that produced them: a failed
/// connect yields no connection, and a failed receive ends the session's
/// receive loop. Reconnect policy, if any, belongs to the caller.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum TransportError {
    /// The upstream rejected the filter or the connection could not be
    /// established.
    #[error("upstream connect failed: {reason}")]
    Connect {
        /// The underlying failure message.
        reason: String,
    },

    /// The connection failed while an established session was receiving
    /// (dropped connection, malformed frame, revoked credentials).
    #[error("upstream receive failed: {reason}")]
    Receive {
        /// The underlying failure message.
        reason: String,
    },
}

impl TransportError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            TransportError::Connect { .. } => "transport_connect_failed",
            TransportError::Receive { .. } => "transport_receive_failed",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            TransportError::Connect { reason } => format!("connect: {reason}"),
            TransportError::Receive { reason } => format!("receive: {reason}"),
        }
    }
}

/// # Errors produced by the bridge surface.
///
/// Initialization errors (`Config`, `ConfigRead`) are fatal and abort
/// construction. Operation errors (`EmptyFilter`, `Connect`, `Stopped`) are
/// returned synchronously and leave the manager state unchanged.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum BridgeError {
    /// A required credential field is missing or empty.
    #[error("missing or empty credential field: {field}")]
    Config {
        /// Name of the offending field.
        field: &'static str,
    },

    /// The credentials file could not be read or parsed.
    #[error("failed to read credentials: {reason}")]
    ConfigRead {
        /// The underlying I/O or parse failure message.
        reason: String,
    },

    /// `subscribe` was called with no usable filter token.
    #[error("subscription filter is empty")]
    EmptyFilter,

    /// The upstream connect failed; no session was created and the manager
    /// kept its prior state.
    #[error("upstream connect failed")]
    Connect(#[source] TransportError),

    /// The manager was shut down; no further operations are accepted.
    #[error("bridge manager is stopped")]
    Stopped,
}

impl BridgeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use streambridge::BridgeError;
    ///
    /// assert_eq!(BridgeError::Stopped.as_label(), "manager_stopped");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            BridgeError::Config { .. } => "config_missing_field",
            BridgeError::ConfigRead { .. } => "config_read_failed",
            BridgeError::EmptyFilter => "empty_filter",
            BridgeError::Connect(_) => "connect_failed",
            BridgeError::Stopped => "manager_stopped",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            BridgeError::Config { field } => format!("missing credential: {field}"),
            BridgeError::ConfigRead { reason } => format!("credentials unreadable: {reason}"),
            BridgeError::EmptyFilter => "empty subscription filter".to_string(),
            BridgeError::Connect(source) => source.as_message(),
            BridgeError::Stopped => "manager stopped".to_string(),
        }
    }
}
