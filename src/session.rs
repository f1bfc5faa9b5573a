//! # StreamSession: one upstream connection's open/receive/close cycle.
//!
//! A session owns exactly one [`StreamConnection`] and runs a background
//! receive loop that forwards events into a small bounded hand-off queue.
//! The session knows nothing about subscribers; fan-out is the manager's job.
//!
//! ## Architecture
//! ```text
//! Connect::connect(filter)
//!        │
//!        ▼
//! StreamSession::start ──► spawn receive loop
//!                              │
//!                              ├─ conn.next() ──► [hand-off queue, cap N] ──► take_events() consumer
//!                              │       │
//!                              │       └─ Err ──► error! + self-cancel + exit
//!                              │
//!                              └─ token.cancelled() ──► exit
//!                                        │
//!                                        └──► conn.close() (always, on loop exit)
//! ```
//!
//! ## Rules
//! - The receive loop suspends on `conn.next()` or the cancellation token,
//!   whichever fires first; cancellation wins when both are ready.
//! - Forwarding into the hand-off queue is itself cancellable, so a full
//!   queue never wedges `close()`.
//! - A receive error is terminal: reported once, then the loop cancels the
//!   session's own token and exits. No internal retry; reconnect policy
//!   belongs to the caller.
//! - The connection is closed by the loop itself on exit, so by the time
//!   `close()` returns the transport resources are released.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;
use crate::events::StreamEvent;
use crate::transport::{Connect, StreamConnection};

/// One live upstream connection plus its background receive loop.
pub struct StreamSession {
    filter: String,
    cancel: CancellationToken,
    events: Option<mpsc::Receiver<StreamEvent>>,
    receive_task: Option<JoinHandle<()>>,
}

impl StreamSession {
    /// Establishes a connection scoped to `filter` and starts the session.
    ///
    /// On error no session exists; callers must not retain anything.
    pub async fn open(
        connector: &dyn Connect,
        filter: impl Into<String>,
        queue_capacity: usize,
    ) -> Result<Self, TransportError> {
        let filter = filter.into();
        let conn = connector.connect(&filter).await?;
        Ok(Self::start(conn, filter, queue_capacity))
    }

    /// Wraps an already-established connection and spawns the receive loop.
    ///
    /// Split out from [`StreamSession::open`] so a caller replacing a session
    /// can connect first and only then tear the old session down, keeping its
    /// state intact when the connect fails.
    pub fn start(
        conn: Box<dyn StreamConnection>,
        filter: impl Into<String>,
        queue_capacity: usize,
    ) -> Self {
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel::<StreamEvent>(queue_capacity.max(1));
        let receive_task = tokio::spawn(receive_loop(conn, tx, cancel.clone()));

        Self {
            filter: filter.into(),
            cancel,
            events: Some(rx),
            receive_task: Some(receive_task),
        }
    }

    /// Filter expression this session's connection is scoped to.
    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Yields the receiving half of the hand-off queue, exactly once.
    ///
    /// The sequence is lazy and unbounded; it ends when the session is closed
    /// or its receive loop hits a terminal error. It is not restartable: a
    /// new session must be opened to receive again.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<StreamEvent>> {
        self.events.take()
    }

    /// A clone of the session's cancellation token.
    ///
    /// Fires when the session is closed or when the receive loop terminates
    /// itself on a transport error.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// True once the session is closed or has self-terminated.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Signals cancellation and waits for the receive loop to exit.
    ///
    /// Idempotent: safe to call when a close is already in progress or has
    /// completed. The loop observes cancellation and closes the connection
    /// before its task finishes, so no resource outlives this call.
    pub async fn close(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.receive_task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        // A dropped session must not leak its receive loop.
        self.cancel.cancel();
    }
}

/// Pulls events one at a time and forwards them into the hand-off queue.
async fn receive_loop(
    mut conn: Box<dyn StreamConnection>,
    tx: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            received = conn.next() => match received {
                Ok(event) => event,
                Err(e) => {
                    tracing::error!(error = %e, label = e.as_label(), "upstream receive failed");
                    break;
                }
            },
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sent = tx.send(event) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }

    // The token doubles as the session's "done" marker on every exit path.
    cancel.cancel();
    conn.close().await;
}
