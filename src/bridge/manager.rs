//! # BridgeManager: subscription lifecycle and event fan-out.
//!
//! The manager owns the consumer set and decides when a [`StreamSession`]
//! should exist. The upstream connection is opened only when at least one
//! consumer is interested and is torn down the instant interest drops to
//! zero.
//!
//! ## State machine
//! ```text
//!             subscribe(c, filter)
//!   Idle ───────────────────────────► Active (one session, consumers ≥ 1)
//!    ▲                                  │ ▲
//!    │       unsubscribe(last)          │ │ subscribe (same filter: reuse)
//!    └──────────────────────────────────┘ │ subscribe (new filter: replace)
//!                                         │ unsubscribe (non-last)
//!                                         ▼
//!   any state ── shutdown() ──► Stopped (terminal; operations fail)
//! ```
//!
//! ## Architecture
//! ```text
//! subscribe/unsubscribe/shutdown ──► [write lock] consumer set + session slot
//!
//! StreamSession receive loop ──► [hand-off queue] ──► fan-out loop
//!                                                        │
//!                                                        ├─ [read lock] consumer set
//!                                                        ▼
//!                                            sink.enqueue(consumer, message)
//!                                            (one Arc'd message per event)
//! ```
//!
//! ## Rules
//! - At most one live session per manager; replace closes the old session
//!   before the new one starts dispatching.
//! - A replace connects with the new filter **first**; if the connect fails,
//!   the prior session, filter, and consumer set are left fully intact.
//! - Events are dispatched in upstream receive order. The fan-out loop
//!   re-checks cancellation under the read lock, so once a close completes no
//!   stale event from the closed session reaches any consumer.
//! - A terminal receive error kills the session but leaves consumers
//!   subscribed; the broker owns their lifecycle. The next subscribe observes
//!   the dead session and replaces it regardless of filter.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use crate::bridge::consumer::ConsumerRef;
use crate::bridge::sink::PublishSink;
use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::events::{PublishMessage, StreamEvent};
use crate::session::StreamSession;
use crate::transport::Connect;

/// Shared mutable state: the consumer set and the current-session slot.
///
/// Everything else in the manager is immutable after construction.
struct BridgeState {
    consumers: HashMap<ConsumerRef, u8>,
    session: Option<StreamSession>,
    stopped: bool,
}

/// Single authoritative owner of the upstream session and the consumer set.
///
/// Constructed explicitly and handed to the broker's subscription-handling
/// path; there is no ambient registry.
pub struct BridgeManager {
    cfg: BridgeConfig,
    connector: Arc<dyn Connect>,
    sink: Arc<dyn PublishSink>,
    state: Arc<RwLock<BridgeState>>,
}

impl BridgeManager {
    /// Creates a manager in the idle state (no session, empty consumer set).
    pub fn new(cfg: BridgeConfig, connector: Arc<dyn Connect>, sink: Arc<dyn PublishSink>) -> Self {
        Self {
            cfg,
            connector,
            sink,
            state: Arc::new(RwLock::new(BridgeState {
                consumers: HashMap::new(),
                session: None,
                stopped: false,
            })),
        }
    }

    /// Registers `consumer` with the given interest level.
    ///
    /// The filter expression is the final token of `filter_tokens` (the
    /// keyword segment of the subscription path). If the current session is
    /// live and scoped to the same filter it is reused; otherwise a new
    /// connection is established with the new filter, the old session is
    /// closed, and the new one takes its place. Existing consumers keep
    /// receiving from whichever session is current.
    ///
    /// Returns only once the consumer is durably recorded, so a concurrent
    /// unsubscribe issued right after is guaranteed to see it. On error no
    /// state changes are visible to callers.
    pub async fn subscribe(
        &self,
        consumer: ConsumerRef,
        filter_tokens: &[String],
        interest: u8,
    ) -> Result<(), BridgeError> {
        let filter = filter_expression(filter_tokens)?;

        let mut state = self.state.write().await;
        if state.stopped {
            return Err(BridgeError::Stopped);
        }

        let reusable = state
            .session
            .as_ref()
            .is_some_and(|s| !s.is_closed() && s.filter() == filter);

        if !reusable {
            // Connect with the new filter before touching the old session:
            // a failed connect must leave the prior state intact.
            let conn = self.connector.connect(&filter).await.map_err(|e| {
                tracing::error!(error = %e, filter = %filter, "upstream connect failed");
                BridgeError::Connect(e)
            })?;

            if let Some(mut old) = state.session.take() {
                old.close().await;
            }

            let mut session =
                StreamSession::start(conn, filter.clone(), self.cfg.event_queue_clamped());
            if let Some(events) = session.take_events() {
                self.spawn_fanout(events, session.cancel_token());
            }
            state.session = Some(session);
        }

        tracing::info!(consumer = %consumer, filter = %filter, "bridge subscription added");
        state.consumers.insert(consumer, interest);
        Ok(())
    }

    /// Removes `consumer` from the set.
    ///
    /// Removing a consumer that was never subscribed is a silent no-op. When
    /// the set becomes empty the session is closed before this returns; no
    /// further events reach any consumer afterwards.
    pub async fn unsubscribe(&self, consumer: &ConsumerRef) -> Result<(), BridgeError> {
        let mut state = self.state.write().await;
        if state.stopped {
            return Err(BridgeError::Stopped);
        }
        if state.consumers.remove(consumer).is_none() {
            return Ok(());
        }
        if state.consumers.is_empty() {
            if let Some(mut session) = state.session.take() {
                tracing::info!("all subscriptions gone, closing upstream session");
                session.close().await;
            }
        }
        Ok(())
    }

    /// Terminal teardown: closes any live session and clears the consumer
    /// set. Idempotent. All later operations fail with
    /// [`BridgeError::Stopped`].
    pub async fn shutdown(&self) {
        let mut state = self.state.write().await;
        if state.stopped {
            return;
        }
        state.stopped = true;
        state.consumers.clear();
        if let Some(mut session) = state.session.take() {
            session.close().await;
        }
        tracing::info!("bridge manager stopped");
    }

    /// Number of currently subscribed consumers.
    pub async fn subscriber_count(&self) -> usize {
        self.state.read().await.consumers.len()
    }

    /// Interest level recorded for `consumer`, if subscribed.
    pub async fn interest(&self, consumer: &ConsumerRef) -> Option<u8> {
        self.state.read().await.consumers.get(consumer).copied()
    }

    /// True while a live (not self-terminated) session exists.
    pub async fn is_active(&self) -> bool {
        self.state
            .read()
            .await
            .session
            .as_ref()
            .is_some_and(|s| !s.is_closed())
    }

    /// Filter of the current live session, if any.
    pub async fn current_filter(&self) -> Option<String> {
        let state = self.state.read().await;
        state
            .session
            .as_ref()
            .filter(|s| !s.is_closed())
            .map(|s| s.filter().to_string())
    }

    /// Spawns the fan-out loop for one session.
    ///
    /// The loop ends when the session's token fires or its receive loop ends
    /// (hand-off sender dropped). The cancellation re-check under the read
    /// lock keeps a closed session's queued events from reaching consumers:
    /// `close()` cancels while the write lock is held, so any dispatch that
    /// acquires the read lock afterwards observes the cancellation.
    fn spawn_fanout(&self, mut events: mpsc::Receiver<StreamEvent>, cancel: CancellationToken) {
        let state = Arc::clone(&self.state);
        let sink = Arc::clone(&self.sink);
        let namespace = self.cfg.namespace.clone();

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    received = events.recv() => match received {
                        Some(event) => event,
                        None => break,
                    },
                };

                let message = Arc::new(PublishMessage::from_event(&namespace, &event));
                let guard = state.read().await;
                if cancel.is_cancelled() {
                    break;
                }
                for consumer in guard.consumers.keys() {
                    sink.enqueue(consumer, Arc::clone(&message));
                }
            }
        });
    }
}

/// Derives the upstream filter expression from the subscription tokens.
///
/// The final token is the keyword; it must exist and be non-empty.
fn filter_expression(tokens: &[String]) -> Result<String, BridgeError> {
    match tokens.last() {
        Some(keyword) if !keyword.is_empty() => Ok(keyword.clone()),
        _ => Err(BridgeError::EmptyFilter),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::sleep;

    use crate::error::TransportError;
    use crate::transport::StreamConnection;

    type FeedItem = Result<StreamEvent, TransportError>;

    /// Test-side handle to one prepared connection.
    struct Feed {
        tx: mpsc::UnboundedSender<FeedItem>,
        closed: Arc<AtomicBool>,
    }

    impl Feed {
        // Best-effort: a torn-down session has already dropped the receiver.
        fn push(&self, source: &str, text: &str) {
            let _ = self.tx.send(Ok(StreamEvent::new(source, text)));
        }

        fn fail(&self) {
            let _ = self.tx.send(Err(TransportError::Receive {
                reason: "stream dropped".into(),
            }));
        }

        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    struct TestConn {
        feed: mpsc::UnboundedReceiver<FeedItem>,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl StreamConnection for TestConn {
        async fn next(&mut self) -> Result<StreamEvent, TransportError> {
            match self.feed.recv().await {
                Some(item) => item,
                // Feed handle dropped: stay silent instead of erroring.
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    /// Connector that records filters and hands out prepared connections.
    #[derive(Default)]
    struct TestConnector {
        filters: Mutex<Vec<String>>,
        prepared: Mutex<VecDeque<TestConn>>,
        fail_next: AtomicBool,
    }

    impl TestConnector {
        fn prepare(&self) -> Feed {
            let (tx, rx) = mpsc::unbounded_channel();
            let closed = Arc::new(AtomicBool::new(false));
            self.prepared.lock().unwrap().push_back(TestConn {
                feed: rx,
                closed: closed.clone(),
            });
            Feed { tx, closed }
        }

        fn reject_next(&self) {
            self.fail_next.store(true, Ordering::SeqCst);
        }

        fn filters(&self) -> Vec<String> {
            self.filters.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Connect for TestConnector {
        async fn connect(&self, filter: &str) -> Result<Box<dyn StreamConnection>, TransportError> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(TransportError::Connect {
                    reason: "filter rejected".into(),
                });
            }
            self.filters.lock().unwrap().push(filter.to_string());
            let conn = self
                .prepared
                .lock()
                .unwrap()
                .pop_front()
                .expect("a prepared connection per expected connect");
            Ok(Box::new(conn))
        }
    }

    /// Sink that records every delivery in order.
    #[derive(Default)]
    struct RecordingSink {
        deliveries: Mutex<Vec<(String, Arc<PublishMessage>)>>,
    }

    impl RecordingSink {
        fn len(&self) -> usize {
            self.deliveries.lock().unwrap().len()
        }

        fn for_consumer(&self, id: &str) -> Vec<Arc<PublishMessage>> {
            self.deliveries
                .lock()
                .unwrap()
                .iter()
                .filter(|(c, _)| c == id)
                .map(|(_, m)| Arc::clone(m))
                .collect()
        }
    }

    impl PublishSink for RecordingSink {
        fn enqueue(&self, consumer: &ConsumerRef, message: Arc<PublishMessage>) {
            self.deliveries
                .lock()
                .unwrap()
                .push((consumer.id().to_string(), message));
        }
    }

    fn build() -> (BridgeManager, Arc<TestConnector>, Arc<RecordingSink>) {
        let connector = Arc::new(TestConnector::default());
        let sink = Arc::new(RecordingSink::default());
        let manager = BridgeManager::new(
            BridgeConfig::default(),
            connector.clone() as Arc<dyn Connect>,
            sink.clone() as Arc<dyn PublishSink>,
        );
        (manager, connector, sink)
    }

    fn tokens(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    async fn wait_until(what: &str, cond: impl Fn() -> bool) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for: {what}");
    }

    #[tokio::test]
    async fn test_empty_filter_tokens_are_rejected() {
        let (manager, connector, _sink) = build();
        let x = ConsumerRef::new("x");

        let err = manager.subscribe(x.clone(), &[], 0).await.unwrap_err();
        assert!(matches!(err, BridgeError::EmptyFilter));

        let err = manager
            .subscribe(x, &tokens(&["track", ""]), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::EmptyFilter));

        assert!(connector.filters().is_empty(), "no connect attempted");
        assert!(!manager.is_active().await);
        assert_eq!(manager.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn test_fanout_topics_follow_event_source() {
        let (manager, connector, sink) = build();
        let feed = connector.prepare();
        let x = ConsumerRef::new("x");

        manager
            .subscribe(x, &tokens(&["track", "golang"]), 0)
            .await
            .unwrap();
        assert_eq!(connector.filters(), vec!["golang"]);
        assert_eq!(manager.current_filter().await.as_deref(), Some("golang"));

        feed.push("alice", "hi");
        feed.push("bob", "yo");
        wait_until("two deliveries", || sink.len() == 2).await;

        let got = sink.for_consumer("x");
        assert_eq!(got[0].topic, "$stream/alice");
        assert_eq!(got[0].payload, b"hi");
        assert_eq!(got[0].qos, 0);
        assert_eq!(got[1].topic, "$stream/bob");
        assert_eq!(got[1].payload, b"yo");
    }

    #[tokio::test]
    async fn test_same_filter_shares_one_session() {
        let (manager, connector, sink) = build();
        let feed = connector.prepare();
        let x = ConsumerRef::new("x");
        let y = ConsumerRef::new("y");

        manager.subscribe(x, &tokens(&["a"]), 0).await.unwrap();
        manager.subscribe(y, &tokens(&["a"]), 0).await.unwrap();
        assert_eq!(connector.filters(), vec!["a"], "exactly one connect");
        assert_eq!(manager.subscriber_count().await, 2);

        for i in 0..5 {
            feed.push("src", &format!("m{i}"));
        }
        wait_until("both consumers fully served", || sink.len() == 10).await;

        // Identical streams: every consumer sees every event, in order.
        for id in ["x", "y"] {
            let got = sink.for_consumer(id);
            assert_eq!(got.len(), 5, "consumer {id} got exactly N messages");
            for (i, msg) in got.iter().enumerate() {
                assert_eq!(msg.payload, format!("m{i}").as_bytes());
            }
        }
    }

    #[tokio::test]
    async fn test_filter_change_replaces_session() {
        let (manager, connector, sink) = build();
        let feed_a = connector.prepare();
        let feed_b = connector.prepare();
        let x = ConsumerRef::new("x");

        manager.subscribe(x.clone(), &tokens(&["a"]), 0).await.unwrap();
        manager.subscribe(x, &tokens(&["b"]), 0).await.unwrap();

        assert_eq!(connector.filters(), vec!["a", "b"]);
        assert!(
            feed_a.is_closed(),
            "old connection closed before the new session dispatches"
        );
        assert_eq!(manager.subscriber_count().await, 1, "consumer kept through replace");
        assert_eq!(manager.current_filter().await.as_deref(), Some("b"));

        feed_b.push("carol", "hello");
        wait_until("delivery from the new session", || sink.len() == 1).await;
        assert_eq!(sink.for_consumer("x")[0].topic, "$stream/carol");
    }

    #[tokio::test]
    async fn test_duplicate_subscribe_updates_interest_only() {
        let (manager, connector, _sink) = build();
        let _feed = connector.prepare();
        let x = ConsumerRef::new("x");

        manager.subscribe(x.clone(), &tokens(&["a"]), 0).await.unwrap();
        manager.subscribe(x.clone(), &tokens(&["a"]), 1).await.unwrap();

        assert_eq!(connector.filters(), vec!["a"], "session reused");
        assert_eq!(manager.subscriber_count().await, 1, "no duplicate entry");
        assert_eq!(manager.interest(&x).await, Some(1), "interest updated");
    }

    #[tokio::test]
    async fn test_unsubscribe_of_non_member_is_noop() {
        let (manager, _connector, _sink) = build();

        manager.unsubscribe(&ConsumerRef::new("ghost")).await.unwrap();
        assert_eq!(manager.subscriber_count().await, 0);
        assert!(!manager.is_active().await);
    }

    #[tokio::test]
    async fn test_last_unsubscribe_tears_down_session() {
        let (manager, connector, sink) = build();
        let feed = connector.prepare();
        let x = ConsumerRef::new("x");
        let y = ConsumerRef::new("y");

        manager.subscribe(x.clone(), &tokens(&["a"]), 0).await.unwrap();
        manager.subscribe(y.clone(), &tokens(&["a"]), 0).await.unwrap();
        assert!(manager.is_active().await);

        feed.push("src", "before");
        wait_until("steady-state delivery", || sink.len() == 2).await;

        manager.unsubscribe(&x).await.unwrap();
        assert!(manager.is_active().await, "session survives non-last unsubscribe");

        manager.unsubscribe(&y).await.unwrap();
        assert!(!manager.is_active().await, "empty set tears the session down");
        assert!(feed.is_closed(), "connection released");

        // Anything still in flight upstream must not reach anyone.
        let delivered = sink.len();
        feed.push("src", "late");
        sleep(Duration::from_millis(100)).await;
        assert_eq!(sink.len(), delivered, "no delivery after teardown");
    }

    #[tokio::test]
    async fn test_connect_failure_leaves_prior_state_intact() {
        let (manager, connector, sink) = build();
        let x = ConsumerRef::new("x");

        // From idle: error surfaces, nothing is registered.
        connector.reject_next();
        let err = manager
            .subscribe(x.clone(), &tokens(&["a"]), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Connect(_)));
        assert_eq!(manager.subscriber_count().await, 0);
        assert!(!manager.is_active().await);

        // From active: the old session keeps running untouched.
        let feed_a = connector.prepare();
        manager.subscribe(x.clone(), &tokens(&["a"]), 0).await.unwrap();
        connector.reject_next();
        let err = manager.subscribe(x, &tokens(&["b"]), 0).await.unwrap_err();
        assert!(matches!(err, BridgeError::Connect(_)));

        assert_eq!(manager.current_filter().await.as_deref(), Some("a"));
        assert!(!feed_a.is_closed(), "prior session not torn down");
        feed_a.push("alice", "still here");
        wait_until("prior session still delivers", || sink.len() == 1).await;
    }

    #[tokio::test]
    async fn test_shutdown_is_terminal() {
        let (manager, connector, _sink) = build();
        let feed = connector.prepare();
        let x = ConsumerRef::new("x");

        manager.subscribe(x.clone(), &tokens(&["a"]), 0).await.unwrap();
        manager.shutdown().await;

        assert!(feed.is_closed(), "live session closed on shutdown");
        assert_eq!(manager.subscriber_count().await, 0, "consumer set cleared");

        let err = manager.subscribe(x.clone(), &tokens(&["a"]), 0).await.unwrap_err();
        assert!(matches!(err, BridgeError::Stopped));
        let err = manager.unsubscribe(&x).await.unwrap_err();
        assert!(matches!(err, BridgeError::Stopped));

        // Idempotent.
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_receive_error_keeps_consumers_subscribed() {
        let (manager, connector, sink) = build();
        let feed_a = connector.prepare();
        let x = ConsumerRef::new("x");

        manager.subscribe(x.clone(), &tokens(&["a"]), 0).await.unwrap();
        feed_a.push("alice", "hi");
        wait_until("delivery before the failure", || sink.len() == 1).await;

        feed_a.fail();
        wait_until("session self-terminates", || feed_a.is_closed()).await;

        // The set is untouched; only the session died.
        assert_eq!(manager.subscriber_count().await, 1);
        assert!(!manager.is_active().await);

        // Re-subscribing with the same filter replaces the dead session.
        let feed_b = connector.prepare();
        manager.subscribe(x, &tokens(&["a"]), 0).await.unwrap();
        assert_eq!(connector.filters(), vec!["a", "a"]);
        assert!(manager.is_active().await);

        feed_b.push("bob", "back");
        wait_until("delivery after recovery", || sink.len() == 2).await;
        assert_eq!(sink.for_consumer("x")[1].topic, "$stream/bob");
    }

    #[tokio::test]
    async fn test_consumer_set_matches_call_replay() {
        let (manager, connector, _sink) = build();
        let _feed = connector.prepare();
        let (x, y, z) = (
            ConsumerRef::new("x"),
            ConsumerRef::new("y"),
            ConsumerRef::new("z"),
        );

        manager.subscribe(x.clone(), &tokens(&["a"]), 0).await.unwrap();
        manager.subscribe(y.clone(), &tokens(&["a"]), 1).await.unwrap();
        manager.subscribe(x.clone(), &tokens(&["a"]), 2).await.unwrap();
        manager.unsubscribe(&z).await.unwrap();
        manager.unsubscribe(&y).await.unwrap();

        assert_eq!(manager.subscriber_count().await, 1);
        assert_eq!(manager.interest(&x).await, Some(2));
        assert_eq!(manager.interest(&y).await, None);
        assert!(manager.is_active().await, "x still holds the session open");
    }
}
