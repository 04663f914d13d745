//! Transport abstraction for the append protocol.
//!
//! This module defines the [`ConnectionFactory`] and [`ClientConnection`]
//! traits that the streams are written against:
//!
//! - [`TcpConnectionFactory`](crate::TcpConnectionFactory): production TCP
//!   transport with a dedicated reader thread per connection
//! - [`MockConnectionFactory`]: scriptable in-memory transport for tests
//!
//! # Contract
//!
//! A connection delivers decoded replies to its registered
//! [`ReplyProcessor`] in server-send order, on a transport-owned thread.
//! `send` is non-blocking or bounded by a transport timeout. `close` is
//! idempotent: further sends fail and no further replies are delivered.
//! A connection lost without `close` reports
//! [`ReplyProcessor::connection_dropped`] exactly once.

use std::sync::{Arc, Mutex};

use seglog_types::Endpoint;
use seglog_wire::{Reply, Request};

use crate::error::{ClientError, ClientResult};
use crate::reply::ReplyProcessor;

// ============================================================================
// Traits
// ============================================================================

/// Opens logical connections to segment store endpoints.
pub trait ConnectionFactory: Send + Sync {
    /// Establishes one connection to `endpoint`, registering `processor` as
    /// the sink for every reply arriving on it.
    fn establish(
        &self,
        endpoint: &Endpoint,
        processor: Arc<dyn ReplyProcessor>,
    ) -> ClientResult<Arc<dyn ClientConnection>>;
}

/// One logical connection to an endpoint.
pub trait ClientConnection: Send + Sync {
    /// Transmits a single wire command.
    fn send(&self, request: &Request) -> ClientResult<()>;

    /// Releases the connection. Idempotent; subsequent sends fail with a
    /// transport error and reply delivery stops.
    fn close(&self);
}

// ============================================================================
// Mock transport (for testing)
// ============================================================================

/// Reaction of a [`MockConnectionFactory`] to an outgoing request, installed
/// with [`MockConnectionFactory::on_send`]. Runs on the sending thread after
/// the request is recorded; typically used to script server replies.
pub type SendHook = dyn Fn(&MockConnection, &Request) + Send + Sync;

/// An in-memory [`ConnectionFactory`] that records traffic and lets tests
/// script replies, send failures, and connection loss.
pub struct MockConnectionFactory {
    inner: Mutex<FactoryInner>,
    on_send: Mutex<Option<Arc<SendHook>>>,
}

struct FactoryInner {
    connections: Vec<Arc<MockConnection>>,
    establish_failures: u32,
}

impl MockConnectionFactory {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(FactoryInner {
                connections: Vec::new(),
                establish_failures: 0,
            }),
            on_send: Mutex::new(None),
        }
    }

    /// Makes the next `count` calls to `establish` fail with a transport
    /// error.
    pub fn fail_next_establish(&self, count: u32) {
        self.inner.lock().expect("factory poisoned").establish_failures = count;
    }

    /// Installs a hook invoked for every request sent on any connection
    /// from this factory.
    pub fn on_send(&self, hook: impl Fn(&MockConnection, &Request) + Send + Sync + 'static) {
        *self.on_send.lock().expect("factory poisoned") = Some(Arc::new(hook));
    }

    /// All connections established so far, oldest first.
    pub fn connections(&self) -> Vec<Arc<MockConnection>> {
        self.inner.lock().expect("factory poisoned").connections.clone()
    }

    /// The most recently established connection.
    ///
    /// # Panics
    ///
    /// Panics if nothing has connected yet.
    pub fn last_connection(&self) -> Arc<MockConnection> {
        self.connections()
            .last()
            .cloned()
            .expect("no connection established")
    }
}

impl Default for MockConnectionFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionFactory for MockConnectionFactory {
    fn establish(
        &self,
        endpoint: &Endpoint,
        processor: Arc<dyn ReplyProcessor>,
    ) -> ClientResult<Arc<dyn ClientConnection>> {
        let hook = self.on_send.lock().expect("factory poisoned").clone();
        let mut inner = self.inner.lock().expect("factory poisoned");
        if inner.establish_failures > 0 {
            inner.establish_failures -= 1;
            return Err(ClientError::Transport(format!(
                "mock refused connection to {endpoint}"
            )));
        }

        let connection = Arc::new(MockConnection {
            processor,
            hook,
            state: Mutex::new(ConnState {
                sent: Vec::new(),
                send_failures: 0,
                closed: false,
            }),
        });
        inner.connections.push(Arc::clone(&connection));
        Ok(connection)
    }
}

struct ConnState {
    sent: Vec<Request>,
    send_failures: u32,
    closed: bool,
}

/// A connection handed out by [`MockConnectionFactory`].
pub struct MockConnection {
    processor: Arc<dyn ReplyProcessor>,
    hook: Option<Arc<SendHook>>,
    state: Mutex<ConnState>,
}

impl MockConnection {
    /// Everything sent on this connection, in order.
    pub fn sent(&self) -> Vec<Request> {
        self.state.lock().expect("connection poisoned").sent.clone()
    }

    /// Makes the next `count` sends fail with a transport error.
    pub fn fail_next_sends(&self, count: u32) {
        self.state.lock().expect("connection poisoned").send_failures = count;
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().expect("connection poisoned").closed
    }

    /// Delivers a server reply to the registered processor, as the reader
    /// thread of a real transport would. Dropped silently once closed.
    pub fn deliver(&self, reply: Reply) {
        if !self.is_closed() {
            self.processor.process(reply);
        }
    }

    /// Simulates losing the connection: marks it closed and reports
    /// [`ReplyProcessor::connection_dropped`].
    pub fn drop_connection(&self) {
        let was_closed = {
            let mut state = self.state.lock().expect("connection poisoned");
            std::mem::replace(&mut state.closed, true)
        };
        if !was_closed {
            self.processor.connection_dropped();
        }
    }
}

impl ClientConnection for MockConnection {
    fn send(&self, request: &Request) -> ClientResult<()> {
        {
            let mut state = self.state.lock().expect("connection poisoned");
            if state.closed {
                return Err(ClientError::Transport("connection closed".into()));
            }
            if state.send_failures > 0 {
                state.send_failures -= 1;
                return Err(ClientError::Transport("mock send failure".into()));
            }
            state.sent.push(request.clone());
        }
        // Hook runs outside the state lock so scripted replies may send
        // again on this connection (retransmits re-enter `send`).
        if let Some(hook) = self.hook.as_deref() {
            hook(self, request);
        }
        Ok(())
    }

    fn close(&self) {
        self.state.lock().expect("connection poisoned").closed = true;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use seglog_types::SegmentName;
    use seglog_wire::{CreateSegment, SegmentCreated};

    use super::*;

    struct CountingProcessor {
        replies: AtomicUsize,
        drops: AtomicUsize,
    }

    impl CountingProcessor {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                replies: AtomicUsize::new(0),
                drops: AtomicUsize::new(0),
            })
        }
    }

    impl ReplyProcessor for CountingProcessor {
        fn unhandled(&self, _reply: Reply) {
            self.replies.fetch_add(1, Ordering::SeqCst);
        }

        fn connection_dropped(&self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn endpoint() -> Endpoint {
        Endpoint::new("mock", 0)
    }

    fn create_request() -> Request {
        Request::CreateSegment(CreateSegment {
            segment: SegmentName::new("s1"),
        })
    }

    fn created_reply() -> Reply {
        Reply::SegmentCreated(SegmentCreated {
            segment: SegmentName::new("s1"),
        })
    }

    #[test]
    fn records_sent_requests_in_order() {
        let factory = MockConnectionFactory::new();
        let conn = factory
            .establish(&endpoint(), CountingProcessor::new())
            .unwrap();

        conn.send(&create_request()).unwrap();
        conn.send(&Request::KeepAlive).unwrap();

        let sent = factory.last_connection().sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1], Request::KeepAlive);
    }

    #[test]
    fn scripted_establish_failures_run_out() {
        let factory = MockConnectionFactory::new();
        factory.fail_next_establish(2);

        assert!(factory.establish(&endpoint(), CountingProcessor::new()).is_err());
        assert!(factory.establish(&endpoint(), CountingProcessor::new()).is_err());
        assert!(factory.establish(&endpoint(), CountingProcessor::new()).is_ok());
    }

    #[test]
    fn close_stops_sends_and_delivery() {
        let factory = MockConnectionFactory::new();
        let processor = CountingProcessor::new();
        let conn = factory
            .establish(&endpoint(), Arc::clone(&processor) as Arc<dyn ReplyProcessor>)
            .unwrap();

        conn.close();
        conn.close(); // idempotent

        assert!(conn.send(&Request::KeepAlive).is_err());
        factory.last_connection().deliver(created_reply());
        assert_eq!(processor.replies.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn dropping_reports_once() {
        let factory = MockConnectionFactory::new();
        let processor = CountingProcessor::new();
        let _conn = factory
            .establish(&endpoint(), Arc::clone(&processor) as Arc<dyn ReplyProcessor>)
            .unwrap();

        let mock = factory.last_connection();
        mock.drop_connection();
        mock.drop_connection();

        assert_eq!(processor.drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn send_hook_sees_each_request() {
        let factory = MockConnectionFactory::new();
        let seen = Arc::new(AtomicUsize::new(0));
        {
            let seen = Arc::clone(&seen);
            factory.on_send(move |_conn, _req| {
                seen.fetch_add(1, Ordering::SeqCst);
            });
        }

        let conn = factory
            .establish(&endpoint(), CountingProcessor::new())
            .unwrap();
        conn.send(&Request::KeepAlive).unwrap();
        conn.send(&Request::KeepAlive).unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }
}
