//! The segment output stream: a long-lived, single-segment append channel
//! over an unreliable transport.
//!
//! The stream keeps every un-acknowledged append in the in-flight ledger.
//! On connect (and every reconnect) it sends `SetupAppend` and waits for
//! `AppendSetup`, which carries the server's ack level for this writer:
//! everything at or below that level is drained from the ledger, everything
//! above it is retransmitted, and only then is the connection marked ready.
//! Because the server deduplicates by `(writer id, connection offset)` and
//! acks are monotone, retransmitting the whole ledger is always safe.
//!
//! Public operations are serialized by a stream-wide monitor. Reply
//! handling runs on the transport's thread and touches only the ledger and
//! the connection state, both internally synchronized. No lock is ever
//! held across a transport call or a blocking wait.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use seglog_types::{Endpoint, SegmentName, WriterId};
use seglog_wire::{
    AppendData, AppendSetup, DataAppended, NoSuchBatch, NoSuchSegment, Reply, Request,
    SegmentIsSealed, SetupAppend, WrongHost,
};
use tracing::{debug, warn};

use crate::config::OutputStreamConfig;
use crate::error::{ClientError, ClientResult};
use crate::ledger::InflightLedger;
use crate::reply::ReplyProcessor;
use crate::state::ConnectionState;
use crate::sync::Completion;
use crate::transport::{ClientConnection, ConnectionFactory};

// ============================================================================
// Shared stream state
// ============================================================================

/// State shared between public callers and the reply processor.
struct StreamShared {
    segment: SegmentName,
    writer_id: WriterId,
    connection: ConnectionState,
    ledger: InflightLedger,
    /// First terminal failure (sealed, invalid segment). Once set, no
    /// operation reaches the wire again.
    terminal: Mutex<Option<ClientError>>,
}

impl StreamShared {
    fn sealed_error(&self) -> ClientError {
        ClientError::Sealed(self.segment.clone())
    }

    fn terminal_error(&self) -> Option<ClientError> {
        self.terminal.lock().ok().and_then(|terminal| terminal.clone())
    }

    /// Terminal failure: make it sticky, then surface it to concurrent
    /// public callers via the connection state and to every in-flight
    /// completion.
    fn terminate(&self, error: &ClientError) {
        if let Ok(mut terminal) = self.terminal.lock() {
            if terminal.is_none() {
                *terminal = Some(error.clone());
            }
        }
        self.connection.fail(error.clone());
        if let Err(e) = self.ledger.fail_all(error) {
            warn!(segment = %self.segment, error = %e, "failed to drain ledger");
        }
    }
}

// ============================================================================
// Reply processing
// ============================================================================

struct ResponseProcessor {
    shared: Arc<StreamShared>,
}

impl ResponseProcessor {
    /// Resends every ledger entry, ascending, on the current connection.
    fn retransmit(&self) -> ClientResult<()> {
        let snapshot = self.shared.ledger.snapshot()?;
        if snapshot.is_empty() {
            return Ok(());
        }
        let connection = self.shared.connection.current().ok_or_else(|| {
            ClientError::Transport("connection lost before retransmit".into())
        })?;
        debug!(
            segment = %self.shared.segment,
            entries = snapshot.len(),
            "retransmitting in-flight appends"
        );
        for (offset, data) in snapshot {
            connection.send(&Request::AppendData(AppendData {
                writer_id: self.shared.writer_id,
                offset,
                data,
            }))?;
        }
        Ok(())
    }
}

impl ReplyProcessor for ResponseProcessor {
    fn append_setup(&self, reply: AppendSetup) {
        debug!(
            segment = %self.shared.segment,
            ack_level = reply.ack_level,
            "append session established"
        );
        let result = self
            .shared
            .ledger
            .ack_up_to(reply.ack_level)
            .and_then(|()| self.retransmit());
        match result {
            Ok(()) => self.shared.connection.mark_ready(),
            Err(error) => self.shared.connection.fail(error),
        }
    }

    fn data_appended(&self, reply: DataAppended) {
        if let Err(error) = self.shared.ledger.ack_up_to(reply.ack_level) {
            self.shared.connection.fail(error);
        }
    }

    fn segment_is_sealed(&self, _reply: SegmentIsSealed) {
        let error = self.shared.sealed_error();
        self.shared.terminate(&error);
    }

    fn no_such_segment(&self, reply: NoSuchSegment) {
        let error = ClientError::InvalidArgument(format!("no such segment: {}", reply.segment));
        self.shared.terminate(&error);
    }

    fn no_such_batch(&self, reply: NoSuchBatch) {
        let error = ClientError::InvalidArgument(format!("no such batch: {}", reply.batch));
        self.shared.terminate(&error);
    }

    fn wrong_host(&self, reply: WrongHost) {
        // No redirect in this version; reconnecting to the configured
        // endpoint is the only recovery.
        self.shared.connection.fail(ClientError::Transport(format!(
            "segment {} moved to {}",
            reply.segment, reply.correct_host
        )));
    }

    fn unhandled(&self, reply: Reply) {
        self.shared
            .connection
            .fail(ClientError::ProtocolViolation(reply.kind()));
    }

    fn connection_dropped(&self) {
        self.shared
            .connection
            .fail(ClientError::Transport("connection dropped".into()));
    }
}

// ============================================================================
// Output stream
// ============================================================================

/// Append channel to one segment, with at-most-once sends and durable
/// ordering per `(writer id, connection offset)`.
///
/// Constructed by
/// [`SegmentClient::open_for_append`](crate::SegmentClient::open_for_append).
/// Safe to share across threads; public operations are mutually exclusive.
pub struct SegmentOutputStream {
    endpoint: Endpoint,
    config: OutputStreamConfig,
    factory: Arc<dyn ConnectionFactory>,
    shared: Arc<StreamShared>,
    closed: AtomicBool,
    monitor: Mutex<()>,
}

impl SegmentOutputStream {
    pub(crate) fn new(
        factory: Arc<dyn ConnectionFactory>,
        endpoint: Endpoint,
        writer_id: WriterId,
        segment: SegmentName,
        config: OutputStreamConfig,
    ) -> Self {
        Self {
            endpoint,
            config,
            factory,
            shared: Arc::new(StreamShared {
                segment,
                writer_id,
                connection: ConnectionState::new(),
                ledger: InflightLedger::new(),
                terminal: Mutex::new(None),
            }),
            closed: AtomicBool::new(false),
            monitor: Mutex::new(()),
        }
    }

    pub fn segment(&self) -> &SegmentName {
        &self.shared.segment
    }

    pub fn writer_id(&self) -> WriterId {
        self.shared.writer_id
    }

    fn monitor(&self) -> ClientResult<MutexGuard<'_, ()>> {
        self.monitor.lock().map_err(|_| ClientError::Interrupted)
    }

    /// First connect attempt, made at open time. Failures are the caller's
    /// to suppress; the stream recovers on the first write.
    pub(crate) fn initial_connect(&self) -> ClientResult<()> {
        let _guard = self.monitor()?;
        self.connect()
    }

    /// Establishes a connection and starts the append handshake, unless one
    /// is already installed. The ready-latch stays low until `AppendSetup`
    /// arrives.
    fn connect(&self) -> ClientResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ClientError::IllegalState("stream is closed"));
        }
        if let Some(error) = self.shared.terminal_error() {
            return Err(error);
        }
        if self.shared.connection.current().is_some() {
            return Ok(());
        }

        debug!(segment = %self.shared.segment, endpoint = %self.endpoint, "connecting");
        let processor: Arc<dyn ReplyProcessor> = Arc::new(ResponseProcessor {
            shared: Arc::clone(&self.shared),
        });
        let connection = self.factory.establish(&self.endpoint, processor)?;
        self.shared.connection.install_new(Arc::clone(&connection))?;

        let setup = Request::SetupAppend(SetupAppend {
            writer_id: self.shared.writer_id,
            segment: self.shared.segment.clone(),
        });
        if let Err(error) = connection.send(&setup) {
            self.shared.connection.fail(error.clone());
            return Err(error);
        }
        Ok(())
    }

    /// Returns a handshake-complete connection, reconnecting with bounded
    /// backoff on transport failures. Terminal errors (sealed, invalid
    /// segment, closed) propagate immediately.
    fn ensure_ready(&self) -> ClientResult<Arc<dyn ClientConnection>> {
        let retry = &self.config.retry;
        let mut delay = retry.initial_delay;
        for attempt in 1..=retry.max_attempts {
            let result = self
                .connect()
                .and_then(|()| self.shared.connection.await_ready());
            match result {
                Ok(connection) => return Ok(connection),
                Err(error) if error.is_retryable() => {
                    warn!(
                        segment = %self.shared.segment,
                        attempt,
                        error = %error,
                        "connect attempt failed"
                    );
                    self.shared.connection.fail(error);
                    thread::sleep(delay);
                    delay *= retry.backoff_multiplier;
                }
                Err(error) => return Err(error),
            }
        }
        Err(ClientError::Unavailable {
            endpoint: self.endpoint.clone(),
            attempts: retry.max_attempts,
        })
    }

    /// Appends `payload` to the segment.
    ///
    /// Returns once the append is recorded in the ledger and sent once;
    /// durability is signaled through `completion`, which settles `Ok` when
    /// the server acknowledges this offset, or with the error that
    /// terminated the stream. When `write` itself returns an error the
    /// append was never enqueued and `completion` never settles.
    pub fn write(&self, payload: Bytes, completion: Completion) -> ClientResult<()> {
        let _guard = self.monitor()?;
        if self.closed.load(Ordering::SeqCst) {
            return Err(ClientError::IllegalState("stream is closed"));
        }
        let connection = self.ensure_ready()?;

        // Enqueue before sending: if the send fails the append is already
        // in the ledger and the reconnect handshake retransmits it.
        let offset = self
            .shared
            .ledger
            .enqueue(payload.clone(), completion)?;
        let append = Request::AppendData(AppendData {
            writer_id: self.shared.writer_id,
            offset,
            data: payload,
        });
        if let Err(error) = connection.send(&append) {
            warn!(
                segment = %self.shared.segment,
                offset,
                error = %error,
                "append send failed; reconnecting"
            );
            self.shared.connection.fail(error);
            // Not re-enqueued: the reconnect retransmits the ledger.
            self.ensure_ready()?;
        }
        Ok(())
    }

    /// Blocks until every previously written append is durable.
    ///
    /// `KeepAlive` prompts the server to flush pending acks so the ledger
    /// drains promptly. A transport failure mid-flush is swallowed: the
    /// ledger still holds everything, a reconnect will retransmit, and the
    /// caller may re-flush.
    pub fn flush(&self) -> ClientResult<()> {
        let _guard = self.monitor()?;
        if self.closed.load(Ordering::SeqCst) {
            return Err(ClientError::IllegalState("stream is closed"));
        }
        self.flush_locked()
    }

    fn flush_locked(&self) -> ClientResult<()> {
        let connection = self.ensure_ready()?;
        if let Err(error) = connection.send(&Request::KeepAlive) {
            warn!(segment = %self.shared.segment, error = %error, "flush send failed");
            self.shared.connection.fail(error);
            return Ok(());
        }
        self.shared.ledger.await_empty()?;
        // The ledger may have drained through `fail_all` rather than acks.
        if let Some(error) = self.shared.terminal_error() {
            return Err(error);
        }
        Ok(())
    }

    /// Drains outstanding appends and releases the connection.
    ///
    /// Safe to call repeatedly; after the first return every other
    /// operation fails with `IllegalState`. A drain failure surfaces as
    /// `Sealed` when the segment sealed mid-drain and as `IllegalState`
    /// otherwise.
    pub fn close(&self) -> ClientResult<()> {
        let _guard = self.monitor()?;
        if self.closed.load(Ordering::SeqCst) {
            return Ok(());
        }
        let drained = match self.shared.ledger.is_empty() {
            Ok(true) => Ok(()),
            Ok(false) => self.flush_locked(),
            Err(error) => Err(error),
        };
        self.closed.store(true, Ordering::SeqCst);
        self.shared.connection.release();
        match drained {
            Ok(()) => Ok(()),
            Err(error @ ClientError::Sealed(_)) => Err(error),
            Err(error) => {
                warn!(
                    segment = %self.shared.segment,
                    error = %error,
                    "drain failed during close"
                );
                Err(ClientError::IllegalState("drain failed during close"))
            }
        }
    }

    /// Sealing from the client is not implemented in this version.
    pub fn seal(&self, _timeout: Duration) -> ClientResult<u64> {
        Err(ClientError::Unsupported("seal"))
    }
}
