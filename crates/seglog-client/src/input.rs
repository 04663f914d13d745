//! Sequential segment reader.
//!
//! Reads are a simple request/response exchange: one outstanding
//! `ReadSegment` at a time, answered by a `SegmentRead` carrying the bytes
//! at the requested offset. Unlike the append path there is no handshake
//! and nothing to retransmit on reconnect beyond the read itself.

use std::sync::{Arc, Mutex};
use std::thread;

use bytes::Bytes;
use seglog_types::{Endpoint, SegmentName};
use seglog_wire::{NoSuchSegment, ReadSegment, Reply, Request, SegmentRead};
use tracing::{debug, warn};

use crate::config::InputStreamConfig;
use crate::error::{ClientError, ClientResult};
use crate::reply::ReplyProcessor;
use crate::state::ConnectionState;
use crate::sync::Promise;
use crate::transport::{ClientConnection, ConnectionFactory};

type ReadPromise = Arc<Promise<Result<SegmentRead, ClientError>>>;

struct InputShared {
    segment: SegmentName,
    connection: ConnectionState,
    /// The single outstanding read, if any.
    pending: Mutex<Option<ReadPromise>>,
}

impl InputShared {
    fn take_pending(&self) -> Option<ReadPromise> {
        self.pending.lock().ok().and_then(|mut p| p.take())
    }

    fn fail_pending(&self, error: ClientError) {
        if let Some(promise) = self.take_pending() {
            promise.set(Err(error));
        }
    }
}

struct ReadProcessor {
    shared: Arc<InputShared>,
}

impl ReplyProcessor for ReadProcessor {
    fn segment_read(&self, reply: SegmentRead) {
        match self.shared.take_pending() {
            Some(promise) => promise.set(Ok(reply)),
            None => {
                // Nothing outstanding: the server is pushing reads we never
                // asked for.
                self.shared
                    .connection
                    .fail(ClientError::ProtocolViolation("SegmentRead"));
            }
        }
    }

    fn no_such_segment(&self, reply: NoSuchSegment) {
        let error = ClientError::InvalidArgument(format!("no such segment: {}", reply.segment));
        self.shared.connection.fail(error.clone());
        self.shared.fail_pending(error);
    }

    fn unhandled(&self, reply: Reply) {
        let error = ClientError::ProtocolViolation(reply.kind());
        self.shared.connection.fail(error.clone());
        self.shared.fail_pending(error);
    }

    fn connection_dropped(&self) {
        let error = ClientError::Transport("connection dropped".into());
        self.shared.connection.fail(error.clone());
        self.shared.fail_pending(error);
    }
}

/// Sequential reader over one segment.
///
/// Constructed by
/// [`SegmentClient::open_for_read`](crate::SegmentClient::open_for_read).
/// Not shareable across threads; reads advance an internal offset.
pub struct SegmentInputStream {
    endpoint: Endpoint,
    config: InputStreamConfig,
    factory: Arc<dyn ConnectionFactory>,
    shared: Arc<InputShared>,
    offset: u64,
    end_of_segment: bool,
    closed: bool,
}

impl SegmentInputStream {
    pub(crate) fn new(
        factory: Arc<dyn ConnectionFactory>,
        endpoint: Endpoint,
        segment: SegmentName,
        config: InputStreamConfig,
    ) -> Self {
        Self {
            endpoint,
            config,
            factory,
            shared: Arc::new(InputShared {
                segment,
                connection: ConnectionState::new(),
                pending: Mutex::new(None),
            }),
            offset: 0,
            end_of_segment: false,
            closed: false,
        }
    }

    pub fn segment(&self) -> &SegmentName {
        &self.shared.segment
    }

    /// The offset the next read starts at.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Repositions the stream.
    pub fn seek(&mut self, offset: u64) {
        self.offset = offset;
        self.end_of_segment = false;
    }

    /// Connects lazily; reads are ready as soon as the connection exists.
    fn ensure_connected(&self) -> ClientResult<Arc<dyn ClientConnection>> {
        if self.shared.connection.current().is_none() {
            debug!(segment = %self.shared.segment, endpoint = %self.endpoint, "connecting");
            let processor: Arc<dyn ReplyProcessor> = Arc::new(ReadProcessor {
                shared: Arc::clone(&self.shared),
            });
            let connection = self.factory.establish(&self.endpoint, processor)?;
            self.shared.connection.install_new(connection)?;
            self.shared.connection.mark_ready();
        }
        self.shared.connection.await_ready()
    }

    /// Reads the next chunk of the segment.
    ///
    /// Returns at most
    /// [`read_length`](crate::InputStreamConfig::read_length) bytes. An
    /// empty result past the seal point means end of segment; an empty
    /// result before it means no bytes were available at this offset yet.
    pub fn read(&mut self) -> ClientResult<Bytes> {
        if self.closed {
            return Err(ClientError::IllegalState("stream is closed"));
        }
        if self.end_of_segment {
            return Ok(Bytes::new());
        }

        let retry = self.config.retry.clone();
        let mut delay = retry.initial_delay;
        for attempt in 1..=retry.max_attempts {
            match self.read_once() {
                Ok(read) => {
                    if read.offset != self.offset {
                        let error = ClientError::ProtocolViolation("SegmentRead");
                        self.shared.connection.fail(error.clone());
                        return Err(error);
                    }
                    self.offset += read.data.len() as u64;
                    self.end_of_segment = read.end_of_segment;
                    return Ok(read.data);
                }
                Err(error) if error.is_retryable() => {
                    warn!(
                        segment = %self.shared.segment,
                        attempt,
                        error = %error,
                        "read attempt failed"
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

    fn read_once(&mut self) -> ClientResult<SegmentRead> {
        let connection = self.ensure_connected()?;

        let promise: ReadPromise = Arc::new(Promise::new());
        *self
            .shared
            .pending
            .lock()
            .map_err(|_| ClientError::Interrupted)? = Some(Arc::clone(&promise));

        let request = Request::ReadSegment(ReadSegment {
            segment: self.shared.segment.clone(),
            offset: self.offset,
            suggested_length: self.config.read_length,
        });
        if let Err(error) = connection.send(&request) {
            self.shared.take_pending();
            return Err(error);
        }
        promise.wait()?
    }

    /// Releases the connection; further reads fail `IllegalState`.
    pub fn close(&mut self) {
        self.closed = true;
        self.shared.connection.release();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::config::RetryPolicy;
    use crate::transport::MockConnectionFactory;

    /// Serves a fixed segment image out of the send hook.
    fn serving_factory(content: &'static [u8], sealed: bool) -> Arc<MockConnectionFactory> {
        let factory = Arc::new(MockConnectionFactory::new());
        factory.on_send(move |conn, request| {
            if let Request::ReadSegment(read) = request {
                let from = usize::try_from(read.offset).unwrap().min(content.len());
                let to = (from + read.suggested_length as usize).min(content.len());
                conn.deliver(Reply::SegmentRead(SegmentRead {
                    segment: read.segment.clone(),
                    offset: read.offset,
                    end_of_segment: sealed && to == content.len(),
                    data: Bytes::from_static(&content[from..to]),
                }));
            }
        });
        factory
    }

    fn input_stream(factory: &Arc<MockConnectionFactory>, read_length: u32) -> SegmentInputStream {
        SegmentInputStream::new(
            Arc::clone(factory) as Arc<dyn ConnectionFactory>,
            Endpoint::new("mock", 0),
            SegmentName::new("s1"),
            InputStreamConfig {
                read_length,
                retry: RetryPolicy {
                    initial_delay: std::time::Duration::ZERO,
                    ..RetryPolicy::default()
                },
            },
        )
    }

    #[test]
    fn reads_advance_through_the_segment() {
        let factory = serving_factory(b"abcdefghij", true);
        let mut stream = input_stream(&factory, 4);

        assert_eq!(stream.read().unwrap(), Bytes::from_static(b"abcd"));
        assert_eq!(stream.read().unwrap(), Bytes::from_static(b"efgh"));
        assert_eq!(stream.read().unwrap(), Bytes::from_static(b"ij"));
        assert_eq!(stream.offset(), 10);

        // Past the seal point every read is empty.
        assert_eq!(stream.read().unwrap(), Bytes::new());
    }

    #[test]
    fn seek_repositions_and_clears_end_of_segment() {
        let factory = serving_factory(b"abcdefghij", true);
        let mut stream = input_stream(&factory, 64);

        assert_eq!(stream.read().unwrap().len(), 10);
        stream.seek(6);
        assert_eq!(stream.read().unwrap(), Bytes::from_static(b"ghij"));
    }

    #[test]
    fn read_retries_through_a_dropped_connection() {
        let factory = serving_factory(b"abcd", false);
        let mut stream = input_stream(&factory, 64);

        assert_eq!(stream.read().unwrap().len(), 4);

        // Lose the connection; the next read reconnects and retries.
        factory.last_connection().drop_connection();
        assert_eq!(stream.read().unwrap(), Bytes::new());
        assert_eq!(factory.connections().len(), 2);
    }

    #[test]
    fn missing_segment_is_invalid_argument() {
        let factory = Arc::new(MockConnectionFactory::new());
        factory.on_send(|conn, request| {
            if let Request::ReadSegment(read) = request {
                conn.deliver(Reply::NoSuchSegment(NoSuchSegment {
                    segment: read.segment.clone(),
                }));
            }
        });
        let mut stream = input_stream(&factory, 64);

        assert!(matches!(
            stream.read(),
            Err(ClientError::InvalidArgument(_))
        ));
    }

    #[test]
    fn close_stops_reads_and_releases_the_connection() {
        let factory = serving_factory(b"abcd", false);
        let mut stream = input_stream(&factory, 64);
        stream.read().unwrap();

        stream.close();
        assert!(factory.last_connection().is_closed());
        assert_eq!(
            stream.read(),
            Err(ClientError::IllegalState("stream is closed"))
        );
    }

    #[test]
    fn stale_offset_reply_is_a_protocol_violation() {
        let replies = HashMap::from([(0u64, 7u64)]);
        let factory = Arc::new(MockConnectionFactory::new());
        factory.on_send(move |conn, request| {
            if let Request::ReadSegment(read) = request {
                let offset = *replies.get(&read.offset).unwrap_or(&read.offset);
                conn.deliver(Reply::SegmentRead(SegmentRead {
                    segment: read.segment.clone(),
                    offset,
                    end_of_segment: false,
                    data: Bytes::from_static(b"zz"),
                }));
            }
        });
        let mut stream = input_stream(&factory, 64);

        assert_eq!(
            stream.read(),
            Err(ClientError::ProtocolViolation("SegmentRead"))
        );
    }
}
