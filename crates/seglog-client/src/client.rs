//! Client facade: segment creation and stream factories.

use std::sync::Arc;

use seglog_types::{BatchId, Endpoint, SegmentName, WriterId};
use seglog_wire::{
    CreateSegment, Reply, Request, SegmentAlreadyExists, SegmentCreated, WrongHost,
};
use tracing::warn;

use crate::config::{InputStreamConfig, OutputStreamConfig};
use crate::error::{ClientError, ClientResult};
use crate::input::SegmentInputStream;
use crate::output::SegmentOutputStream;
use crate::reply::ReplyProcessor;
use crate::sync::Promise;
use crate::transport::ConnectionFactory;

/// Entry point to one segment store endpoint.
///
/// # Example
///
/// ```ignore
/// use seglog_client::{Completion, OutputStreamConfig, SegmentClient, TcpConnectionFactory};
/// use seglog_types::{Endpoint, SegmentName};
///
/// let factory = Arc::new(TcpConnectionFactory::default());
/// let client = SegmentClient::new(Endpoint::new("segstore-1.example", 9090), factory);
///
/// let segment = SegmentName::new("orders/0");
/// client.create_segment(&segment)?;
///
/// let stream = client.open_for_append(&segment, OutputStreamConfig::default());
/// let completion = Completion::new();
/// stream.write(Bytes::from_static(b"event"), completion.clone())?;
/// completion.wait()?;
/// ```
pub struct SegmentClient {
    endpoint: Endpoint,
    factory: Arc<dyn ConnectionFactory>,
}

/// Single-reply processor for segment creation.
struct CreateSegmentProcessor {
    result: Arc<Promise<ClientResult<bool>>>,
}

impl ReplyProcessor for CreateSegmentProcessor {
    fn segment_created(&self, _reply: SegmentCreated) {
        self.result.set(Ok(true));
    }

    fn segment_already_exists(&self, _reply: SegmentAlreadyExists) {
        self.result.set(Ok(false));
    }

    fn wrong_host(&self, _reply: WrongHost) {
        self.result
            .set(Err(ClientError::Unsupported("wrong-host redirection")));
    }

    fn unhandled(&self, reply: Reply) {
        self.result
            .set(Err(ClientError::ProtocolViolation(reply.kind())));
    }

    fn connection_dropped(&self) {
        self.result
            .set(Err(ClientError::Transport("connection dropped".into())));
    }
}

impl SegmentClient {
    pub fn new(endpoint: Endpoint, factory: Arc<dyn ConnectionFactory>) -> Self {
        Self { endpoint, factory }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Creates `segment` on the endpoint.
    ///
    /// Returns `true` when the segment was created, `false` when it already
    /// existed. Any other reply or a transport failure is an error.
    pub fn create_segment(&self, segment: &SegmentName) -> ClientResult<bool> {
        let result = Arc::new(Promise::new());
        let processor: Arc<dyn ReplyProcessor> = Arc::new(CreateSegmentProcessor {
            result: Arc::clone(&result),
        });

        let connection = self.factory.establish(&self.endpoint, processor)?;
        let request = Request::CreateSegment(CreateSegment {
            segment: segment.clone(),
        });
        if let Err(error) = connection.send(&request) {
            connection.close();
            return Err(error);
        }

        let outcome = result.wait();
        connection.close();
        outcome?
    }

    /// Opens `segment` for streaming append with a fresh writer id.
    ///
    /// The stream connects eagerly; an initial connect failure is
    /// suppressed and recovered on the first write.
    pub fn open_for_append(
        &self,
        segment: &SegmentName,
        config: OutputStreamConfig,
    ) -> SegmentOutputStream {
        let stream = SegmentOutputStream::new(
            Arc::clone(&self.factory),
            self.endpoint.clone(),
            WriterId::mint(),
            segment.clone(),
            config,
        );
        if let Err(error) = stream.initial_connect() {
            warn!(
                segment = %segment,
                error = %error,
                "initial connection attempt failed; deferring to first write"
            );
        }
        stream
    }

    /// Opens `segment` for sequential read.
    pub fn open_for_read(
        &self,
        segment: &SegmentName,
        config: InputStreamConfig,
    ) -> SegmentInputStream {
        SegmentInputStream::new(
            Arc::clone(&self.factory),
            self.endpoint.clone(),
            segment.clone(),
            config,
        )
    }

    /// Transactional append is not implemented by this client version.
    pub fn open_transaction_for_append(
        &self,
        _segment: &SegmentName,
        _batch: BatchId,
    ) -> ClientResult<SegmentOutputStream> {
        Err(ClientError::Unsupported("transactional append"))
    }

    /// Existence probes need a wire reply this protocol version does not
    /// carry.
    pub fn segment_exists(&self, _segment: &SegmentName) -> ClientResult<bool> {
        Err(ClientError::Unsupported("segment existence probe"))
    }
}
