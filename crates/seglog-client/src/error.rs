//! Client error types.

use seglog_types::{Endpoint, SegmentName};
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by client operations.
///
/// The enum is `Clone` because a single failure fans out: it is recorded as
/// the connection's `last_error`, delivered to every in-flight completion,
/// and returned to whichever caller observes it first.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The segment was sealed server-side; the stream is permanently
    /// read-only.
    #[error("segment {0} is sealed")]
    Sealed(SegmentName),

    /// The server rejected a segment name or batch id.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The connection broke or could not be established. Recoverable by
    /// reconnecting; the stream handles this internally.
    #[error("transport error: {0}")]
    Transport(String),

    /// Reconnect attempts were exhausted.
    #[error("unable to reach {endpoint} after {attempts} attempts")]
    Unavailable { endpoint: Endpoint, attempts: u32 },

    /// A blocked wait was torn down because a peer thread died mid-operation.
    /// Treat the stream state as unknown: reconnect or close.
    #[error("interrupted while waiting")]
    Interrupted,

    /// Operation on a stream that is already closed.
    #[error("illegal state: {0}")]
    IllegalState(&'static str),

    /// The operation is not implemented by this client version.
    #[error("unsupported: {0}")]
    Unsupported(&'static str),

    /// The server sent a reply variant this channel does not expect.
    #[error("protocol violation: unexpected {0} reply")]
    ProtocolViolation(&'static str),
}

impl ClientError {
    /// True when a reconnect may clear the condition.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_errors_are_retryable() {
        assert!(ClientError::Transport("broken pipe".into()).is_retryable());
        assert!(!ClientError::Sealed(SegmentName::new("s")).is_retryable());
        assert!(!ClientError::Unavailable {
            endpoint: Endpoint::new("host", 1),
            attempts: 5
        }
        .is_retryable());
        assert!(!ClientError::Interrupted.is_retryable());
    }

    #[test]
    fn display_names_the_segment() {
        let err = ClientError::Sealed(SegmentName::new("orders/0"));
        assert_eq!(err.to_string(), "segment orders/0 is sealed");
    }
}
