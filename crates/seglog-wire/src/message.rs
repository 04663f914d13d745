//! Typed wire commands for the segment append protocol.
//!
//! Requests flow client → server, replies flow server → client. Replies are
//! not matched to requests by id: the server pushes them in its own order
//! and the client demultiplexes by variant.

use bytes::Bytes;
use seglog_types::{BatchId, Endpoint, SegmentName, WriterId};
use serde::{Deserialize, Serialize};

use crate::error::{WireError, WireResult};
use crate::frame::Frame;

// ============================================================================
// Requests
// ============================================================================

/// A client request to the segment store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    /// Create a new segment.
    CreateSegment(CreateSegment),
    /// Begin an append session on a segment.
    SetupAppend(SetupAppend),
    /// Append payload bytes at a connection offset.
    AppendData(AppendData),
    /// Prompt the server to flush pending acks.
    KeepAlive,
    /// Read a range of segment bytes.
    ReadSegment(ReadSegment),
}

impl Request {
    /// Encodes the request into a frame.
    pub fn to_frame(&self) -> WireResult<Frame> {
        let payload = bincode::serialize(self).map_err(|e| WireError::Encode(e.to_string()))?;
        Ok(Frame::new(Bytes::from(payload)))
    }

    /// Decodes a request from a frame.
    pub fn from_frame(frame: &Frame) -> WireResult<Self> {
        bincode::deserialize(&frame.payload).map_err(|e| WireError::Decode(e.to_string()))
    }
}

/// Create a new segment with the given name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSegment {
    pub segment: SegmentName,
}

/// Open an append session for `writer_id` on `segment`.
///
/// The server answers with [`AppendSetup`] carrying the highest connection
/// offset it has durably committed for this writer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupAppend {
    pub writer_id: WriterId,
    pub segment: SegmentName,
}

/// Append `data` such that the writer's cumulative payload length after this
/// append equals `offset`.
///
/// `(writer_id, offset)` is the server's dedup key; resending an
/// already-committed tuple is a no-op on the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppendData {
    pub writer_id: WriterId,
    pub offset: u64,
    pub data: Bytes,
}

/// Read up to `suggested_length` bytes of `segment` starting at `offset`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadSegment {
    pub segment: SegmentName,
    pub offset: u64,
    pub suggested_length: u32,
}

// ============================================================================
// Replies
// ============================================================================

/// A server reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Reply {
    /// The segment is owned by a different host.
    WrongHost(WrongHost),
    /// The segment has been sealed and accepts no more appends.
    SegmentIsSealed(SegmentIsSealed),
    /// No segment with the requested name exists.
    NoSuchSegment(NoSuchSegment),
    /// No batch with the requested id exists.
    NoSuchBatch(NoSuchBatch),
    /// Segment creation raced with an existing segment.
    SegmentAlreadyExists(SegmentAlreadyExists),
    /// Segment creation succeeded.
    SegmentCreated(SegmentCreated),
    /// Append session established; carries the server's ack level.
    AppendSetup(AppendSetup),
    /// Appends up to an offset are durable.
    DataAppended(DataAppended),
    /// A range of segment bytes.
    SegmentRead(SegmentRead),
}

impl Reply {
    /// Encodes the reply into a frame.
    pub fn to_frame(&self) -> WireResult<Frame> {
        let payload = bincode::serialize(self).map_err(|e| WireError::Encode(e.to_string()))?;
        Ok(Frame::new(Bytes::from(payload)))
    }

    /// Decodes a reply from a frame.
    pub fn from_frame(frame: &Frame) -> WireResult<Self> {
        bincode::deserialize(&frame.payload).map_err(|e| WireError::Decode(e.to_string()))
    }

    /// Short variant name, for logs and protocol-violation reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Reply::WrongHost(_) => "WrongHost",
            Reply::SegmentIsSealed(_) => "SegmentIsSealed",
            Reply::NoSuchSegment(_) => "NoSuchSegment",
            Reply::NoSuchBatch(_) => "NoSuchBatch",
            Reply::SegmentAlreadyExists(_) => "SegmentAlreadyExists",
            Reply::SegmentCreated(_) => "SegmentCreated",
            Reply::AppendSetup(_) => "AppendSetup",
            Reply::DataAppended(_) => "DataAppended",
            Reply::SegmentRead(_) => "SegmentRead",
        }
    }
}

/// The addressed host does not own the segment; `correct_host` does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrongHost {
    pub segment: SegmentName,
    pub correct_host: Endpoint,
}

/// The segment was sealed server-side; it is read-only from now on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentIsSealed {
    pub segment: SegmentName,
}

/// The named segment does not exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoSuchSegment {
    pub segment: SegmentName,
}

/// The referenced batch does not exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoSuchBatch {
    pub batch: BatchId,
}

/// A segment with this name already exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentAlreadyExists {
    pub segment: SegmentName,
}

/// Segment creation succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentCreated {
    pub segment: SegmentName,
}

/// Answer to [`SetupAppend`].
///
/// `ack_level` is the highest connection offset the server has durably
/// committed for this writer; everything at or below it is already safe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendSetup {
    pub writer_id: WriterId,
    pub segment: SegmentName,
    pub ack_level: u64,
}

/// Everything at or below `ack_level` is durable for this writer.
///
/// Ack levels are monotonically non-decreasing per writer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataAppended {
    pub writer_id: WriterId,
    pub ack_level: u64,
}

/// Answer to [`ReadSegment`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentRead {
    pub segment: SegmentName,
    pub offset: u64,
    /// True when `data` ends at the seal point of a sealed segment.
    pub end_of_segment: bool,
    pub data: Bytes,
}

#[cfg(test)]
mod message_tests {
    use super::*;

    #[test]
    fn request_survives_frame_roundtrip() {
        let request = Request::AppendData(AppendData {
            writer_id: WriterId::mint(),
            offset: 42,
            data: Bytes::from_static(b"payload"),
        });

        let frame = request.to_frame().unwrap();
        let decoded = Request::from_frame(&frame).unwrap();

        assert_eq!(decoded, request);
    }

    #[test]
    fn reply_survives_frame_roundtrip() {
        let reply = Reply::AppendSetup(AppendSetup {
            writer_id: WriterId::mint(),
            segment: SegmentName::new("s1"),
            ack_level: 8,
        });

        let frame = reply.to_frame().unwrap();
        let decoded = Reply::from_frame(&frame).unwrap();

        assert_eq!(decoded, reply);
    }

    #[test]
    fn keep_alive_has_empty_body() {
        let frame = Request::KeepAlive.to_frame().unwrap();
        let decoded = Request::from_frame(&frame).unwrap();
        assert_eq!(decoded, Request::KeepAlive);
    }

    #[test]
    fn reply_kind_names_variant() {
        let reply = Reply::SegmentIsSealed(SegmentIsSealed {
            segment: SegmentName::new("s1"),
        });
        assert_eq!(reply.kind(), "SegmentIsSealed");
    }
}
