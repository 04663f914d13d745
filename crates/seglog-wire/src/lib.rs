//! # seglog-wire: Wire protocol for the segment append path
//!
//! This crate defines the typed commands exchanged between the seglog client
//! and a segment store, and the frame codec that carries them.
//!
//! ## Frame format
//!
//! ```text
//! ┌─────────┬─────────┬──────────┬──────────┬──────────────────┐
//! │ Magic   │ Version │ Length   │ Checksum │     Payload      │
//! │ (4 B)   │ (2 B)   │ (4 B)    │ (4 B)    │     (var)        │
//! └─────────┴─────────┴──────────┴──────────┴──────────────────┘
//! ```
//!
//! - **Magic**: `0x534C4F47` ("SLOG")
//! - **Version**: protocol version (currently 1)
//! - **Length**: payload length in bytes (max 8 MiB)
//! - **Checksum**: CRC32 of the payload
//! - **Payload**: bincode-encoded [`Request`] or [`Reply`]
//!
//! ## Message model
//!
//! The protocol is not request/response: the server pushes replies in its
//! own order on the connection and the client demultiplexes them by
//! variant. Appends in particular are acknowledged asynchronously and
//! cumulatively via [`DataAppended`] ack levels.

mod error;
mod frame;
mod message;

pub use error::{WireError, WireResult};
pub use frame::{Frame, FrameHeader, HEADER_LEN, MAGIC, MAX_FRAME_PAYLOAD, WIRE_VERSION};
pub use message::{
    AppendData, AppendSetup, CreateSegment, DataAppended, NoSuchBatch, NoSuchSegment, ReadSegment,
    Reply, Request, SegmentAlreadyExists, SegmentCreated, SegmentIsSealed, SegmentRead,
    SetupAppend, WrongHost,
};
