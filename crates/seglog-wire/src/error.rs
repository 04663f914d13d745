//! Wire protocol error types.

use thiserror::Error;

/// Result type for wire protocol operations.
pub type WireResult<T> = Result<T, WireError>;

/// Errors that can occur while encoding or decoding wire traffic.
#[derive(Debug, Error)]
pub enum WireError {
    /// Frame header does not start with the protocol magic.
    #[error("bad magic: expected 0x534c4f47, got 0x{0:08x}")]
    BadMagic(u32),

    /// Peer speaks a protocol version this client does not.
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u16),

    /// Declared payload length exceeds the frame limit.
    #[error("frame payload of {size} bytes exceeds limit of {limit}")]
    FrameTooLarge { size: u32, limit: u32 },

    /// Payload bytes do not match the header checksum.
    #[error("frame checksum mismatch: header says 0x{expected:08x}, payload is 0x{actual:08x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// Message encoding failed.
    #[error("encode error: {0}")]
    Encode(String),

    /// Message decoding failed.
    #[error("decode error: {0}")]
    Decode(String),
}
