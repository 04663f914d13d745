//! Frame encoding and decoding.
//!
//! Every wire message travels inside a frame: a fixed-size header followed
//! by the bincode-encoded message payload. The header carries a CRC32 of
//! the payload so a torn or corrupted stream is detected before decoding.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{WireError, WireResult};

/// Protocol magic: "SLOG" in big-endian.
pub const MAGIC: u32 = 0x534c_4f47;

/// Wire protocol version spoken by this crate.
pub const WIRE_VERSION: u16 = 1;

/// Size of the frame header in bytes (magic + version + length + checksum).
pub const HEADER_LEN: usize = 14;

/// Largest payload a single frame may carry (8 MiB).
///
/// Appends larger than this are the transport's problem to fragment; the
/// limit guards the decoder against absurd length fields.
pub const MAX_FRAME_PAYLOAD: u32 = 8 * 1024 * 1024;

/// Fixed-size frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub magic: u32,
    pub version: u16,
    pub length: u32,
    pub checksum: u32,
}

impl FrameHeader {
    fn for_payload(payload: &[u8]) -> Self {
        Self {
            magic: MAGIC,
            version: WIRE_VERSION,
            length: payload.len() as u32,
            checksum: crc32fast::hash(payload),
        }
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.magic);
        buf.put_u16(self.version);
        buf.put_u32(self.length);
        buf.put_u32(self.checksum);
    }

    fn decode(buf: &mut impl Buf) -> Option<Self> {
        if buf.remaining() < HEADER_LEN {
            return None;
        }
        Some(Self {
            magic: buf.get_u32(),
            version: buf.get_u16(),
            length: buf.get_u32(),
            checksum: buf.get_u32(),
        })
    }

    fn validate(&self) -> WireResult<()> {
        if self.magic != MAGIC {
            return Err(WireError::BadMagic(self.magic));
        }
        if self.version != WIRE_VERSION {
            return Err(WireError::UnsupportedVersion(self.version));
        }
        if self.length > MAX_FRAME_PAYLOAD {
            return Err(WireError::FrameTooLarge {
                size: self.length,
                limit: MAX_FRAME_PAYLOAD,
            });
        }
        Ok(())
    }
}

/// A complete frame: header plus payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Bytes,
}

impl Frame {
    /// Builds a frame around a payload, computing the header.
    pub fn new(payload: Bytes) -> Self {
        let header = FrameHeader::for_payload(&payload);
        Self { header, payload }
    }

    /// Appends the encoded frame to `buf`.
    pub fn encode(&self, buf: &mut BytesMut) {
        self.header.encode(buf);
        buf.put_slice(&self.payload);
    }

    /// Encodes the frame into a fresh buffer.
    pub fn encode_to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.payload.len());
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Tries to decode one frame from the front of `buf`.
    ///
    /// Returns `Ok(None)` when `buf` does not yet hold a complete frame; the
    /// buffer is left untouched so the caller can read more bytes and retry.
    /// On success the frame's bytes are consumed from `buf`.
    pub fn decode(buf: &mut BytesMut) -> WireResult<Option<Self>> {
        if buf.len() < HEADER_LEN {
            return Ok(None);
        }

        let header = {
            let mut peek = buf.as_ref();
            FrameHeader::decode(&mut peek).expect("length checked above")
        };
        header.validate()?;

        let total = HEADER_LEN + header.length as usize;
        if buf.len() < total {
            return Ok(None);
        }

        buf.advance(HEADER_LEN);
        let payload = buf.split_to(header.length as usize).freeze();

        let actual = crc32fast::hash(&payload);
        if actual != header.checksum {
            return Err(WireError::ChecksumMismatch {
                expected: header.checksum,
                actual,
            });
        }

        Ok(Some(Self { header, payload }))
    }
}

#[cfg(test)]
mod frame_tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let frame = Frame::new(Bytes::from_static(b"segment bytes"));
        let encoded = frame.encode_to_bytes();

        let mut buf = BytesMut::from(&encoded[..]);
        let decoded = Frame::decode(&mut buf).unwrap().unwrap();

        assert_eq!(decoded, frame);
        assert!(buf.is_empty());
    }

    #[test]
    fn short_header_is_not_an_error() {
        let mut buf = BytesMut::from(&[0u8; HEADER_LEN - 1][..]);
        assert!(Frame::decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), HEADER_LEN - 1);
    }

    #[test]
    fn short_payload_is_not_an_error() {
        let encoded = Frame::new(Bytes::from_static(b"abcd")).encode_to_bytes();
        let mut buf = BytesMut::from(&encoded[..encoded.len() - 1]);
        assert!(Frame::decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn bad_magic_is_fatal() {
        let mut buf = BytesMut::new();
        buf.put_u32(0x0BAD_F00D);
        buf.put_u16(WIRE_VERSION);
        buf.put_u32(0);
        buf.put_u32(0);

        assert!(matches!(
            Frame::decode(&mut buf),
            Err(WireError::BadMagic(0x0BAD_F00D))
        ));
    }

    #[test]
    fn corrupted_payload_is_detected() {
        let encoded = Frame::new(Bytes::from_static(b"abcd")).encode_to_bytes();
        let mut bytes = encoded.to_vec();
        *bytes.last_mut().unwrap() ^= 0xFF;

        let mut buf = BytesMut::from(&bytes[..]);
        assert!(matches!(
            Frame::decode(&mut buf),
            Err(WireError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn oversized_length_is_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u32(MAGIC);
        buf.put_u16(WIRE_VERSION);
        buf.put_u32(MAX_FRAME_PAYLOAD + 1);
        buf.put_u32(0);

        assert!(matches!(
            Frame::decode(&mut buf),
            Err(WireError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn two_frames_decode_in_order() {
        let first = Frame::new(Bytes::from_static(b"one"));
        let second = Frame::new(Bytes::from_static(b"two"));

        let mut buf = BytesMut::new();
        first.encode(&mut buf);
        second.encode(&mut buf);

        assert_eq!(Frame::decode(&mut buf).unwrap().unwrap().payload, first.payload);
        assert_eq!(Frame::decode(&mut buf).unwrap().unwrap().payload, second.payload);
        assert!(Frame::decode(&mut buf).unwrap().is_none());
    }
}
