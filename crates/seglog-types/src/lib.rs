//! # seglog-types: Core types for the seglog client
//!
//! This crate contains the small identifier types shared between the wire
//! protocol and the client:
//! - [`SegmentName`]: the name of a segment on the server
//! - [`WriterId`]: a client-minted UUID identifying one append session
//! - [`BatchId`]: identifier of a server-side batch
//! - [`Endpoint`]: the host/port pair a segment lives on

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Segment name
// ============================================================================

/// Name of a segment: a named, append-only, sealable byte log on the server.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SegmentName(String);

impl SegmentName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for SegmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SegmentName {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for SegmentName {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// ============================================================================
// Writer id
// ============================================================================

/// Identifier of one append session, minted by the client when an output
/// stream is constructed.
///
/// The server tracks ack levels and deduplicates retransmits per writer id,
/// which is what makes retransmitting the whole in-flight window on
/// reconnect safe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct WriterId(Uuid);

impl WriterId {
    /// Mints a fresh random writer id.
    pub fn mint() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Display for WriterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for WriterId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

// ============================================================================
// Batch id
// ============================================================================

/// Identifier of a server-side append batch.
///
/// Batch append is not implemented by this client; the type exists because
/// the server can still reply `NoSuchBatch` and the reply must be decodable.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct BatchId(Uuid);

impl BatchId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }
}

impl Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Endpoint
// ============================================================================

/// Stable identifier of the server hosting a segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
