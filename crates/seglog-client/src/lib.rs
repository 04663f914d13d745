//! # seglog-client: Client-side append path for a segment store
//!
//! This crate implements the writer side of a distributed append-only log
//! whose storage unit is a named byte **segment**: create segments, append
//! to one with at-most-once delivery and durable ordering, and read one
//! back sequentially.
//!
//! ## Architecture
//!
//! ```text
//! caller ──write──▶ SegmentOutputStream ──▶ InflightLedger ──▶ ClientConnection
//!                        ▲                        ▲                  │
//!                        │ ready-latch            │ ack_up_to        ▼
//!                   ConnectionState ◀── ReplyProcessor ◀── reader thread
//! ```
//!
//! The output stream keeps every un-acknowledged append in an ordered
//! in-flight ledger. When a connection is lost the ledger survives; the
//! reconnect handshake learns the server's ack level, drains what is
//! already durable, and retransmits the rest. The server deduplicates by
//! `(writer id, connection offset)`, so retransmits cannot double-append.
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use bytes::Bytes;
//! use seglog_client::{Completion, OutputStreamConfig, SegmentClient, TcpConnectionFactory};
//! use seglog_types::{Endpoint, SegmentName};
//!
//! let client = SegmentClient::new(
//!     Endpoint::new("segstore-1.example", 9090),
//!     Arc::new(TcpConnectionFactory::default()),
//! );
//!
//! let segment = SegmentName::new("orders/0");
//! client.create_segment(&segment)?;
//!
//! let stream = client.open_for_append(&segment, OutputStreamConfig::default());
//! let completion = Completion::new();
//! stream.write(Bytes::from_static(b"event"), completion.clone())?;
//! stream.flush()?;
//! assert!(completion.is_settled());
//! stream.close()?;
//! ```

mod client;
mod config;
mod error;
mod input;
mod ledger;
mod output;
mod reply;
mod state;
mod sync;
mod tcp;
pub mod transport;

pub use client::SegmentClient;
pub use config::{InputStreamConfig, OutputStreamConfig, RetryPolicy};
pub use error::{ClientError, ClientResult};
pub use input::SegmentInputStream;
pub use output::SegmentOutputStream;
pub use reply::ReplyProcessor;
pub use sync::Completion;
pub use tcp::{TcpConfig, TcpConnectionFactory};
pub use transport::{ClientConnection, ConnectionFactory};
