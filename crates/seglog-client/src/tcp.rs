//! TCP transport.
//!
//! One blocking `TcpStream` per connection. Sends are framed and written
//! inline under a small writer lock, bounded by the socket write timeout.
//! A dedicated reader thread decodes frames as they arrive and dispatches
//! each reply to the connection's processor, so replies reach the client in
//! server-send order on a transport-owned thread.

use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use bytes::BytesMut;
use seglog_types::Endpoint;
use seglog_wire::{Frame, Reply, Request, HEADER_LEN, MAX_FRAME_PAYLOAD};
use tracing::{debug, warn};

use crate::error::{ClientError, ClientResult};
use crate::reply::ReplyProcessor;
use crate::transport::{ClientConnection, ConnectionFactory};

/// Socket options for [`TcpConnectionFactory`].
#[derive(Debug, Clone)]
pub struct TcpConfig {
    pub connect_timeout: Duration,
    /// Bounds how long a send may block on a congested socket.
    pub write_timeout: Option<Duration>,
    pub nodelay: bool,
    /// Size of the reader thread's socket read buffer.
    pub read_buffer_size: usize,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            write_timeout: Some(Duration::from_secs(30)),
            nodelay: true,
            read_buffer_size: 64 * 1024,
        }
    }
}

/// [`ConnectionFactory`] over plain TCP.
#[derive(Debug, Default)]
pub struct TcpConnectionFactory {
    config: TcpConfig,
}

impl TcpConnectionFactory {
    pub fn new(config: TcpConfig) -> Self {
        Self { config }
    }
}

impl ConnectionFactory for TcpConnectionFactory {
    fn establish(
        &self,
        endpoint: &Endpoint,
        processor: Arc<dyn ReplyProcessor>,
    ) -> ClientResult<Arc<dyn ClientConnection>> {
        let stream = connect(endpoint, &self.config)?;
        stream
            .set_nodelay(self.config.nodelay)
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        stream
            .set_write_timeout(self.config.write_timeout)
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        let reader = stream
            .try_clone()
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let closed = Arc::new(AtomicBool::new(false));

        let connection = Arc::new(TcpClientConnection {
            peer: endpoint.clone(),
            writer: Mutex::new(stream),
            closed: Arc::clone(&closed),
        });

        let peer = endpoint.clone();
        let buffer_size = self.config.read_buffer_size;
        thread::Builder::new()
            .name(format!("seglog-reader-{peer}"))
            .spawn(move || read_loop(&peer, reader, buffer_size, &processor, &closed))
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        debug!(endpoint = %endpoint, "connection established");
        Ok(connection)
    }
}

/// Resolves the endpoint and connects with the configured timeout, trying
/// each resolved address in turn.
fn connect(endpoint: &Endpoint, config: &TcpConfig) -> ClientResult<TcpStream> {
    let addrs = (endpoint.host(), endpoint.port())
        .to_socket_addrs()
        .map_err(|e| ClientError::Transport(format!("resolving {endpoint}: {e}")))?;

    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, config.connect_timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_error = Some(e),
        }
    }
    Err(ClientError::Transport(match last_error {
        Some(e) => format!("connecting to {endpoint}: {e}"),
        None => format!("{endpoint} resolved to no addresses"),
    }))
}

/// After the decode loop drains every complete frame, the leftover bytes
/// are at most one incomplete frame; a backlog beyond that is a broken or
/// hostile peer.
const MAX_BUFFERED_BYTES: usize = HEADER_LEN + MAX_FRAME_PAYLOAD as usize;

/// Reads frames off the socket until EOF, error, or deliberate close.
fn read_loop(
    peer: &Endpoint,
    mut stream: TcpStream,
    buffer_size: usize,
    processor: &Arc<dyn ReplyProcessor>,
    closed: &AtomicBool,
) {
    let mut chunk = vec![0u8; buffer_size];
    let mut buf = BytesMut::with_capacity(buffer_size);

    loop {
        let n = match stream.read(&mut chunk) {
            Ok(0) => {
                debug!(endpoint = %peer, "server closed connection");
                break;
            }
            Ok(n) => n,
            Err(e) => {
                if !closed.load(Ordering::SeqCst) {
                    warn!(endpoint = %peer, error = %e, "read error");
                }
                break;
            }
        };
        buf.extend_from_slice(&chunk[..n]);

        loop {
            match Frame::decode(&mut buf) {
                Ok(Some(frame)) => match Reply::from_frame(&frame) {
                    Ok(reply) => processor.process(reply),
                    Err(e) => {
                        warn!(endpoint = %peer, error = %e, "undecodable reply");
                        report_dropped(processor, closed);
                        return;
                    }
                },
                Ok(None) => break,
                Err(e) => {
                    warn!(endpoint = %peer, error = %e, "corrupt frame");
                    report_dropped(processor, closed);
                    return;
                }
            }
        }

        if buf.len() > MAX_BUFFERED_BYTES {
            warn!(endpoint = %peer, buffered = buf.len(), "reply backlog too large");
            report_dropped(processor, closed);
            return;
        }
    }
    report_dropped(processor, closed);
}

/// Reports the loss to the processor once, unless the client closed the
/// connection itself.
fn report_dropped(processor: &Arc<dyn ReplyProcessor>, closed: &AtomicBool) {
    if !closed.swap(true, Ordering::SeqCst) {
        processor.connection_dropped();
    }
}

struct TcpClientConnection {
    peer: Endpoint,
    writer: Mutex<TcpStream>,
    closed: Arc<AtomicBool>,
}

impl ClientConnection for TcpClientConnection {
    fn send(&self, request: &Request) -> ClientResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ClientError::Transport(format!(
                "connection to {} is closed",
                self.peer
            )));
        }
        let encoded = request
            .to_frame()
            .map_err(|e| ClientError::Transport(e.to_string()))?
            .encode_to_bytes();

        let mut writer = self
            .writer
            .lock()
            .map_err(|_| ClientError::Transport("writer lock poisoned".into()))?;
        writer
            .write_all(&encoded)
            .and_then(|()| writer.flush())
            .map_err(|e| ClientError::Transport(format!("sending to {}: {e}", self.peer)))
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(endpoint = %self.peer, "closing connection");
            if let Ok(writer) = self.writer.lock() {
                let _ = writer.shutdown(Shutdown::Both);
            }
        }
    }
}

impl Drop for TcpClientConnection {
    fn drop(&mut self) {
        self.close();
    }
}
