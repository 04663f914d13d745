//! Connection state shared between public callers and the reply thread.
//!
//! Exactly one connection is current at a time. Replacing it always goes
//! through [`ConnectionState::fail`] (capture old, clear current, raise the
//! ready-latch so waiters observe the failure) followed by
//! [`ConnectionState::install_new`]. The captured connection is closed
//! outside the lock; no transport call ever runs under it.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::warn;

use crate::error::{ClientError, ClientResult};
use crate::sync::ReusableLatch;
use crate::transport::ClientConnection;

struct StateInner {
    connection: Option<Arc<dyn ClientConnection>>,
    /// First failure since the last `install_new`; later ones are dropped.
    last_error: Option<ClientError>,
}

/// Holds the current connection, its readiness latch, and the last failure.
pub(crate) struct ConnectionState {
    inner: Mutex<StateInner>,
    /// Low while a handshake is outstanding; raised when the connection is
    /// ready *or* has failed, so waiters never hang on a dead connection.
    ready: ReusableLatch,
}

impl ConnectionState {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(StateInner {
                connection: None,
                last_error: None,
            }),
            ready: ReusableLatch::new(false),
        }
    }

    fn locked(&self) -> ClientResult<MutexGuard<'_, StateInner>> {
        self.inner.lock().map_err(|_| ClientError::Interrupted)
    }

    /// The current connection, ready or not.
    pub(crate) fn current(&self) -> Option<Arc<dyn ClientConnection>> {
        self.inner.lock().ok().and_then(|inner| inner.connection.clone())
    }

    /// Installs a freshly established connection and re-arms the
    /// ready-latch for its handshake.
    pub(crate) fn install_new(&self, connection: Arc<dyn ClientConnection>) -> ClientResult<()> {
        let mut inner = self.locked()?;
        self.ready.reset();
        inner.last_error = None;
        inner.connection = Some(connection);
        Ok(())
    }

    /// Marks the current connection handshake-complete.
    pub(crate) fn mark_ready(&self) {
        self.ready.raise();
    }

    /// Records a failure and tears down the current connection.
    ///
    /// The first error since `install_new` wins. The latch is raised so
    /// blocked waiters wake up and observe the error instead of hanging.
    pub(crate) fn fail(&self, error: ClientError) {
        warn!(error = %error, "connection failed");
        let old = match self.inner.lock() {
            Ok(mut inner) => {
                if inner.last_error.is_none() {
                    inner.last_error = Some(error);
                }
                inner.connection.take()
            }
            Err(_) => None,
        };
        self.ready.raise();
        if let Some(connection) = old {
            connection.close();
        }
    }

    /// Blocks until the latch is raised, then returns the connection or the
    /// failure that raised it.
    pub(crate) fn await_ready(&self) -> ClientResult<Arc<dyn ClientConnection>> {
        self.ready.wait()?;
        let inner = self.locked()?;
        if let Some(error) = &inner.last_error {
            return Err(error.clone());
        }
        inner
            .connection
            .clone()
            .ok_or_else(|| ClientError::Transport("connection lost".into()))
    }

    /// Closes and forgets the current connection, if any.
    pub(crate) fn release(&self) {
        let old = self.inner.lock().ok().and_then(|mut inner| inner.connection.take());
        if let Some(connection) = old {
            connection.close();
        }
    }
}
