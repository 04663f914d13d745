//! Blocking synchronization primitives for the append path.
//!
//! Two building blocks that `std::sync` does not provide directly:
//!
//! - [`ReusableLatch`]: a manual-reset event. `wait` blocks until the latch
//!   is raised; a raised latch stays raised (unblocking current and future
//!   waiters) until `reset`. Distinct from a one-shot promise because it is
//!   re-armed on every reconnect.
//! - [`Completion`]: a single-shot result handle for one append; settable
//!   once, first settle wins.
//!
//! Both map a poisoned lock to [`ClientError::Interrupted`]: the thread that
//! held the lock died mid-operation, so the waiter's state is unknown.

use std::sync::{Arc, Condvar, Mutex};

use crate::error::{ClientError, ClientResult};

// ============================================================================
// Reusable latch
// ============================================================================

/// A manual-reset event, reused across reconnects.
#[derive(Debug)]
pub(crate) struct ReusableLatch {
    raised: Mutex<bool>,
    cond: Condvar,
}

impl ReusableLatch {
    pub(crate) fn new(raised: bool) -> Self {
        Self {
            raised: Mutex::new(raised),
            cond: Condvar::new(),
        }
    }

    /// Blocks until the latch is raised.
    pub(crate) fn wait(&self) -> ClientResult<()> {
        let mut raised = self.raised.lock().map_err(|_| ClientError::Interrupted)?;
        while !*raised {
            raised = self.cond.wait(raised).map_err(|_| ClientError::Interrupted)?;
        }
        Ok(())
    }

    /// Raises the latch, unblocking all current and future waiters.
    pub(crate) fn raise(&self) {
        if let Ok(mut raised) = self.raised.lock() {
            *raised = true;
            self.cond.notify_all();
        }
    }

    /// Lowers the latch so subsequent `wait` calls block again.
    pub(crate) fn reset(&self) {
        if let Ok(mut raised) = self.raised.lock() {
            *raised = false;
        }
    }

    #[cfg(test)]
    pub(crate) fn is_raised(&self) -> bool {
        *self.raised.lock().expect("latch poisoned")
    }
}

// ============================================================================
// Completion
// ============================================================================

#[derive(Debug)]
struct CompletionInner {
    result: Mutex<Option<ClientResult<()>>>,
    cond: Condvar,
}

/// The durability handle for one append.
///
/// Created by the caller and handed to
/// [`SegmentOutputStream::write`](crate::SegmentOutputStream::write); settles
/// `Ok` once the server has durably committed the append, or with the error
/// that terminated the stream. Clones share the same state.
#[derive(Debug, Clone)]
pub struct Completion {
    inner: Arc<CompletionInner>,
}

impl Completion {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CompletionInner {
                result: Mutex::new(None),
                cond: Condvar::new(),
            }),
        }
    }

    /// Blocks until the append settles.
    pub fn wait(&self) -> ClientResult<()> {
        let mut result = self
            .inner
            .result
            .lock()
            .map_err(|_| ClientError::Interrupted)?;
        loop {
            if let Some(outcome) = result.as_ref() {
                return outcome.clone();
            }
            result = self
                .inner
                .cond
                .wait(result)
                .map_err(|_| ClientError::Interrupted)?;
        }
    }

    /// Returns the settled outcome without blocking, or `None` while the
    /// append is still in flight.
    pub fn peek(&self) -> Option<ClientResult<()>> {
        self.inner.result.lock().ok().and_then(|r| r.clone())
    }

    pub fn is_settled(&self) -> bool {
        self.inner
            .result
            .lock()
            .map(|r| r.is_some())
            .unwrap_or(false)
    }

    /// Settles the completion; the first settle wins and later ones are
    /// ignored.
    pub(crate) fn settle(&self, outcome: ClientResult<()>) {
        if let Ok(mut result) = self.inner.result.lock() {
            if result.is_none() {
                *result = Some(outcome);
                self.inner.cond.notify_all();
            }
        }
    }
}

impl Default for Completion {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// One-shot promise
// ============================================================================

/// A settable-once cell for single-reply exchanges (segment creation, reads).
#[derive(Debug)]
pub(crate) struct Promise<T> {
    value: Mutex<Option<T>>,
    cond: Condvar,
}

impl<T: Clone> Promise<T> {
    pub(crate) fn new() -> Self {
        Self {
            value: Mutex::new(None),
            cond: Condvar::new(),
        }
    }

    /// Fulfils the promise; first value wins.
    pub(crate) fn set(&self, value: T) {
        if let Ok(mut slot) = self.value.lock() {
            if slot.is_none() {
                *slot = Some(value);
                self.cond.notify_all();
            }
        }
    }

    /// Blocks until the promise is fulfilled.
    pub(crate) fn wait(&self) -> ClientResult<T> {
        let mut slot = self.value.lock().map_err(|_| ClientError::Interrupted)?;
        loop {
            if let Some(value) = slot.as_ref() {
                return Ok(value.clone());
            }
            slot = self
                .cond
                .wait(slot)
                .map_err(|_| ClientError::Interrupted)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn latch_blocks_until_raised() {
        let latch = Arc::new(ReusableLatch::new(false));
        let waiter = {
            let latch = Arc::clone(&latch);
            thread::spawn(move || latch.wait())
        };

        thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished());

        latch.raise();
        waiter.join().unwrap().unwrap();
    }

    #[test]
    fn raised_latch_is_sticky_until_reset() {
        let latch = ReusableLatch::new(true);
        latch.wait().unwrap();
        latch.wait().unwrap();

        latch.reset();
        assert!(!latch.is_raised());

        latch.raise();
        latch.wait().unwrap();
    }

    #[test]
    fn completion_first_settle_wins() {
        let completion = Completion::new();
        completion.settle(Ok(()));
        completion.settle(Err(ClientError::Interrupted));

        assert_eq!(completion.wait(), Ok(()));
        assert_eq!(completion.peek(), Some(Ok(())));
    }

    #[test]
    fn completion_unblocks_waiter() {
        let completion = Completion::new();
        let waiter = {
            let completion = completion.clone();
            thread::spawn(move || completion.wait())
        };

        thread::sleep(Duration::from_millis(20));
        assert!(!completion.is_settled());

        completion.settle(Ok(()));
        waiter.join().unwrap().unwrap();
    }

    #[test]
    fn promise_delivers_value_to_waiter() {
        let promise = Arc::new(Promise::new());
        let waiter = {
            let promise = Arc::clone(&promise);
            thread::spawn(move || promise.wait())
        };

        promise.set(7u32);
        promise.set(8u32);
        assert_eq!(waiter.join().unwrap().unwrap(), 7);
    }
}
