//! The in-flight ledger: every append enqueued but not yet acknowledged.
//!
//! The ledger is the one structure shared between caller threads and the
//! reply thread. It is an ordered map from connection offset to the pending
//! append, plus a sticky empty-signal that `flush` blocks on. Keys are
//! strictly increasing and never reused; at any instant the ledger holds
//! exactly the suffix of the writer's byte stream above the server's ack
//! level.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use bytes::Bytes;

use crate::error::{ClientError, ClientResult};
use crate::sync::{Completion, ReusableLatch};

struct PendingAppend {
    data: Bytes,
    // Usually one handle; a zero-length append lands on the offset of its
    // predecessor and rides along on the same entry.
    completions: Vec<Completion>,
}

struct LedgerInner {
    /// Cumulative byte count of every payload enqueued so far.
    write_offset: u64,
    entries: BTreeMap<u64, PendingAppend>,
}

/// Ordered map of un-acknowledged appends, keyed by connection offset.
pub(crate) struct InflightLedger {
    inner: Mutex<LedgerInner>,
    /// Raised while the ledger is empty; reset on enqueue.
    empty: ReusableLatch,
}

impl InflightLedger {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(LedgerInner {
                write_offset: 0,
                entries: BTreeMap::new(),
            }),
            empty: ReusableLatch::new(true),
        }
    }

    fn locked(&self) -> ClientResult<MutexGuard<'_, LedgerInner>> {
        self.inner.lock().map_err(|_| ClientError::Interrupted)
    }

    /// Assigns the next connection offset to `data` and records the append.
    ///
    /// The offset is the writer's cumulative payload length after this
    /// append. The ledger keeps the payload until the entry is acked, so a
    /// reconnect can always retransmit it.
    pub(crate) fn enqueue(&self, data: Bytes, completion: Completion) -> ClientResult<u64> {
        let mut inner = self.locked()?;
        inner.write_offset += data.len() as u64;
        let offset = inner.write_offset;
        self.empty.reset();
        inner
            .entries
            .entry(offset)
            .or_insert_with(|| PendingAppend {
                data,
                completions: Vec::with_capacity(1),
            })
            .completions
            .push(completion);
        Ok(offset)
    }

    /// Drains every entry with `offset <= level` and settles its handles ok.
    ///
    /// Acks are cumulative and monotone, so draining is always a head-prefix
    /// removal; an already-acked level is a no-op. Handles settle before the
    /// empty-signal is raised, so a flush woken by the signal observes every
    /// drained append as resolved.
    pub(crate) fn ack_up_to(&self, level: u64) -> ClientResult<()> {
        let mut inner = self.locked()?;
        let keep = match level.checked_add(1) {
            Some(bound) => inner.entries.split_off(&bound),
            None => BTreeMap::new(),
        };
        let acked = std::mem::replace(&mut inner.entries, keep);
        for entry in acked.into_values() {
            for completion in entry.completions {
                completion.settle(Ok(()));
            }
        }
        if inner.entries.is_empty() {
            self.empty.raise();
        }
        Ok(())
    }

    /// Consistent ascending copy of the outstanding appends, for retransmit.
    pub(crate) fn snapshot(&self) -> ClientResult<Vec<(u64, Bytes)>> {
        let inner = self.locked()?;
        Ok(inner
            .entries
            .iter()
            .map(|(offset, entry)| (*offset, entry.data.clone()))
            .collect())
    }

    /// Blocks until the ledger is empty.
    pub(crate) fn await_empty(&self) -> ClientResult<()> {
        self.empty.wait()
    }

    /// Fails every outstanding handle with `error` and clears the map.
    /// Used when the stream terminates (sealed, invalid segment).
    pub(crate) fn fail_all(&self, error: &ClientError) -> ClientResult<()> {
        let mut inner = self.locked()?;
        for entry in std::mem::take(&mut inner.entries).into_values() {
            for completion in entry.completions {
                completion.settle(Err(error.clone()));
            }
        }
        self.empty.raise();
        Ok(())
    }

    pub(crate) fn is_empty(&self) -> ClientResult<bool> {
        Ok(self.locked()?.entries.is_empty())
    }
}
