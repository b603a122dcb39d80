//! In-flight request bookkeeping.
//!
//! [`RequestTable`] maps a [`RequestId`] to the [`PendingRequest`] waiting on
//! it. An entry is inserted when a request is dispatched and removed exactly
//! once, by [`RequestTable::take_and_remove`], in the same critical section
//! that hands it to the completion path. A second completion for the same id
//! therefore finds nothing.

use crate::{
    error::{Error, Result},
    id::RequestId,
    output::Output,
};
use core::fmt;
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    panic::{AssertUnwindSafe, catch_unwind},
};
use tokio::sync::oneshot;

/// Continuation invoked with the result of a request submitted through
/// [`ServiceClient::submit_with`](crate::ServiceClient::submit_with).
pub type Callback = Box<dyn FnOnce(Result<Output>) + Send + 'static>;

enum Slot {
    Channel(oneshot::Sender<Result<Output>>),
    Callback(Callback),
}

/// The completion slot of a single in-flight request.
///
/// Consuming `self` in [`succeed`](Self::succeed) and [`fail`](Self::fail)
/// makes double completion unrepresentable.
pub struct PendingRequest {
    id: RequestId,
    slot: Slot,
}

impl fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = match self.slot {
            Slot::Channel(_) => "channel",
            Slot::Callback(_) => "callback",
        };
        f.debug_struct("PendingRequest")
            .field("id", &self.id)
            .field("slot", &slot)
            .finish()
    }
}

impl PendingRequest {
    pub const fn new(id: RequestId, slot: oneshot::Sender<Result<Output>>) -> Self {
        Self {
            id,
            slot: Slot::Channel(slot),
        }
    }

    /// A request whose result is handed to `callback` on whichever thread
    /// resolves it.
    pub fn with_callback(id: RequestId, callback: Callback) -> Self {
        Self {
            id,
            slot: Slot::Callback(callback),
        }
    }

    pub const fn id(&self) -> RequestId {
        self.id
    }

    /// Delivers the output. Returns `false` if the caller stopped waiting.
    pub fn succeed(self, output: Output) -> bool {
        self.resolve(Ok(output))
    }

    /// Delivers the error. Returns `false` if the caller stopped waiting.
    pub fn fail(self, error: Error) -> bool {
        self.resolve(Err(error))
    }

    /// Delivers `outcome`. Callbacks run inline; a panicking callback is
    /// contained and reported as not delivered.
    pub fn resolve(self, outcome: Result<Output>) -> bool {
        match self.slot {
            Slot::Channel(tx) => tx.send(outcome).is_ok(),
            Slot::Callback(callback) => {
                let delivered = catch_unwind(AssertUnwindSafe(|| callback(outcome))).is_ok();
                #[cfg(feature = "tracing")]
                {
                    if !delivered {
                        tracing::error!("Completion callback for {} panicked", self.id);
                    }
                }
                delivered
            }
        }
    }
}

/// Thread-safe map from request id to its pending completion.
///
/// Safe to mutate concurrently from caller tasks and from whatever thread the
/// engine delivers completions on. Critical sections are a single map
/// operation, so a synchronous lock is used.
#[derive(Debug, Default)]
pub struct RequestTable {
    entries: Mutex<HashMap<RequestId, PendingRequest>>,
}

impl RequestTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pending request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateId`] if the id is already present. The
    /// existing entry is left untouched and the rejected one is dropped.
    pub fn insert(&self, pending: PendingRequest) -> Result<()> {
        let id = pending.id();
        let mut entries = self.entries.lock();
        if entries.contains_key(&id) {
            return Err(Error::DuplicateId { id });
        }
        entries.insert(id, pending);
        Ok(())
    }

    /// Atomically removes and returns the entry for `id`, if present.
    pub fn take_and_remove(&self, id: RequestId) -> Option<PendingRequest> {
        self.entries.lock().remove(&id)
    }

    /// Removes every entry. Used only when the owning session is stopped.
    pub fn drain(&self) -> Vec<PendingRequest> {
        let entries = core::mem::take(&mut *self.entries.lock());
        entries.into_values().collect()
    }

    /// Number of requests currently in flight.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
