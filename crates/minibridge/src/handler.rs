//! Completion routing from the engine back to waiting callers.
//!
//! Each `start_service` opens a [`Session`] owning its own [`RequestTable`],
//! and the engine receives a [`CompletionHandler`] bound to that session.
//! `stop_service` closes the session before draining it, which lets the
//! handler tell a straggling completion for an abandoned request (expected,
//! dropped) apart from a completion for an id nobody ever dispatched
//! (a protocol fault).

use crate::{
    error::{EngineError, Error, Result},
    id::RequestId,
    output::Output,
    table::RequestTable,
};
use portable_atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// A single result emitted by the engine.
#[derive(Debug)]
pub struct Completion {
    pub id: RequestId,
    pub outcome: Result<Output, EngineError>,
}

impl Completion {
    pub const fn success(id: RequestId, output: Output) -> Self {
        Self {
            id,
            outcome: Ok(output),
        }
    }

    pub const fn failure(id: RequestId, error: EngineError) -> Self {
        Self {
            id,
            outcome: Err(error),
        }
    }
}

/// The requests dispatched between one start and the matching stop.
#[derive(Debug, Default)]
pub(crate) struct Session {
    table: RequestTable,
    closed: AtomicBool,
}

impl Session {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) const fn table(&self) -> &RequestTable {
        &self.table
    }

    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// The callback the engine invokes for every completion.
///
/// Cheap to clone and safe to call from any thread. The engine should hold on
/// to one for as long as it is running.
#[derive(Debug, Clone)]
pub struct CompletionHandler {
    session: Arc<Session>,
    faults: broadcast::Sender<Error>,
}

impl CompletionHandler {
    pub(crate) const fn new(session: Arc<Session>, faults: broadcast::Sender<Error>) -> Self {
        Self { session, faults }
    }

    /// Resolves the caller waiting on `completion.id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownRequestId`] if no request with that id is
    /// pending in an open session. The fault is also broadcast to
    /// [`ServiceClient::subscribe_faults`] receivers; other pending requests
    /// are unaffected.
    ///
    /// [`ServiceClient::subscribe_faults`]: crate::ServiceClient::subscribe_faults
    pub fn complete(&self, completion: Completion) -> Result<()> {
        let Completion { id, outcome } = completion;

        let Some(pending) = self.session.table().take_and_remove(id) else {
            if self.session.is_closed() {
                #[cfg(feature = "tracing")]
                tracing::debug!("Dropping completion for {id} after service stop");
                return Ok(());
            }

            let fault = Error::UnknownRequestId { id };
            #[cfg(feature = "tracing")]
            tracing::error!("Protocol fault: {fault}");
            // No receivers is fine; the error is still returned to the engine.
            let _ = self.faults.send(fault.clone());
            return Err(fault);
        };

        let _delivered = pending.resolve(outcome.map_err(Error::from));
        #[cfg(feature = "tracing")]
        {
            if !_delivered {
                tracing::debug!("Caller for {id} stopped waiting before completion");
            }
        }
        Ok(())
    }

    /// Returns `true` once the session this handler serves has been stopped.
    pub fn is_closed(&self) -> bool {
        self.session.is_closed()
    }
}
