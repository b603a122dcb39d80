//! The boundary to the background computation service.
//!
//! An [`Engine`] accepts fire-and-forget submissions keyed by [`RequestId`]
//! and later reports each result through the [`CompletionHandler`] it was
//! started with, from whatever thread it likes and in whatever order jobs
//! finish.
//!
//! ## Structure
//!
//! - `pool` - [`WorkerPoolEngine`], the built-in multi-threaded engine.
//! - `worker` - the per-thread job loop.
//! - `job` - the unit of work sent to a worker.

mod job;
mod pool;
mod worker;

pub use pool::WorkerPoolEngine;

use crate::{error::EngineError, handler::CompletionHandler, id::RequestId};
use std::sync::Arc;

/// A background minification service.
///
/// ## Contract
///
/// - [`start`](Self::start) is called once per `start_service`, with a fresh
///   handler. The engine must route every completion through it until
///   [`stop`](Self::stop).
/// - Every submission accepted while running is completed exactly once,
///   unless the engine is stopped first.
/// - [`submit`](Self::submit) must not block: it either enqueues the job or
///   rejects it immediately.
pub trait Engine: Send + Sync + 'static {
    /// Begins accepting work, delivering completions to `handler`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Start`] if the engine could not be brought up.
    fn start(&self, handler: CompletionHandler) -> Result<(), EngineError>;

    /// Stops producing completions. Queued and in-flight jobs may be
    /// abandoned; the client fails their callers itself.
    fn stop(&self);

    /// Enqueues `input` for minification under `id`. Ownership of the buffer
    /// passes to the engine, which may reuse it for the output.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotRunning`] if the engine is stopped.
    /// - [`EngineError::QueueFull`] if the job cannot be queued right now.
    fn submit(&self, id: RequestId, input: Vec<u8>) -> Result<(), EngineError>;
}

impl<E: Engine + ?Sized> Engine for Arc<E> {
    fn start(&self, handler: CompletionHandler) -> Result<(), EngineError> {
        (**self).start(handler)
    }

    fn stop(&self) {
        (**self).stop();
    }

    fn submit(&self, id: RequestId, input: Vec<u8>) -> Result<(), EngineError> {
        (**self).submit(id, input)
    }
}
