//! Error types for the minification bridge.
//!
//! Two enums live here. [`EngineError`] is what an [`Engine`] (or the
//! [`Minifier`] it runs) reports: a failed transform, a rejected submission, a
//! failed start. [`Error`] is what callers of the
//! [`ServiceClient`] observe, and wraps [`EngineError`] for the per-request
//! case.
//!
//! ## Error Cases
//! - `ServiceNotStarted`: `minify` was called before `start_service`.
//! - `ServiceStopped`: the request was abandoned by `stop_service`.
//! - `DuplicateId`: the id allocator handed out a live id twice.
//! - `UnknownRequestId`: the engine completed an id with no pending request.
//! - `Engine`: the engine failed this one request (or this one call).
//! - `Cancelled` / `Timeout`: the caller stopped waiting.
//!
//! `DuplicateId` and `UnknownRequestId` are protocol faults. They are never
//! retried and are additionally broadcast to fault subscribers.
//!
//! [`Engine`]: crate::Engine
//! [`Minifier`]: crate::Minifier
//! [`ServiceClient`]: crate::ServiceClient

use crate::id::RequestId;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Unified error type for the service client.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// `minify` was called while the service is stopped.
    #[error("Service is not started")]
    ServiceNotStarted,

    /// The service was stopped before this request completed.
    #[error("Service stopped before the request completed")]
    ServiceStopped,

    /// An identifier was inserted into the request table twice.
    #[error("Duplicate request id {id}")]
    DuplicateId { id: RequestId },

    /// A completion arrived for an identifier with no pending request.
    #[error("Completion for unknown request id {id}")]
    UnknownRequestId { id: RequestId },

    /// The engine reported a failure.
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// The caller cancelled its wait for this request.
    #[error("Request {id} cancelled by caller")]
    Cancelled { id: RequestId },

    /// The caller's deadline elapsed before the request completed.
    #[error("Request {id} timed out")]
    Timeout { id: RequestId },
}

impl Error {
    /// Returns `true` for errors that indicate the engine and client have
    /// desynchronized. These must be escalated, not retried.
    pub const fn is_protocol_fault(&self) -> bool {
        matches!(
            self,
            Self::DuplicateId { .. } | Self::UnknownRequestId { .. }
        )
    }
}

/// Failures reported across the engine boundary.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum EngineError {
    /// The transform rejected its input (e.g. malformed source).
    #[error("Transform failed: {message}")]
    Transform { message: String },

    /// An output claimed more valid bytes than its buffer holds.
    #[error("Valid length {valid_len} exceeds buffer length {capacity}")]
    InvalidLength { valid_len: usize, capacity: usize },

    /// The engine is not accepting work.
    #[error("Engine is not running")]
    NotRunning,

    /// The engine's queue is full; the submission was not accepted.
    #[error("Engine queue is full")]
    QueueFull,

    /// The engine could not be started.
    #[error("Engine failed to start: {reason}")]
    Start { reason: String },
}

impl EngineError {
    pub fn transform(message: impl Into<String>) -> Self {
        Self::Transform {
            message: message.into(),
        }
    }
}
