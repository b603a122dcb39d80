use crate::{
    engine::job::Job,
    error::EngineError,
    handler::{Completion, CompletionHandler},
    minifier::Minifier,
};
use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Worker thread body.
///
/// Receives [`Job`]s until every sender is dropped or the shutdown token is
/// cancelled, runs the minifier on each, and reports the outcome through the
/// session's [`CompletionHandler`]. Jobs still queued after cancellation are
/// dropped without a completion; the client fails their callers itself.
///
/// # Arguments
///
/// - `_worker_id`: Index of this worker (used for logs/tracing).
/// - `rx`: Receiver through which [`Job`]s arrive.
/// - `minifier`: The transform shared by all workers in the pool.
/// - `handler`: Completion callback for the current session.
/// - `shutdown`: Pool-wide cancellation token.
/// - `exited`: Signalled once the loop has returned.
#[allow(clippy::used_underscore_binding)]
pub(crate) fn worker_loop<M: Minifier>(
    _worker_id: usize,
    mut rx: mpsc::Receiver<Job>,
    minifier: Arc<M>,
    handler: CompletionHandler,
    shutdown: CancellationToken,
    exited: oneshot::Sender<()>,
) {
    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {_worker_id} started");

    while let Some(Job { id, input }) = rx.blocking_recv() {
        if shutdown.is_cancelled() {
            break;
        }

        let outcome = catch_unwind(AssertUnwindSafe(|| minifier.minify(input)))
            .unwrap_or_else(|_| Err(EngineError::transform("minifier panicked")));

        if shutdown.is_cancelled() {
            #[cfg(feature = "tracing")]
            tracing::debug!("Worker {_worker_id} discarding result for {id} after shutdown");
            break;
        }

        if let Err(_e) = handler.complete(Completion { id, outcome }) {
            #[cfg(feature = "tracing")]
            tracing::error!("Worker {_worker_id} completion for {id} rejected: {_e}");
        }
    }

    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {_worker_id} stopped");

    if exited.send(()).is_err() {
        #[cfg(feature = "tracing")]
        tracing::trace!("Worker {_worker_id} exit went unobserved");
    }
}
