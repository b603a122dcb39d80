//! The service client: turns callback-style engine completions into futures.
//!
//! Every [`ServiceClient::submit`] allocates a fresh [`RequestId`], parks a
//! oneshot sender in the current session's [`RequestTable`] and hands the
//! input to the [`Engine`]. [`ServiceClient::submit_with`] parks a callback
//! instead, for callers without a runtime. The engine later reports back through the
//! [`CompletionHandler`] it was given at start, which looks the id up and
//! resolves exactly that caller. Completions may arrive in any order and on
//! any thread.
//!
//! [`RequestTable`]: crate::RequestTable

use crate::{
    config::ClientConfig,
    engine::Engine,
    error::{Error, Result},
    handler::{CompletionHandler, Session},
    id::{IdAllocator, RequestId},
    output::Output,
    table::PendingRequest,
};
use core::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};
use parking_lot::RwLock;
use pin_project_lite::pin_project;
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot};
use tokio_util::sync::CancellationToken;

/// Lifecycle of a client.
#[derive(Debug, Default)]
pub(crate) enum ServiceState {
    #[default]
    Stopped,
    Started(Arc<Session>),
}

struct Inner<E: Engine> {
    engine: E,
    ids: IdAllocator,
    state: RwLock<ServiceState>,
    faults: broadcast::Sender<Error>,
    config: ClientConfig,
}

impl<E: Engine> Inner<E> {
    /// Closes the session and stops the engine.
    fn close(&self, session: &Session) {
        session.close();
        self.engine.stop();
    }

    /// Fails whatever is still pending in a closed session.
    fn fail_pending(session: &Session) {
        let abandoned = session.table().drain();
        #[cfg(feature = "tracing")]
        {
            if !abandoned.is_empty() {
                tracing::debug!("Failing {} pending requests on stop", abandoned.len());
            }
        }
        for pending in abandoned {
            pending.fail(Error::ServiceStopped);
        }
    }
}

impl<E: Engine> Drop for Inner<E> {
    fn drop(&mut self) {
        if let ServiceState::Started(session) = core::mem::take(self.state.get_mut()) {
            self.close(&session);
            Self::fail_pending(&session);
        }
    }
}

/// Handle used by callers to submit minification work.
///
/// Cloning is cheap; all clones share the same engine, id space and request
/// table. When the last clone is dropped a running service is stopped.
///
/// # Example
///
/// ```
/// use minibridge::{EngineConfig, ServiceClient, WorkerPoolEngine, Echo};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> minibridge::Result<()> {
/// let client = ServiceClient::new(WorkerPoolEngine::new(Echo, EngineConfig::default()));
/// client.start_service()?;
///
/// let out = client.minify(b"<p>hi</p>".to_vec()).await?;
/// assert_eq!(out.as_bytes(), b"<p>hi</p>");
///
/// client.stop_service()?;
/// # Ok(())
/// # }
/// ```
pub struct ServiceClient<E: Engine> {
    inner: Arc<Inner<E>>,
}

impl<E: Engine> Clone for ServiceClient<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: Engine> ServiceClient<E> {
    pub fn new(engine: E) -> Self {
        Self::with_config(engine, ClientConfig::default())
    }

    pub fn with_config(engine: E, config: ClientConfig) -> Self {
        let (faults, _) = broadcast::channel(config.fault_capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                engine,
                ids: IdAllocator::new(),
                state: RwLock::new(ServiceState::Stopped),
                faults,
                config,
            }),
        }
    }

    pub fn engine(&self) -> &E {
        &self.inner.engine
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Starts the engine with a handler bound to a fresh request table.
    ///
    /// Calling this on a started client does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Engine`] if the engine fails to start; the client
    /// stays stopped.
    pub fn start_service(&self) -> Result<()> {
        let mut state = self.inner.state.write();
        if matches!(*state, ServiceState::Started(_)) {
            return Ok(());
        }

        let session = Arc::new(Session::new());
        let handler = CompletionHandler::new(Arc::clone(&session), self.inner.faults.clone());
        self.inner.engine.start(handler)?;
        *state = ServiceState::Started(session);

        #[cfg(feature = "tracing")]
        tracing::info!("Service started");
        Ok(())
    }

    /// Stops the engine and fails every pending request with
    /// [`Error::ServiceStopped`].
    ///
    /// Completions the engine delivers afterwards for those requests are
    /// discarded. Calling this on a stopped client does nothing.
    ///
    /// # Errors
    ///
    /// Currently infallible.
    pub fn stop_service(&self) -> Result<()> {
        let session = {
            let mut state = self.inner.state.write();
            let ServiceState::Started(session) = core::mem::take(&mut *state) else {
                return Ok(());
            };
            self.inner.close(&session);
            session
        };
        // Outside the lock so callbacks may call back into the client.
        Inner::<E>::fail_pending(&session);

        #[cfg(feature = "tracing")]
        tracing::info!("Service stopped");
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        matches!(*self.inner.state.read(), ServiceState::Started(_))
    }

    /// Dispatches `input` to the engine and returns a future for its result.
    ///
    /// Dispatch happens before this returns, so the request is in flight even
    /// if the returned future is never polled.
    ///
    /// # Errors
    ///
    /// - [`Error::ServiceNotStarted`] if the client is stopped. Nothing is
    ///   dispatched.
    /// - [`Error::DuplicateId`] if the allocated id is already pending.
    /// - [`Error::Engine`] if the engine refuses the submission. The request
    ///   is removed again before returning.
    pub fn submit(&self, input: Vec<u8>) -> Result<PendingMinify> {
        let (tx, rx) = oneshot::channel();
        let id = self.dispatch(input, |id| PendingRequest::new(id, tx))?;
        Ok(PendingMinify::new(id, rx))
    }

    /// Dispatches `input` and hands its result to `on_complete` instead of
    /// returning a future. Needs no async runtime.
    ///
    /// `on_complete` runs exactly once, on whichever thread resolves the
    /// request: an engine worker, or the thread calling
    /// [`stop_service`](Self::stop_service), which passes
    /// [`Error::ServiceStopped`]. It should not block. It is not called when
    /// this returns an error.
    ///
    /// [`ClientConfig::request_timeout`] does not apply here.
    ///
    /// # Errors
    ///
    /// As [`submit`](Self::submit).
    pub fn submit_with<F>(&self, input: Vec<u8>, on_complete: F) -> Result<RequestId>
    where
        F: FnOnce(Result<Output>) + Send + 'static,
    {
        self.dispatch(input, |id| {
            PendingRequest::with_callback(id, Box::new(on_complete))
        })
    }

    /// Registers the pending request built by `pending` under a fresh id,
    /// then hands `input` to the engine.
    fn dispatch(
        &self,
        input: Vec<u8>,
        pending: impl FnOnce(RequestId) -> PendingRequest,
    ) -> Result<RequestId> {
        let state = self.inner.state.read();
        let ServiceState::Started(session) = &*state else {
            return Err(Error::ServiceNotStarted);
        };

        let id = self.inner.ids.next_id();
        if let Err(e) = session.table().insert(pending(id)) {
            #[cfg(feature = "tracing")]
            tracing::error!("Protocol fault: {e}");
            let _ = self.inner.faults.send(e.clone());
            return Err(e);
        }

        if let Err(e) = self.inner.engine.submit(id, input) {
            session.table().take_and_remove(id);
            return Err(e.into());
        }

        Ok(id)
    }

    /// Minifies `input`, waiting for the engine's completion.
    ///
    /// Applies [`ClientConfig::request_timeout`] when set.
    ///
    /// # Errors
    ///
    /// Any error from [`submit`](Self::submit), the engine's per-request
    /// failure, [`Error::ServiceStopped`] if the service stops first, or
    /// [`Error::Timeout`].
    pub async fn minify(&self, input: Vec<u8>) -> Result<Output> {
        let pending = self.submit(input)?;
        match self.inner.config.request_timeout {
            Some(limit) => {
                let id = pending.id();
                tokio::time::timeout(limit, pending)
                    .await
                    .map_err(|_| Error::Timeout { id })?
            }
            None => pending.await,
        }
    }

    /// Like [`minify`](Self::minify), but stops waiting as soon as `cancel`
    /// fires or the request timeout elapses, whichever comes first.
    ///
    /// The request itself stays in flight; its eventual completion is
    /// consumed and discarded.
    ///
    /// # Errors
    ///
    /// As [`minify`](Self::minify), plus [`Error::Cancelled`].
    pub async fn minify_with_cancel(
        &self,
        input: Vec<u8>,
        cancel: &CancellationToken,
    ) -> Result<Output> {
        let pending = self.submit(input)?;
        let id = pending.id();
        let deadline = async {
            match self.inner.config.request_timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => core::future::pending().await,
            }
        };
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(Error::Cancelled { id }),
            res = pending => res,
            () = deadline => Err(Error::Timeout { id }),
        }
    }

    /// Number of requests dispatched in the current session and not yet
    /// completed. Zero when stopped.
    pub fn in_flight(&self) -> usize {
        match &*self.inner.state.read() {
            ServiceState::Started(session) => session.table().len(),
            ServiceState::Stopped => 0,
        }
    }

    /// Subscribes to protocol faults ([`Error::DuplicateId`] and
    /// [`Error::UnknownRequestId`]).
    pub fn subscribe_faults(&self) -> broadcast::Receiver<Error> {
        self.inner.faults.subscribe()
    }
}

pin_project! {
    /// Resolves to the engine's result for one dispatched request.
    ///
    /// Dropping it does not cancel the request.
    #[must_use = "futures do nothing unless you `.await` or poll them"]
    #[derive(Debug)]
    pub struct PendingMinify {
        id: RequestId,
        #[pin]
        rx: oneshot::Receiver<Result<Output>>,
    }
}

impl PendingMinify {
    const fn new(id: RequestId, rx: oneshot::Receiver<Result<Output>>) -> Self {
        Self { id, rx }
    }

    pub const fn id(&self) -> RequestId {
        self.id
    }
}

impl Future for PendingMinify {
    type Output = Result<Output>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // A dropped sender means the session went away without resolving us.
        self.project()
            .rx
            .poll(cx)
            .map(|res| res.unwrap_or(Err(Error::ServiceStopped)))
    }
}
