//! Multi-threaded engine backed by a pool of worker threads.
//!
//! [`WorkerPoolEngine`] owns a set of dedicated OS threads, each consuming
//! [`Job`]s from its own bounded channel. Submissions are distributed
//! round-robin, so jobs on different workers finish (and complete) in no
//! particular order relative to dispatch.
//!
//! Stopping the pool cancels a shared [`CancellationToken`] and drops every
//! job sender. Workers skip whatever is still queued, exit, and acknowledge
//! on a oneshot that [`WorkerPoolEngine::wait_stopped`] collects.

use crate::{
    config::EngineConfig,
    engine::{Engine, job::Job, worker::worker_loop},
    error::EngineError,
    handler::CompletionHandler,
    id::RequestId,
    minifier::Minifier,
};
use parking_lot::{Mutex, RwLock};
use portable_atomic::{AtomicUsize, Ordering};
use std::{sync::Arc, thread};
use tokio::{
    sync::{
        mpsc,
        oneshot::{self, error::TryRecvError},
    },
    time::timeout,
};
use tokio_util::sync::CancellationToken;

/// Job senders and cancellation for the currently running set of workers.
struct Running {
    workers: Vec<mpsc::Sender<Job>>,
    shutdown_token: CancellationToken,
}

/// A background engine running a [`Minifier`] on a pool of worker threads.
///
/// The pool can be started again after it has been stopped; each start spawns
/// a fresh set of workers bound to the new session's handler.
pub struct WorkerPoolEngine<M> {
    minifier: Arc<M>,
    config: EngineConfig,
    next_worker: AtomicUsize,
    running: RwLock<Option<Running>>,
    exits: Mutex<Vec<(usize, oneshot::Receiver<()>)>>,
}

impl<M: Minifier> WorkerPoolEngine<M> {
    /// Creates a stopped pool. No threads are spawned until
    /// [`Engine::start`].
    pub fn new(minifier: M, config: EngineConfig) -> Self {
        Self {
            minifier: Arc::new(minifier),
            config,
            next_worker: AtomicUsize::new(0),
            running: RwLock::new(None),
            exits: Mutex::new(Vec::new()),
        }
    }

    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn minifier(&self) -> &M {
        &self.minifier
    }

    pub fn is_running(&self) -> bool {
        self.running.read().is_some()
    }

    /// Returns the index of the next worker to receive work (round-robin).
    fn next_worker_index(&self, workers: usize) -> usize {
        self.next_worker.fetch_add(1, Ordering::Relaxed) % workers
    }

    /// Waits for every worker stopped so far to acknowledge its exit.
    ///
    /// Restarting without calling this is fine: acknowledgements of workers
    /// that already exited are dropped at the next start.
    ///
    /// Each worker is given up to `shutdown_timeout`; a worker stuck inside a
    /// long transform is logged and left to finish on its own.
    pub async fn wait_stopped(&self) {
        let exits = core::mem::take(&mut *self.exits.lock());
        let shutdown_timeout = self.config.shutdown_timeout;

        let waits = exits.into_iter().map(|(_i, rx)| async move {
            match timeout(shutdown_timeout, rx).await {
                Ok(Ok(())) => {
                    #[cfg(feature = "tracing")]
                    tracing::trace!("Worker {_i} shutdown acknowledged");
                }
                Ok(Err(_e)) => {
                    #[cfg(feature = "tracing")]
                    tracing::error!("Worker {_i} exited without acknowledging: {_e}");
                }
                Err(_) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("Worker {_i} shutdown timed out");
                }
            }
        });

        futures::future::join_all(waits).await;

        #[cfg(feature = "tracing")]
        tracing::debug!("Worker pool shutdown complete");
    }

    /// Adds `exits` to the tracked acknowledgements, dropping those of
    /// workers that have already exited.
    fn track_exits(&self, exits: Vec<(usize, oneshot::Receiver<()>)>) {
        let mut tracked = self.exits.lock();
        tracked.retain_mut(|(_, rx)| matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        tracked.extend(exits);
    }

    fn spawn_workers(&self, handler: &CompletionHandler) -> Result<Running, EngineError> {
        let shutdown_token = CancellationToken::new();
        let mut workers = Vec::with_capacity(self.config.num_workers);
        let mut exits = Vec::with_capacity(self.config.num_workers);

        for worker_id in 0..self.config.num_workers {
            let (tx, rx) = mpsc::channel(self.config.queue_depth);
            let (exit_tx, exit_rx) = oneshot::channel();
            let minifier = Arc::clone(&self.minifier);
            let handler = handler.clone();
            let token = shutdown_token.clone();

            let spawned = thread::Builder::new()
                .name(format!("minibridge-worker-{worker_id}"))
                .spawn(move || worker_loop(worker_id, rx, minifier, handler, token, exit_tx));

            if let Err(e) = spawned {
                // Unwind the workers that did start.
                shutdown_token.cancel();
                drop(workers);
                self.track_exits(exits);
                return Err(EngineError::Start {
                    reason: format!("failed to spawn worker {worker_id}: {e}"),
                });
            }

            workers.push(tx);
            exits.push((worker_id, exit_rx));
        }

        self.track_exits(exits);
        Ok(Running {
            workers,
            shutdown_token,
        })
    }
}

impl<M: Minifier> Engine for WorkerPoolEngine<M> {
    fn start(&self, handler: CompletionHandler) -> Result<(), EngineError> {
        self.config
            .validate()
            .map_err(|reason| EngineError::Start { reason })?;

        let mut running = self.running.write();
        if running.is_some() {
            return Err(EngineError::Start {
                reason: "worker pool is already running".to_string(),
            });
        }

        *running = Some(self.spawn_workers(&handler)?);

        #[cfg(feature = "tracing")]
        tracing::info!(
            "Worker pool started with {} workers (queue depth {})",
            self.config.num_workers,
            self.config.queue_depth
        );
        Ok(())
    }

    fn stop(&self) {
        let Some(running) = self.running.write().take() else {
            return;
        };

        #[cfg(feature = "tracing")]
        tracing::info!("Stopping worker pool");

        // Cancel first so workers skip queued jobs, then drop the senders to
        // wake any worker blocked on an empty queue.
        running.shutdown_token.cancel();
        drop(running.workers);
    }

    fn submit(&self, id: RequestId, input: Vec<u8>) -> Result<(), EngineError> {
        let running = self.running.read();
        let Some(running) = running.as_ref() else {
            return Err(EngineError::NotRunning);
        };
        if running.shutdown_token.is_cancelled() {
            return Err(EngineError::NotRunning);
        }

        let worker_idx = self.next_worker_index(running.workers.len());
        running.workers[worker_idx]
            .try_send(Job { id, input })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => EngineError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => EngineError::NotRunning,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ClientConfig, ServiceClient, error::Error, minifier::Echo, output::Output};
    use core::time::Duration;
    use std::sync::Barrier;

    fn config(num_workers: usize, queue_depth: usize) -> EngineConfig {
        EngineConfig {
            num_workers,
            queue_depth,
            shutdown_timeout: Duration::from_secs(3),
        }
    }

    /// Holds every job until the test releases the barrier.
    struct Gate(Arc<Barrier>);

    impl Minifier for Gate {
        fn minify(&self, input: Vec<u8>) -> Result<Output, EngineError> {
            self.0.wait();
            Echo.minify(input)
        }
    }

    struct Panics;

    impl Minifier for Panics {
        fn minify(&self, _input: Vec<u8>) -> Result<Output, EngineError> {
            panic!("boom");
        }
    }

    #[test]
    fn submit_before_start_is_rejected() {
        let engine = WorkerPoolEngine::new(Echo, config(1, 1));
        assert_eq!(
            engine.submit(RequestId::new(0), vec![1]),
            Err(EngineError::NotRunning)
        );
    }

    #[test]
    fn invalid_config_fails_start() {
        let client = ServiceClient::new(WorkerPoolEngine::new(Echo, config(0, 1)));
        assert!(matches!(
            client.start_service(),
            Err(Error::Engine(EngineError::Start { .. }))
        ));
        assert!(!client.is_started());
    }

    #[tokio::test]
    async fn full_queue_is_reported() {
        let barrier = Arc::new(Barrier::new(2));
        let engine = Arc::new(WorkerPoolEngine::new(
            Gate(Arc::clone(&barrier)),
            config(1, 1),
        ));
        let client = ServiceClient::new(Arc::clone(&engine));
        client.start_service().unwrap();

        // The first job occupies the worker. Once the second is accepted the
        // worker has dequeued the first, so the queue holds exactly one job.
        let first = client.submit(b"a".to_vec()).unwrap();
        let second = loop {
            match client.submit(b"b".to_vec()) {
                Ok(pending) => break pending,
                Err(Error::Engine(EngineError::QueueFull)) => {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
                Err(e) => panic!("unexpected error: {e}"),
            }
        };

        assert_eq!(
            client.submit(b"c".to_vec()).unwrap_err(),
            Error::Engine(EngineError::QueueFull)
        );
        // A rejected submission leaves nothing behind in the table.
        assert_eq!(client.in_flight(), 2);

        barrier.wait();
        barrier.wait();
        assert_eq!(first.await.unwrap().as_bytes(), b"a");
        assert_eq!(second.await.unwrap().as_bytes(), b"b");

        client.stop_service().unwrap();
        engine.wait_stopped().await;
    }

    #[tokio::test]
    async fn panicking_minifier_fails_only_its_request() {
        let engine = Arc::new(WorkerPoolEngine::new(Panics, config(1, 4)));
        let client = ServiceClient::with_config(Arc::clone(&engine), ClientConfig::default());
        client.start_service().unwrap();

        let err = client.minify(b"x".to_vec()).await.unwrap_err();
        assert_eq!(
            err,
            Error::Engine(EngineError::transform("minifier panicked"))
        );

        // The worker survives the panic.
        let err = client.minify(b"y".to_vec()).await.unwrap_err();
        assert!(matches!(err, Error::Engine(EngineError::Transform { .. })));

        client.stop_service().unwrap();
        engine.wait_stopped().await;
    }

    #[tokio::test]
    async fn restarts_after_stop() {
        let engine = Arc::new(WorkerPoolEngine::new(Echo, config(2, 8)));
        let client = ServiceClient::new(Arc::clone(&engine));

        for round in 0..3_u8 {
            client.start_service().unwrap();
            assert!(engine.is_running());
            let out = client.minify(vec![round; 16]).await.unwrap();
            assert_eq!(out.as_bytes(), &[round; 16]);
            client.stop_service().unwrap();
            assert!(!engine.is_running());
            engine.wait_stopped().await;
        }
    }

    #[tokio::test]
    async fn restarts_without_waiting_forget_exited_workers() {
        let engine = Arc::new(WorkerPoolEngine::new(Echo, config(2, 8)));
        let client = ServiceClient::new(Arc::clone(&engine));

        for round in 0..20_u8 {
            client.start_service().unwrap();
            let out = client.minify(vec![round]).await.unwrap();
            assert_eq!(out.as_bytes(), &[round]);
            client.stop_service().unwrap();
            // Give the stopped workers time to exit.
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        client.start_service().unwrap();
        assert!(engine.exits.lock().len() <= 4);
        client.stop_service().unwrap();
        engine.wait_stopped().await;
        assert!(engine.exits.lock().is_empty());
    }
}
