use core::time::Duration;
use minibridge::{
    Echo, EngineConfig, EngineError, Error, Minifier, Output, ServiceClient, WorkerPoolEngine,
};
use std::sync::Arc;
use tokio::{sync::broadcast::error::TryRecvError, time::timeout};

fn config(num_workers: usize) -> EngineConfig {
    EngineConfig {
        num_workers,
        queue_depth: 256,
        shutdown_timeout: Duration::from_secs(3),
    }
}

/// Strips ASCII whitespace in place, reusing the input allocation.
struct StripSpaces;

impl Minifier for StripSpaces {
    fn minify(&self, mut input: Vec<u8>) -> Result<Output, EngineError> {
        if input.first() == Some(&b'!') {
            return Err(EngineError::transform("rejected"));
        }
        let mut len = 0;
        for i in 0..input.len() {
            if !input[i].is_ascii_whitespace() {
                input[len] = input[i];
                len += 1;
            }
        }
        Output::reused(input, len)
    }
}

/// Sleeps before echoing so jobs are still queued when the pool stops.
struct Slow(Duration);

impl Minifier for Slow {
    fn minify(&self, input: Vec<u8>) -> Result<Output, EngineError> {
        std::thread::sleep(self.0);
        Echo.minify(input)
    }
}

#[tokio::test]
async fn echo_round_trip_edge_lengths() {
    let engine = Arc::new(WorkerPoolEngine::new(Echo, config(2)));
    let client = ServiceClient::new(Arc::clone(&engine));
    client.start_service().unwrap();

    for len in [0, 1, 1 << 20] {
        let input: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        let out = client.minify(input.clone()).await.unwrap();
        assert_eq!(out.valid_len(), len);
        assert_eq!(out.into_vec(), input);
    }

    client.stop_service().unwrap();
    engine.wait_stopped().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_get_their_own_results() {
    let engine = Arc::new(WorkerPoolEngine::new(StripSpaces, config(4)));
    let client = ServiceClient::new(Arc::clone(&engine));
    client.start_service().unwrap();

    let tasks: Vec<_> = (0..64)
        .map(|task| {
            let client = client.clone();
            tokio::spawn(async move {
                for n in 0..50 {
                    let input = format!("  task {task}  item {n}  ");
                    let expected = format!("task{task}item{n}");
                    let out = client.minify(input.into_bytes()).await.unwrap();
                    assert_eq!(out.as_bytes(), expected.as_bytes());
                }
            })
        })
        .collect();

    for result in futures::future::join_all(tasks).await {
        result.unwrap();
    }
    assert_eq!(client.in_flight(), 0);

    client.stop_service().unwrap();
    engine.wait_stopped().await;
}

#[tokio::test]
async fn transform_errors_reach_only_their_caller() {
    let engine = Arc::new(WorkerPoolEngine::new(StripSpaces, config(2)));
    let client = ServiceClient::new(Arc::clone(&engine));
    client.start_service().unwrap();

    let bad = client.submit(b"! nope".to_vec()).unwrap();
    let good = client.submit(b"a b c".to_vec()).unwrap();

    assert_eq!(
        bad.await.unwrap_err(),
        Error::Engine(EngineError::transform("rejected"))
    );
    assert_eq!(good.await.unwrap().as_bytes(), b"abc");

    client.stop_service().unwrap();
    engine.wait_stopped().await;
}

#[tokio::test]
async fn stop_fails_queued_requests() {
    let engine = Arc::new(WorkerPoolEngine::new(
        Slow(Duration::from_millis(200)),
        config(1),
    ));
    let client = ServiceClient::new(Arc::clone(&engine));
    client.start_service().unwrap();

    let pending: Vec<_> = (0..5).map(|_| client.submit(vec![7; 8]).unwrap()).collect();
    client.stop_service().unwrap();

    for fut in pending {
        let res = timeout(Duration::from_secs(1), fut)
            .await
            .expect("stop must resolve every pending request");
        assert_eq!(res, Err(Error::ServiceStopped));
    }

    assert_eq!(
        client.minify(vec![1]).await.unwrap_err(),
        Error::ServiceNotStarted
    );
    engine.wait_stopped().await;
    assert!(!engine.is_running());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn start_stop_cycles_with_requests_in_flight() {
    let engine = Arc::new(WorkerPoolEngine::new(
        Slow(Duration::from_micros(50)),
        config(3),
    ));
    let client = ServiceClient::new(Arc::clone(&engine));
    let mut faults = client.subscribe_faults();
    client.start_service().unwrap();

    let callers: Vec<_> = (0..16)
        .map(|task| {
            let client = client.clone();
            tokio::spawn(async move {
                let mut counts = [0_usize; 4];
                for n in 0..300 {
                    let input = format!("task {task} item {n}").into_bytes();
                    let res = timeout(Duration::from_secs(5), client.minify(input.clone()))
                        .await
                        .expect("every call resolves while the service cycles");
                    match res {
                        Ok(out) => {
                            assert_eq!(out.as_bytes(), input.as_slice());
                            counts[0] += 1;
                        }
                        Err(Error::ServiceStopped) => counts[1] += 1,
                        Err(Error::ServiceNotStarted) => {
                            counts[2] += 1;
                            tokio::time::sleep(Duration::from_micros(500)).await;
                        }
                        Err(Error::Engine(EngineError::QueueFull | EngineError::NotRunning)) => {
                            counts[3] += 1;
                        }
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                }
                counts
            })
        })
        .collect();

    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(4)).await;
        client.stop_service().unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        client.start_service().unwrap();
    }

    let mut totals = [0_usize; 4];
    for result in futures::future::join_all(callers).await {
        for (total, n) in totals.iter_mut().zip(result.unwrap()) {
            *total += n;
        }
    }
    assert_eq!(totals.iter().sum::<usize>(), 16 * 300);
    assert!(totals[0] > 0);
    assert_eq!(client.in_flight(), 0);
    assert!(matches!(faults.try_recv(), Err(TryRecvError::Empty)));

    client.stop_service().unwrap();
    engine.wait_stopped().await;
}

#[test]
fn callbacks_complete_without_a_runtime() {
    let engine = Arc::new(WorkerPoolEngine::new(StripSpaces, config(2)));
    let client = ServiceClient::new(Arc::clone(&engine));
    client.start_service().unwrap();

    let (tx, rx) = std::sync::mpsc::channel();
    for n in 0..32 {
        let tx = tx.clone();
        client
            .submit_with(format!(" item {n} ").into_bytes(), move |res| {
                let _ = tx.send((n, res));
            })
            .unwrap();
    }
    drop(tx);

    let mut seen: Vec<_> = rx.iter().collect();
    assert_eq!(seen.len(), 32);
    seen.sort_by_key(|(n, _)| *n);
    for (n, res) in seen {
        assert_eq!(res.unwrap().as_bytes(), format!("item{n}").as_bytes());
    }
    client.stop_service().unwrap();
}
