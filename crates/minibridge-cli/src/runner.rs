use crate::{config::BridgeConfig, minifier::HtmlMinifier};
use anyhow::Context;
use core::{fmt, time::Duration};
use futures::{StreamExt, stream};
use minibridge::{EngineError, Error, Output, ServiceClient, WorkerPoolEngine};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

pub type Engine = Arc<WorkerPoolEngine<HtmlMinifier>>;
pub type Client = ServiceClient<Engine>;

/// Pause before resubmitting a request the engine refused with a full queue.
const QUEUE_FULL_BACKOFF: Duration = Duration::from_micros(200);

struct Document {
    path: PathBuf,
    source: Vec<u8>,
}

/// Totals for one run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Report {
    pub requests: usize,
    pub failed: usize,
    pub mismatched: usize,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub elapsed: Duration,
}

impl Report {
    #[allow(clippy::cast_precision_loss)]
    pub fn requests_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.requests as f64 / secs
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn mib_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.bytes_in as f64 / (1024.0 * 1024.0) / secs
    }

    fn record(&mut self, source: &[u8], result: &Result<Output, Error>) {
        self.requests += 1;
        self.bytes_in += source.len() as u64;
        match result {
            Ok(out) => self.bytes_out += out.valid_len() as u64,
            Err(_) => self.failed += 1,
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} requests ({} failed, {} mismatched) in {:.3?}: {} B -> {} B, {:.1} req/s, {:.2} MiB/s",
            self.requests,
            self.failed,
            self.mismatched,
            self.elapsed,
            self.bytes_in,
            self.bytes_out,
            self.requests_per_sec(),
            self.mib_per_sec(),
        )
    }
}

/// Submits every input `iterations` times and collects the results.
///
/// Requests keep flowing until all have resolved. If the service is stopped
/// mid-run (e.g. on Ctrl+C) the remaining requests fail with
/// `ServiceStopped` and are counted as failures.
pub async fn run(client: &Client, config: &BridgeConfig) -> anyhow::Result<Report> {
    let documents = read_documents(&config.inputs).await?;
    let expected = config
        .verify
        .then(|| reference_outputs(client.engine().minifier(), &documents));
    let mut first_pass: Vec<Option<Output>> = vec![None; documents.len()];
    let mut report = Report::default();

    let jobs = (0..config.iterations)
        .flat_map(|iteration| (0..documents.len()).map(move |index| (iteration, index)));

    let start = Instant::now();
    let mut results = stream::iter(jobs)
        .map(|(iteration, index)| {
            let source = documents[index].source.clone();
            async move { (iteration, index, submit_with_retry(client, source).await) }
        })
        .buffer_unordered(config.max_in_flight());

    while let Some((iteration, index, result)) = results.next().await {
        let document = &documents[index];
        report.record(&document.source, &result);

        match result {
            Ok(out) => {
                if let Some(expected) = &expected {
                    if out.as_bytes() != expected[index].as_slice() {
                        report.mismatched += 1;
                        tracing::warn!(
                            "Result for {} differs from reference minification",
                            document.path.display()
                        );
                    }
                }
                if iteration == 0 {
                    first_pass[index] = Some(out);
                }
            }
            Err(e) => {
                tracing::warn!("Failed to minify {}: {e}", document.path.display());
            }
        }
    }
    report.elapsed = start.elapsed();

    if let Some(out_dir) = &config.out_dir {
        write_outputs(out_dir, &documents, first_pass).await?;
    }

    Ok(report)
}

/// Minifies each document once, directly, for comparison with pooled results.
fn reference_outputs(minifier: &HtmlMinifier, documents: &[Document]) -> Vec<Vec<u8>> {
    documents
        .iter()
        .map(|document| minifier.reference(&document.source))
        .collect()
}

async fn submit_with_retry(client: &Client, source: Vec<u8>) -> Result<Output, Error> {
    loop {
        match client.minify(source.clone()).await {
            Err(Error::Engine(EngineError::QueueFull)) => {
                tokio::time::sleep(QUEUE_FULL_BACKOFF).await;
            }
            result => return result,
        }
    }
}

async fn read_documents(paths: &[PathBuf]) -> anyhow::Result<Vec<Document>> {
    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        let source = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        documents.push(Document {
            path: path.clone(),
            source,
        });
    }
    Ok(documents)
}

async fn write_outputs(
    out_dir: &Path,
    documents: &[Document],
    outputs: Vec<Option<Output>>,
) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(out_dir)
        .await
        .with_context(|| format!("failed to create {}", out_dir.display()))?;

    for (document, output) in documents.iter().zip(outputs) {
        let Some(output) = output else {
            continue;
        };
        let Some(name) = document.path.file_name() else {
            continue;
        };
        let target = out_dir.join(name);
        tokio::fs::write(&target, output.as_bytes())
            .await
            .with_context(|| format!("failed to write {}", target.display()))?;
        tracing::debug!("Wrote {}", target.display());
    }
    Ok(())
}
