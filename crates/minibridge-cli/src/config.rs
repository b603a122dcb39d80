use anyhow::bail;
use clap::Parser;
use core::time::Duration;
use minibridge::{ClientConfig, EngineConfig};
use std::path::PathBuf;

/// Command line for the `minibridge` binary.
///
/// Every tuning knob can also be supplied through the environment (or a
/// `.env` file), which makes the binary easy to drive from benchmark scripts.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "minibridge",
    version,
    about = "Minify HTML documents on a background worker pool"
)]
pub struct CliArgs {
    /// HTML documents to minify. Inline `<script>` and `<style>` contents are
    /// minified as well.
    #[arg(required = true, value_name = "FILE")]
    pub inputs: Vec<PathBuf>,

    /// Number of worker threads running the minifier.
    ///
    /// Defaults to the available parallelism of the machine.
    ///
    /// Environment variable: `NUM_WORKERS`
    #[arg(long, env = "NUM_WORKERS")]
    pub num_workers: Option<usize>,

    /// Capacity of each worker's job queue.
    ///
    /// Submissions beyond it are retried until a slot frees up.
    ///
    /// Environment variable: `QUEUE_DEPTH`
    #[arg(long, env = "QUEUE_DEPTH", default_value_t = 1024)]
    pub queue_depth: usize,

    /// Per-request deadline in milliseconds. Unset waits indefinitely.
    ///
    /// Environment variable: `REQUEST_TIMEOUT_MS`
    #[arg(long, env = "REQUEST_TIMEOUT_MS")]
    pub request_timeout_ms: Option<u64>,

    /// How long to wait for each worker to exit on shutdown.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT_SECS`
    #[arg(long, env = "SHUTDOWN_TIMEOUT_SECS", default_value_t = 3)]
    pub shutdown_timeout_secs: u64,

    /// Number of times every input is submitted. Values above one turn the
    /// run into a throughput benchmark.
    ///
    /// Environment variable: `ITERATIONS`
    #[arg(long, env = "ITERATIONS", default_value_t = 1)]
    pub iterations: usize,

    /// Cross-check every result against a direct, in-process minification.
    #[arg(long, default_value_t = false)]
    pub verify: bool,

    /// Directory the minified documents are written to, under their original
    /// file names.
    ///
    /// Environment variable: `OUT_DIR`
    #[arg(long, env = "OUT_DIR")]
    pub out_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub engine: EngineConfig,
    pub client: ClientConfig,
    pub inputs: Vec<PathBuf>,
    pub iterations: usize,
    pub verify: bool,
    pub out_dir: Option<PathBuf>,
}

impl BridgeConfig {
    /// Upper bound on requests kept in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.engine
            .num_workers
            .saturating_mul(self.engine.queue_depth)
            .max(1)
    }
}

impl TryFrom<CliArgs> for BridgeConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let defaults = EngineConfig::default();
        let num_workers = args.num_workers.unwrap_or(defaults.num_workers);

        if num_workers == 0 {
            bail!("NUM_WORKERS must be greater than 0");
        }
        if args.queue_depth == 0 {
            bail!("QUEUE_DEPTH must be greater than 0");
        }
        if args.iterations == 0 {
            bail!("ITERATIONS must be greater than 0");
        }
        if args.request_timeout_ms == Some(0) {
            bail!("REQUEST_TIMEOUT_MS must be greater than 0 when set");
        }
        if args.inputs.is_empty() {
            bail!("at least one input file is required");
        }

        Ok(Self {
            engine: EngineConfig {
                num_workers,
                queue_depth: args.queue_depth,
                shutdown_timeout: Duration::from_secs(args.shutdown_timeout_secs),
            },
            client: ClientConfig {
                request_timeout: args.request_timeout_ms.map(Duration::from_millis),
                ..ClientConfig::default()
            },
            inputs: args.inputs,
            iterations: args.iterations,
            verify: args.verify,
            out_dir: args.out_dir,
        })
    }
}
