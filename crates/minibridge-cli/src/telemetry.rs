//! Console logging for the `minibridge` binary.
//!
//! Log level is taken from `RUST_LOG` and defaults to `info`. The library's
//! own events (worker lifecycle, protocol faults, shutdown timeouts) come
//! through the same subscriber because the CLI enables `minibridge/tracing`.

use anyhow::Context;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub fn init_telemetry() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_line_number(true)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339()),
        )
        .try_init()
        .context("failed to install tracing subscriber")
}
