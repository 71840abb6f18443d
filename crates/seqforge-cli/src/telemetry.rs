//! Log output for the `seqforge` binary.
//!
//! Events go to stderr so that issued IDs on stdout stay machine-readable.
//! The filter defaults to `warn` and follows `RUST_LOG` when set, e.g.
//!
//! ```bash
//! RUST_LOG=seqforge=debug seqforge next orders
//! ```

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub fn init_telemetry() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                .with_file(true),
        )
        .init();
}
