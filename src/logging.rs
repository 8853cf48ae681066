use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install a console subscriber for binaries.
///
/// `RUST_LOG` wins when set; otherwise `default_directive` (e.g. `"sheet_jobs=info"`) applies.
/// Logs go to stderr so stdout stays free for job output. Calling this twice is a no-op.
pub fn init_tracing(default_directive: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init();
}
