//! Logging initialization

use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter};

/// Initialize the tracing subscriber with console output
///
/// Honors `RUST_LOG`; defaults to `info`. Safe to call once per process;
/// a second call is a no-op.
pub fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::registry().with(env_filter).with(
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_writer(std::io::stderr),
    );

    // Tests and embedders may have installed a subscriber already
    let _ = tracing::subscriber::set_global_default(subscriber);
}
