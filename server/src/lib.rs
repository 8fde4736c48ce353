//! patscope server - HTTP transport around the extraction pipeline.

pub mod app;
pub mod routes;

pub use app::{build_app, AppState};

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing subscriber for logging.
///
/// Respects `RUST_LOG`; defaults to `info,patscope=debug`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,patscope=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}
