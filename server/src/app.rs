//! Router construction and shared state.

use crate::routes::{health_handler, patents_handler};
use axum::{
    http::{
        header::{X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS},
        HeaderValue,
    },
    routing::get,
    Router,
};
use patscope_core::ServerConfig;
use patscope_scanner::Pipeline;
use std::sync::Arc;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }
}

/// Build the Axum application router
pub fn build_app(state: AppState, config: &ServerConfig) -> Router {
    // Searches are limited per client IP; the health check is not.
    let mut search = Router::new().route("/api/data/patentscope/patents", get(patents_handler));
    if config.rate_limit_per_minute > 0 {
        let period_ms = (60_000 / u64::from(config.rate_limit_per_minute)).max(1);
        let governor = GovernorConfigBuilder::default()
            .per_millisecond(period_ms)
            .burst_size(config.rate_limit_per_minute)
            .use_headers() // X-Forwarded-For / X-Real-IP, then the peer address
            .finish();

        match governor {
            Some(governor) => {
                search = search.layer(GovernorLayer {
                    config: Arc::new(governor),
                });
            }
            None => tracing::warn!(
                rate_limit_per_minute = config.rate_limit_per_minute,
                "Invalid rate limit, search route is not limited"
            ),
        }
    }

    let mut router = Router::new()
        .route("/health", get(health_handler))
        .merge(search)
        .layer(SetResponseHeaderLayer::overriding(
            X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(CorsLayer::permissive());

    if config.compression {
        router = router.layer(CompressionLayer::new());
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
