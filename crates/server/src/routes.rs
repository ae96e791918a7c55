//! Route configuration.

use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

/// Allowance for multipart boundaries, part headers and the text fields on
/// top of the chunk payload itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let body_limit = usize::try_from(state.config.server.max_chunk_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    let mut router = Router::new()
        .route("/status", get(handlers::upload_status))
        .route(
            "/upload",
            post(handlers::upload_chunk).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/files", get(handlers::list_files))
        .route("/download", get(handlers::download_file))
        // Unauthenticated for load balancer health checks
        .route("/health", get(handlers::health_check));

    // The metrics endpoint should be network-restricted to scrapers when enabled
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
