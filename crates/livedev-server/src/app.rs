//! Router construction.
//!
//! Builds the axum router with all routes and middleware.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::live_reload::{self, SCRIPT_PATH, STREAM_PATH};
use crate::state::AppState;

/// Create the application router.
///
/// # Arguments
///
/// * `state` - Shared application state
pub(crate) fn create_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new();

    // Live reload stream and client script
    if state.live_reload_enabled() {
        router = router
            .route(STREAM_PATH, get(live_reload::sse_handler))
            .route(SCRIPT_PATH, get(live_reload::script_handler));
    }

    // Rendered pages and static files
    router
        .fallback(handlers::pages::get_page)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
