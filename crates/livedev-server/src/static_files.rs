//! Static file serving from the site root.

use std::path::Path;

use axum::body::Body;
use axum::http::Request;
use axum::response::{IntoResponse, Response};
use tower::ServiceExt;
use tower_http::services::ServeDir;

/// Serve a request from files under `root`.
pub(crate) async fn serve(root: &Path, req: Request<Body>) -> Response {
    match ServeDir::new(root).oneshot(req).await {
        Ok(response) => response.into_response(),
        Err(never) => match never {},
    }
}
