//! Error types for the HTTP server.

use std::path::PathBuf;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::render::RenderError;

/// Per-request error.
///
/// Converted into a response for the one request; never affects other
/// connections.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Nothing to serve at the given path.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Template rendering failed.
    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        match &self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "Not Found").into_response(),
            Self::Render(e) => {
                tracing::error!(error = %e, "Render error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Render error").into_response()
            }
            Self::Io(e) => {
                tracing::error!(error = %e, "I/O error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
            }
        }
    }
}

/// Fatal server error: aborts startup or shutdown.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// The listener could not be bound.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The initial filesystem watch could not be established.
    #[error("Failed to watch {}: {source}", path.display())]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    /// The HTTP server failed.
    #[error("HTTP error: {0}")]
    Serve(#[source] std::io::Error),

    /// In-flight requests did not finish within the grace period.
    #[error("Shutdown error: connections still open after {}s", .0.as_secs_f64())]
    ShutdownTimeout(Duration),
}
