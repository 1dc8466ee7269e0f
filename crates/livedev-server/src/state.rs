//! Application state.
//!
//! Shared state for all request handlers.

use std::sync::Arc;
use std::time::Duration;

use livedev_config::SiteConfig;

use crate::live_reload::Registry;
use crate::render::Renderer;

/// Application state shared across all handlers.
pub(crate) struct AppState {
    /// Site layout (root directory and template names).
    pub(crate) site: SiteConfig,
    /// Renderer for page templates.
    pub(crate) renderer: Arc<dyn Renderer>,
    /// Live reload state (if enabled).
    pub(crate) live_reload: Option<LiveReloadState>,
}

/// Live reload state shared with the event stream handler.
pub(crate) struct LiveReloadState {
    /// Registry of connected clients.
    pub(crate) registry: Arc<Registry>,
    /// Interval between keep-alive comments.
    pub(crate) keep_alive: Option<Duration>,
}

impl AppState {
    /// Check if live reload is enabled.
    #[must_use]
    pub(crate) fn live_reload_enabled(&self) -> bool {
        self.live_reload.is_some()
    }
}
