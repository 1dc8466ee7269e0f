//! Development HTTP server with live reload for livedev.
//!
//! Serves a directory of templates and static files:
//! - Templates are rendered by an external command on every request
//! - Static files are served as-is
//! - A server-sent events endpoint pushes a reload to every open page when
//!   a file in the site root is written
//!
//! # Quick Start
//!
//! ```ignore
//! use livedev_server::{ServerConfig, run_server, shutdown_signal};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let shutdown = CancellationToken::new();
//!     let trigger = shutdown.clone();
//!     tokio::spawn(async move {
//!         shutdown_signal().await;
//!         trigger.cancel();
//!     });
//!
//!     run_server(ServerConfig::default(), shutdown).await.unwrap();
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! Browser ──HTTP──► axum router
//!                        │
//!                        ├─► /__livereload ──► Subscriber ◄── Registry ◄── FileWatcher
//!                        │                                       ▲            (notify)
//!                        │                                       │
//!                        │                          Gateway::serve cancel_all on shutdown
//!                        │
//!                        ├─► /__livereload.js (client script)
//!                        │
//!                        └─► pages ──► render command (templates) / ServeDir (static)
//! ```

mod app;
mod error;
mod gateway;
mod handlers;
mod live_reload;
mod render;
mod state;
mod static_files;

use std::sync::Arc;
use std::time::Duration;

use livedev_config::SiteConfig;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub use error::{RunError, ServerError};
pub use gateway::GatewayState;
pub use render::{CommandRenderer, RenderError, Renderer};

use gateway::Gateway;
use live_reload::{Broadcast, FileWatcher, Registry};
use state::{AppState, LiveReloadState};

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Site layout.
    pub site: SiteConfig,
    /// Render command.
    pub render_command: String,
    /// Extra arguments for the render command.
    pub render_args: Vec<String>,
    /// Enable live reload.
    pub live_reload_enabled: bool,
    /// Watch subdirectories of the root too.
    pub watch_recursive: bool,
    /// Glob patterns that trigger a reload (empty matches everything).
    pub watch_patterns: Vec<String>,
    /// SSE keep-alive interval (`None` disables keep-alive comments).
    pub keep_alive: Option<Duration>,
    /// Upper bound on graceful shutdown.
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8000,
            site: SiteConfig::default(),
            render_command: "minijinja-cli".to_owned(),
            render_args: Vec::new(),
            live_reload_enabled: true,
            watch_recursive: false,
            watch_patterns: Vec::new(),
            keep_alive: Some(Duration::from_secs(15)),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

/// Run the server until `shutdown` is cancelled.
///
/// # Arguments
///
/// * `config` - Server configuration
/// * `shutdown` - Root cancellation token; cancelling it starts the shutdown
///
/// # Errors
///
/// Returns an error if the listener cannot be bound, the initial watch
/// cannot be established, or shutdown exceeds the grace period.
pub async fn run_server(config: ServerConfig, shutdown: CancellationToken) -> Result<(), RunError> {
    let renderer = Arc::new(CommandRenderer::new(
        config.render_command.clone(),
        config.render_args.clone(),
    ));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind((config.host.as_str(), config.port))
        .await
        .map_err(|source| RunError::Bind { addr, source })?;

    serve(listener, &config, renderer, shutdown).await
}

/// Serve on an already bound listener.
async fn serve(
    listener: TcpListener,
    config: &ServerConfig,
    renderer: Arc<dyn Renderer>,
    shutdown: CancellationToken,
) -> Result<(), RunError> {
    let registry = Arc::new(Registry::with_shutdown(shutdown.clone()));

    // Establish the watch before accepting connections
    let watcher = if config.live_reload_enabled {
        let watcher = FileWatcher::start(
            &config.site.root_dir,
            config.watch_recursive,
            &config.watch_patterns,
        )
        .map_err(|source| RunError::Watch {
            path: config.site.root_dir.clone(),
            source,
        })?;
        Some(watcher)
    } else {
        None
    };

    let watch_task = watcher.map(|watcher| {
        let broadcaster: Arc<dyn Broadcast> = Arc::clone(&registry) as Arc<dyn Broadcast>;
        tokio::spawn(watcher.run(broadcaster, shutdown.clone()))
    });

    let state = Arc::new(AppState {
        site: config.site.clone(),
        renderer,
        live_reload: config.live_reload_enabled.then(|| LiveReloadState {
            registry: Arc::clone(&registry),
            keep_alive: config.keep_alive,
        }),
    });
    let app = app::create_router(state);

    if let Ok(addr) = listener.local_addr() {
        tracing::info!(address = %addr, root = %config.site.root_dir.display(), "Server running at http://{addr}/");
    }

    let gateway = Gateway::new(Arc::clone(&registry), config.shutdown_grace);
    let mut states = gateway.subscribe();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = *states.borrow_and_update();
            tracing::info!(state = ?state, "Gateway state changed");
        }
    });
    let result = gateway.serve(listener, app, shutdown.clone()).await;

    // The transport may have failed without a shutdown request
    shutdown.cancel();
    if let Some(task) = watch_task
        && let Err(err) = task.await
    {
        tracing::warn!(error = %err, "Watcher task failed");
    }

    result?;
    tracing::info!("Server stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl-C or SIGTERM).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    tracing::info!("Shutdown signal received, stopping server...");
}

/// Create server configuration from livedev config.
#[must_use]
pub fn server_config_from_livedev_config(config: &livedev_config::Config) -> ServerConfig {
    ServerConfig {
        host: config.server.host.clone(),
        port: config.server.port,
        site: config.site_resolved.clone(),
        render_command: config.render.command.clone(),
        render_args: config.render.args.clone(),
        live_reload_enabled: config.live_reload.enabled,
        watch_recursive: config.live_reload.recursive,
        watch_patterns: config.live_reload.watch_patterns.clone(),
        keep_alive: config.live_reload.keep_alive(),
        shutdown_grace: config.live_reload.shutdown_grace(),
    }
}
