//! HTTP gateway lifecycle.
//!
//! Serves the router until the root shutdown token fires, then drains in two
//! phases: every live reload client is cancelled first, because its stream
//! would otherwise never finish, and only then is the transport asked to stop
//! accepting and wait for in-flight requests, bounded by a grace period.

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::RunError;
use crate::live_reload::Registry;

/// Lifecycle of the gateway.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GatewayState {
    /// Accepting and serving connections.
    Running,
    /// Shutdown requested; clients cancelled, in-flight requests finishing.
    Draining,
    /// Transport stopped.
    Stopped,
}

/// Accepts connections and coordinates their shutdown.
pub(crate) struct Gateway {
    registry: Arc<Registry>,
    grace: Duration,
    state: watch::Sender<GatewayState>,
}

impl Gateway {
    /// Create a gateway over `registry` with the given shutdown grace period.
    pub(crate) fn new(registry: Arc<Registry>, grace: Duration) -> Self {
        let (state, _) = watch::channel(GatewayState::Running);
        Self {
            registry,
            grace,
            state,
        }
    }

    /// Observe lifecycle transitions.
    pub(crate) fn subscribe(&self) -> watch::Receiver<GatewayState> {
        self.state.subscribe()
    }

    fn transition(&self, next: GatewayState) {
        self.state.send_replace(next);
    }

    /// Serve `app` on `listener` until `shutdown` is cancelled and drained.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::ShutdownTimeout`] if in-flight requests outlive the
    /// grace period, or [`RunError::Serve`] if the transport fails.
    pub(crate) async fn serve(
        &self,
        listener: TcpListener,
        app: Router,
        shutdown: CancellationToken,
    ) -> Result<(), RunError> {
        let server = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.clone().cancelled_owned())
            .into_future();
        tokio::pin!(server);

        tokio::select! {
            result = &mut server => {
                self.transition(GatewayState::Stopped);
                return result.map_err(RunError::Serve);
            }
            () = shutdown.cancelled() => {}
        }

        self.transition(GatewayState::Draining);
        self.registry.cancel_all();
        tracing::info!(
            grace_secs = self.grace.as_secs_f64(),
            "Waiting for connections to close"
        );

        let result = tokio::time::timeout(self.grace, server).await;
        self.transition(GatewayState::Stopped);

        match result {
            Ok(result) => result.map_err(RunError::Serve),
            Err(_) => Err(RunError::ShutdownTimeout(self.grace)),
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::routing::get;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    use super::*;

    async fn listener() -> TcpListener {
        TcpListener::bind("127.0.0.1:0").await.unwrap()
    }

    async fn send_get(addr: std::net::SocketAddr, path: &str) -> TcpStream {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();
        stream
    }

    #[tokio::test]
    async fn test_shutdown_without_connections() {
        let gateway = Gateway::new(Arc::new(Registry::new()), Duration::from_secs(5));
        let mut states = gateway.subscribe();
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        gateway
            .serve(listener().await, Router::new(), shutdown)
            .await
            .unwrap();

        assert_eq!(*states.borrow_and_update(), GatewayState::Stopped);
    }

    #[tokio::test]
    async fn test_shutdown_times_out_on_stuck_request() {
        let app = Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                "done"
            }),
        );
        let listener = listener().await;
        let addr = listener.local_addr().unwrap();
        let gateway = Gateway::new(Arc::new(Registry::new()), Duration::from_millis(200));
        let shutdown = CancellationToken::new();

        let trigger = shutdown.clone();
        let client = tokio::spawn(async move {
            let stream = send_get(addr, "/slow").await;
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
            stream
        });

        let result = gateway.serve(listener, app, shutdown).await;
        let _stream = client.await.unwrap();

        assert!(matches!(result, Err(RunError::ShutdownTimeout(_))));
    }

    #[tokio::test]
    async fn test_serve_response_before_shutdown() {
        let app = Router::new().route("/ping", get(|| async { "pong" }));
        let listener = listener().await;
        let addr = listener.local_addr().unwrap();
        let gateway = Gateway::new(Arc::new(Registry::new()), Duration::from_secs(5));
        let shutdown = CancellationToken::new();

        let trigger = shutdown.clone();
        let client = tokio::spawn(async move {
            let mut stream = send_get(addr, "/ping").await;
            let mut buf = vec![0; 1024];
            let n = stream.read(&mut buf).await.unwrap();
            trigger.cancel();
            String::from_utf8_lossy(&buf[..n]).into_owned()
        });

        gateway.serve(listener, app, shutdown).await.unwrap();
        let response = client.await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200 OK"));
    }
}
