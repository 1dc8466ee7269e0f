//! Server-sent events endpoint for live reload.
//!
//! Each connection registers one subscriber and streams every message it
//! receives as a `data:` frame until the subscriber is cancelled or the
//! client goes away.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures_util::stream::{self, Stream};

use super::registry::Subscriber;
use crate::state::AppState;

/// Handle GET /__livereload.
pub(crate) async fn sse_handler(State(state): State<Arc<AppState>>) -> Response {
    let Some(ref live_reload) = state.live_reload else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let subscriber = live_reload.registry.register();
    tracing::debug!(subscriber = subscriber.id(), "Live reload client connected");

    let headers = [(header::CONNECTION, "keep-alive")];
    let sse = Sse::new(event_stream(subscriber));
    match live_reload.keep_alive {
        Some(interval) => (headers, sse.keep_alive(KeepAlive::new().interval(interval))).into_response(),
        None => (headers, sse).into_response(),
    }
}

/// Turn a subscriber into a stream of SSE frames.
///
/// The stream ends when the subscriber closes. If the transport drops the
/// stream first, dropping the subscriber closes it.
fn event_stream(subscriber: Subscriber) -> impl Stream<Item = Result<Event, Infallible>> + Send {
    stream::unfold(subscriber, |mut subscriber| async move {
        let message = subscriber.next_message().await?;
        tracing::debug!(subscriber = subscriber.id(), "Sending live reload event");
        Some((Ok::<_, Infallible>(Event::default().data(message)), subscriber))
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures_util::StreamExt;

    use super::*;
    use crate::live_reload::{Broadcast, Registry};

    #[tokio::test]
    async fn test_event_stream_yields_delivered_messages() {
        let registry = Arc::new(Registry::new());
        let stream = event_stream(registry.register());
        tokio::pin!(stream);

        registry.broadcast("reload");

        let event = stream.next().await;
        assert!(matches!(event, Some(Ok(_))));
    }

    #[tokio::test]
    async fn test_event_stream_ends_on_cancel() {
        let registry = Arc::new(Registry::new());
        let stream = event_stream(registry.register());
        tokio::pin!(stream);

        registry.cancel_all();

        let next = tokio::time::timeout(Duration::from_secs(1), stream.next()).await;
        assert!(next.unwrap().is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_dropping_stream_unregisters() {
        let registry = Arc::new(Registry::new());
        let stream = event_stream(registry.register());
        assert_eq!(registry.len(), 1);

        drop(stream);
        assert!(registry.is_empty());
    }
}
