//! Client registry for live reload subscribers.
//!
//! Each streaming connection owns one [`Subscriber`]. The registry keeps the
//! sending half of every subscriber's single-slot queue together with its
//! cancellation token, so reloads can be fanned out without blocking and
//! every connection can be cancelled on shutdown.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

/// Opaque identity of a registered subscriber.
pub(crate) type SubscriberId = u64;

/// Something that can fan a message out to live reload clients.
///
/// The file watcher only depends on this, not on the registry itself.
pub(crate) trait Broadcast: Send + Sync {
    /// Deliver `message` to every client that has room for it.
    ///
    /// Returns the number of clients the message was queued for.
    fn broadcast(&self, message: &str) -> usize;
}

/// Sending side of a subscriber, owned by the registry.
struct ClientSlot {
    tx: mpsc::Sender<String>,
    cancel: CancellationToken,
}

/// Concurrency-safe set of active live reload subscribers.
pub(crate) struct Registry {
    clients: Mutex<HashMap<SubscriberId, ClientSlot>>,
    next_id: AtomicU64,
    shutdown: CancellationToken,
}

impl Registry {
    /// Create a registry with its own shutdown token.
    #[must_use]
    pub(crate) fn new() -> Self {
        Self::with_shutdown(CancellationToken::new())
    }

    /// Create a registry whose subscribers are cancelled along with `shutdown`.
    ///
    /// Subscribers get child tokens, so a connection registered after
    /// [`cancel_all`](Self::cancel_all) already ran is still cancelled.
    #[must_use]
    pub(crate) fn with_shutdown(shutdown: CancellationToken) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            shutdown,
        }
    }

    fn clients(&self) -> MutexGuard<'_, HashMap<SubscriberId, ClientSlot>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new subscriber.
    ///
    /// Every call creates a fresh identity. The returned subscriber
    /// unregisters itself when closed or dropped.
    pub(crate) fn register(self: &Arc<Self>) -> Subscriber {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(1);
        let cancel = self.shutdown.child_token();

        self.clients().insert(
            id,
            ClientSlot {
                tx,
                cancel: cancel.clone(),
            },
        );
        tracing::debug!(subscriber = id, "Live reload client registered");

        Subscriber {
            id,
            rx,
            cancel,
            registry: Arc::clone(self),
            state: Lifecycle::Serving,
        }
    }

    /// Remove a subscriber and release its resources.
    ///
    /// Dropping the registry's sender closes the subscriber's queue. Unknown
    /// ids are ignored.
    pub(crate) fn unregister(&self, id: SubscriberId) {
        let removed = self.clients().remove(&id);
        if let Some(slot) = removed {
            slot.cancel.cancel();
            tracing::debug!(subscriber = id, "Live reload client unregistered");
        }
    }

    /// Cancel every registered subscriber.
    ///
    /// Subscribers stay registered until their own serving loop observes the
    /// cancellation and closes.
    pub(crate) fn cancel_all(&self) {
        let clients = self.clients();
        for slot in clients.values() {
            slot.cancel.cancel();
        }
        tracing::info!(clients = clients.len(), "Cancelled live reload clients");
    }

    /// Number of registered subscribers.
    pub(crate) fn len(&self) -> usize {
        self.clients().len()
    }

    /// Whether no subscriber is registered.
    pub(crate) fn is_empty(&self) -> bool {
        self.clients().is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Broadcast for Registry {
    fn broadcast(&self, message: &str) -> usize {
        let clients = self.clients();
        let mut delivered = 0;

        for (id, slot) in clients.iter() {
            match slot.tx.try_send(message.to_owned()) {
                Ok(()) => delivered += 1,
                // A reload is already pending, this one adds nothing.
                Err(TrySendError::Full(_)) => {
                    tracing::trace!(subscriber = id, "Reload already pending, skipped");
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::trace!(subscriber = id, "Subscriber queue closed, skipped");
                }
            }
        }

        tracing::debug!(
            clients = clients.len(),
            delivered,
            msg = message,
            "Broadcast live reload message"
        );
        delivered
    }
}

/// Lifecycle of a subscriber's serving loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Lifecycle {
    /// Waiting for messages or cancellation.
    Serving,
    /// Releasing registry membership, queue and token.
    Closing,
    /// Fully released; yields nothing further.
    Closed,
}

/// Receiving side of one streaming connection.
pub(crate) struct Subscriber {
    id: SubscriberId,
    rx: mpsc::Receiver<String>,
    cancel: CancellationToken,
    registry: Arc<Registry>,
    state: Lifecycle,
}

impl Subscriber {
    /// Identity within the registry.
    pub(crate) fn id(&self) -> SubscriberId {
        self.id
    }

    /// Current lifecycle state.
    pub(crate) fn state(&self) -> Lifecycle {
        self.state
    }

    /// Wait for the next message.
    ///
    /// Returns `None` once the subscriber is cancelled or its queue is closed;
    /// the subscriber is closed at that point.
    pub(crate) async fn next_message(&mut self) -> Option<String> {
        if self.state != Lifecycle::Serving {
            return None;
        }

        let message = tokio::select! {
            biased;
            () = self.cancel.cancelled() => None,
            message = self.rx.recv() => message,
        };

        if message.is_none() {
            self.close();
        }
        message
    }

    /// Unregister, close the queue and cancel the token.
    ///
    /// Idempotent.
    pub(crate) fn close(&mut self) {
        if self.state != Lifecycle::Serving {
            return;
        }
        self.state = Lifecycle::Closing;
        self.registry.unregister(self.id);
        self.rx.close();
        self.cancel.cancel();
        self.state = Lifecycle::Closed;
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        if self.state == Lifecycle::Serving {
            // Body dropped by the transport: peer went away or a write failed.
            tracing::debug!(subscriber = self.id, "Live reload connection dropped");
        }
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;

    #[test]
    fn test_register_creates_fresh_identities() {
        let registry = Arc::new(Registry::new());

        let a = registry.register();
        let b = registry.register();

        assert_ne!(a.id(), b.id());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_drop_unregisters() {
        let registry = Arc::new(Registry::new());

        let subscriber = registry.register();
        assert_eq!(registry.len(), 1);

        drop(subscriber);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unregister_unknown_is_noop() {
        let registry = Arc::new(Registry::new());
        let subscriber = registry.register();

        registry.unregister(subscriber.id() + 100);
        registry.unregister(subscriber.id());
        registry.unregister(subscriber.id());

        assert!(registry.is_empty());
    }

    #[test]
    fn test_close_is_idempotent() {
        let registry = Arc::new(Registry::new());
        let mut subscriber = registry.register();

        subscriber.close();
        subscriber.close();

        assert_eq!(subscriber.state(), Lifecycle::Closed);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_broadcast_without_clients() {
        let registry = Registry::new();
        assert_eq!(registry.broadcast("reload"), 0);
    }

    #[tokio::test]
    async fn test_broadcast_delivers_to_every_client() {
        let registry = Arc::new(Registry::new());
        let mut a = registry.register();
        let mut b = registry.register();

        assert_eq!(registry.broadcast("reload"), 2);

        assert_eq!(a.next_message().await.as_deref(), Some("reload"));
        assert_eq!(b.next_message().await.as_deref(), Some("reload"));
    }

    #[tokio::test]
    async fn test_broadcast_coalesces_pending_reload() {
        let registry = Arc::new(Registry::new());
        let mut subscriber = registry.register();

        assert_eq!(registry.broadcast("reload"), 1);
        assert_eq!(registry.broadcast("reload"), 0);

        assert_eq!(subscriber.next_message().await.as_deref(), Some("reload"));
        let second = tokio::time::timeout(Duration::from_millis(50), subscriber.next_message()).await;
        assert!(second.is_err(), "only one reload should be pending");
    }

    #[tokio::test]
    async fn test_broadcast_after_read_delivers_again() {
        let registry = Arc::new(Registry::new());
        let mut subscriber = registry.register();

        registry.broadcast("reload");
        assert!(subscriber.next_message().await.is_some());

        assert_eq!(registry.broadcast("reload"), 1);
        assert!(subscriber.next_message().await.is_some());
    }

    #[test]
    fn test_broadcast_never_blocks_on_stalled_clients() {
        let registry = Arc::new(Registry::new());
        let stalled: Vec<_> = (0..1000).map(|_| registry.register()).collect();

        let start = Instant::now();
        for _ in 0..100 {
            registry.broadcast("reload");
        }

        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(stalled.len(), registry.len());
    }

    #[tokio::test]
    async fn test_cancel_all_keeps_membership_until_loops_close() {
        let registry = Arc::new(Registry::new());
        let mut a = registry.register();
        let mut b = registry.register();

        registry.cancel_all();
        assert_eq!(registry.len(), 2);

        assert_eq!(a.next_message().await, None);
        assert_eq!(b.next_message().await, None);
        assert_eq!(a.state(), Lifecycle::Closed);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_all_wins_over_pending_message() {
        let registry = Arc::new(Registry::new());
        let mut subscriber = registry.register();

        registry.broadcast("reload");
        registry.cancel_all();

        assert_eq!(subscriber.next_message().await, None);
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_root_cancellation() {
        let shutdown = CancellationToken::new();
        let registry = Arc::new(Registry::with_shutdown(shutdown.clone()));

        shutdown.cancel();
        registry.cancel_all();
        let mut late = registry.register();

        let next = tokio::time::timeout(Duration::from_secs(1), late.next_message()).await;
        assert_eq!(next.unwrap(), None);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_closed_subscriber_yields_nothing() {
        let registry = Arc::new(Registry::new());
        let mut subscriber = registry.register();

        subscriber.close();
        assert_eq!(registry.broadcast("reload"), 0);
        assert_eq!(subscriber.next_message().await, None);
    }
}
