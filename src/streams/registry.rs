use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ahash::AHashMap;
use tokio::sync::{mpsc, RwLock};

use super::message::{ServerPayload, StreamMessage};
use super::session::StreamSession;

type Outbox = mpsc::UnboundedSender<StreamMessage<ServerPayload>>;

struct Entry {
    session: StreamSession,
    outbox: Outbox,
}

/// Tracks active websocket sessions, the routes each has subscribed to,
/// and an outbound channel used to deliver `send`/`broadcast` frames
/// (`spec.md` §4.4, §5).
///
/// Backed by an `ahash` map behind an `RwLock`: inserts and removals take
/// the write lock briefly; broadcast takes a read lock just long enough to
/// clone the (small) set of matching outboxes, then sends outside the lock
/// — "permitting safe concurrent iteration returning a consistent snapshot"
/// per `spec.md` §5, without holding the lock across the sends themselves.
pub struct StreamRegistry {
    sessions: RwLock<AHashMap<u64, Entry>>,
    next_client_id: AtomicU64,
}

impl StreamRegistry {
    /// An empty registry. Client ids are assigned starting at 1 and are
    /// never reused within this registry's lifetime.
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(AHashMap::new()),
            next_client_id: AtomicU64::new(1),
        }
    }

    /// Allocates a fresh client id and registers a new, unsubscribed
    /// session for it.
    pub async fn register(&self, outbox: Outbox) -> u64 {
        let client_id = self.next_client_id.fetch_add(1, Ordering::Relaxed);
        let entry = Entry {
            session: StreamSession::new(client_id),
            outbox,
        };
        self.sessions.write().await.insert(client_id, entry);
        client_id
    }

    /// Removes a session from the registry (on websocket close).
    pub async fn remove(&self, client_id: u64) {
        self.sessions.write().await.remove(&client_id);
    }

    /// Marks `route` as subscribed for `client_id`.
    pub async fn subscribe(&self, client_id: u64, route: &str) {
        if let Some(entry) = self.sessions.write().await.get_mut(&client_id) {
            entry.session.subscribe(route);
        }
    }

    /// Unsubscribes `client_id` from `route`, returning whether the
    /// session's subscription set is now empty.
    pub async fn unsubscribe(&self, client_id: u64, route: &str) -> bool {
        match self.sessions.write().await.get_mut(&client_id) {
            Some(entry) => entry.session.unsubscribe(route),
            None => true,
        }
    }

    /// Whether `client_id` is currently subscribed to `route`.
    pub async fn is_subscribed(&self, client_id: u64, route: &str) -> bool {
        self.sessions
            .read()
            .await
            .get(&client_id)
            .is_some_and(|entry| entry.session.is_subscribed(route))
    }

    /// A snapshot of every route still subscribed for `client_id`, used to
    /// synthesize `ClientDisconnected` events on session teardown
    /// (`spec.md` §4.4.1).
    pub async fn subscribed_routes(&self, client_id: u64) -> Vec<String> {
        self.sessions
            .read()
            .await
            .get(&client_id)
            .map(|entry| entry.session.subscribed_routes().map(String::from).collect())
            .unwrap_or_default()
    }

    /// Sends `message` to exactly one session's outbox.
    pub async fn send_to(&self, client_id: u64, message: StreamMessage<ServerPayload>) {
        if let Some(entry) = self.sessions.read().await.get(&client_id) {
            let _ = entry.outbox.send(message);
        }
    }

    /// Sends `message` to every session subscribed to `message.route` for
    /// which `filter(client_id)` returns true. Visits a snapshot of the
    /// registry; concurrent registrations or removals are safe but not
    /// observed atomically (`spec.md` §4.4.3).
    pub async fn broadcast(
        &self,
        route: &str,
        message: StreamMessage<ServerPayload>,
        filter: impl Fn(u64) -> bool,
    ) {
        let targets: Vec<Outbox> = {
            let sessions = self.sessions.read().await;
            sessions
                .values()
                .filter(|entry| entry.session.is_subscribed(route) && filter(entry.session.client_id()))
                .map(|entry| entry.outbox.clone())
                .collect()
        };
        for outbox in targets {
            let _ = outbox.send(message.clone());
        }
    }
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn client_ids_are_monotonic_and_unique() {
        let registry = StreamRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let a = registry.register(tx.clone()).await;
        let b = registry.register(tx).await;
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[tokio::test]
    async fn broadcast_respects_subscription_and_filter() {
        let registry = StreamRegistry::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        let (tx3, mut rx3) = mpsc::unbounded_channel();
        let id1 = registry.register(tx1).await;
        let id2 = registry.register(tx2).await;
        let id3 = registry.register(tx3).await;
        registry.subscribe(id1, "chat").await;
        registry.subscribe(id2, "chat").await;
        registry.subscribe(id3, "chat").await;

        registry
            .broadcast("chat", StreamMessage::text("chat", "hello"), |id| id != id2)
            .await;

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_err());
        assert!(rx3.try_recv().is_ok());
    }

    #[tokio::test]
    async fn subscribed_routes_empties_after_unsubscribe() {
        let registry = StreamRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let id = registry.register(tx).await;
        registry.subscribe(id, "chat").await;
        assert_eq!(registry.subscribed_routes(id).await, vec!["chat".to_string()]);
        assert!(registry.unsubscribe(id, "chat").await);
        assert!(registry.subscribed_routes(id).await.is_empty());
    }
}
