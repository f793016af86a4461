use std::collections::HashSet;

/// One open websocket session: a stable client id and the set of stream
/// routes it is currently subscribed to.
///
/// Per `spec.md` §3's invariant, `subscribed_routes` changes only from
/// within this session's own receive loop — the registry never mutates it
/// directly, it only reads a snapshot for broadcast.
#[derive(Debug, Clone)]
pub struct StreamSession {
    client_id: u64,
    subscribed_routes: HashSet<String>,
}

impl StreamSession {
    /// Creates a fresh session with no subscriptions.
    pub fn new(client_id: u64) -> Self {
        Self {
            client_id,
            subscribed_routes: HashSet::new(),
        }
    }

    /// This session's stable client id.
    pub fn client_id(&self) -> u64 {
        self.client_id
    }

    /// Whether the session is currently subscribed to `route`.
    pub fn is_subscribed(&self, route: &str) -> bool {
        self.subscribed_routes.contains(route)
    }

    /// Subscribes to `route`.
    pub fn subscribe(&mut self, route: impl Into<String>) {
        self.subscribed_routes.insert(route.into());
    }

    /// Unsubscribes from `route`, returning whether the set is now empty.
    pub fn unsubscribe(&mut self, route: &str) -> bool {
        self.subscribed_routes.remove(route);
        self.subscribed_routes.is_empty()
    }

    /// A snapshot of every route currently subscribed.
    pub fn subscribed_routes(&self) -> impl Iterator<Item = &str> {
        self.subscribed_routes.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_then_unsubscribe_empties_the_set() {
        let mut session = StreamSession::new(1);
        session.subscribe("chat");
        assert!(session.is_subscribed("chat"));
        assert!(session.unsubscribe("chat"));
        assert!(!session.is_subscribed("chat"));
    }

    #[test]
    fn unsubscribe_keeps_other_routes() {
        let mut session = StreamSession::new(1);
        session.subscribe("chat");
        session.subscribe("presence");
        assert!(!session.unsubscribe("chat"));
        assert!(session.is_subscribed("presence"));
    }
}
