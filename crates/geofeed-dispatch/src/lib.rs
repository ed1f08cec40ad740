//! Per-entity signal dispatch for the feed entity manager
//!
//! The reconciliation engine tells one specific entity proxy to refresh or
//! remove itself through this dispatcher. Signals are keyed by a typed
//! (kind, external_id) pair rather than formatted signal-name strings, so a
//! typo cannot silently dispatch into the void, and delivery is an O(1)
//! map lookup instead of a broadcast scan.

use dashmap::DashMap;
use geofeed_core::ExternalId;
use tokio::sync::broadcast;
use tracing::trace;

/// Default per-signal channel capacity
const DEFAULT_CHANNEL_CAPACITY: usize = 16;

/// The kind of per-entity signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    /// The record behind the entity changed; re-read the snapshot
    Updated,
    /// The record disappeared; the entity must remove itself
    Deleted,
}

/// Typed per-entity pub/sub
///
/// One broadcast channel per (kind, external_id) pair. Sending to a key
/// nobody is connected to is a no-op, which is what makes re-delivered
/// deletion signals harmless after a proxy has disconnected.
pub struct SignalDispatcher {
    channels: DashMap<(SignalKind, ExternalId), broadcast::Sender<()>>,
    capacity: usize,
}

impl SignalDispatcher {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity,
        }
    }

    /// Subscribe to a signal for one external id
    pub fn connect(&self, kind: SignalKind, id: &ExternalId) -> broadcast::Receiver<()> {
        trace!(?kind, external_id = %id, "Connecting signal");
        self.channels
            .entry((kind, id.clone()))
            .or_insert_with(|| {
                let (tx, _) = broadcast::channel(self.capacity);
                tx
            })
            .subscribe()
    }

    /// Send a signal to one external id
    ///
    /// Returns the number of receivers the signal reached; zero when the
    /// id has no connected subscriber (already disconnected or never
    /// created), which callers treat as a no-op rather than an error.
    pub fn send(&self, kind: SignalKind, id: &ExternalId) -> usize {
        match self.channels.get(&(kind, id.clone())) {
            Some(sender) => sender.send(()).unwrap_or(0),
            None => {
                trace!(?kind, external_id = %id, "Signal has no subscribers, dropped");
                0
            }
        }
    }

    /// Tear down the channel for one (kind, id) pair
    ///
    /// After this, `send` for the pair is guaranteed to reach nobody. Called
    /// by a proxy before it requests its own removal from the host.
    pub fn disconnect(&self, kind: SignalKind, id: &ExternalId) {
        trace!(?kind, external_id = %id, "Disconnecting signal");
        self.channels.remove(&(kind, id.clone()));
    }

    /// Number of live channels, across both signal kinds
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

impl Default for SignalDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_and_send() {
        let dispatcher = SignalDispatcher::new();
        let id = ExternalId::new("a");
        let mut rx = dispatcher.connect(SignalKind::Updated, &id);

        assert_eq!(dispatcher.send(SignalKind::Updated, &id), 1);
        rx.recv().await.unwrap();
    }

    #[tokio::test]
    async fn test_send_without_subscriber_is_noop() {
        let dispatcher = SignalDispatcher::new();
        assert_eq!(dispatcher.send(SignalKind::Deleted, &ExternalId::new("ghost")), 0);
    }

    #[tokio::test]
    async fn test_signals_are_scoped_per_id() {
        let dispatcher = SignalDispatcher::new();
        let a = ExternalId::new("a");
        let b = ExternalId::new("b");
        let mut rx_a = dispatcher.connect(SignalKind::Updated, &a);
        let mut rx_b = dispatcher.connect(SignalKind::Updated, &b);

        dispatcher.send(SignalKind::Updated, &a);

        rx_a.recv().await.unwrap();
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_kinds_are_independent() {
        let dispatcher = SignalDispatcher::new();
        let id = ExternalId::new("a");
        let mut updated = dispatcher.connect(SignalKind::Updated, &id);
        let mut deleted = dispatcher.connect(SignalKind::Deleted, &id);

        dispatcher.send(SignalKind::Deleted, &id);

        deleted.recv().await.unwrap();
        assert!(updated.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_after_disconnect_reaches_nobody() {
        let dispatcher = SignalDispatcher::new();
        let id = ExternalId::new("a");
        let _rx = dispatcher.connect(SignalKind::Deleted, &id);

        dispatcher.disconnect(SignalKind::Deleted, &id);

        assert_eq!(dispatcher.send(SignalKind::Deleted, &id), 0);
        assert_eq!(dispatcher.channel_count(), 0);
    }
}
