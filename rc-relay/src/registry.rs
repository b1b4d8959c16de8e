//! Set of connected peers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, Notify};
use tracing::debug;

pub type PeerId = u64;

/// Outbound queues of all connected peers, keyed by id.
#[derive(Default)]
pub struct PeerRegistry {
    peers: Mutex<HashMap<PeerId, mpsc::UnboundedSender<String>>>,
    next_id: AtomicU64,
    /// Connection tasks still running, registered or not.
    open: AtomicUsize,
    drained: Notify,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a peer and return its id.
    pub fn add(&self, outbound: mpsc::UnboundedSender<String>) -> PeerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.lock().insert(id, outbound);
        id
    }

    pub fn remove(&self, id: PeerId) {
        self.lock().remove(&id);
    }

    /// Queue `text` for every peer, skipping `from` unless `include_sender`.
    /// Returns the number of peers it was queued for.
    pub fn broadcast(&self, from: PeerId, text: &str, include_sender: bool) -> usize {
        let mut peers = self.lock();
        peers.retain(|_, tx| !tx.is_closed());

        let mut delivered = 0;
        for (id, tx) in peers.iter() {
            if *id == from && !include_sender {
                continue;
            }
            if tx.send(text.to_string()).is_ok() {
                delivered += 1;
            }
        }
        debug!("relayed frame from peer {from} to {delivered} peer(s)");
        delivered
    }

    /// Drop every peer's queue, which closes their connections.
    pub fn disconnect_all(&self) -> usize {
        let mut peers = self.lock();
        let count = peers.len();
        peers.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Count a connection as open until the returned guard is dropped.
    pub fn track(self: &Arc<Self>) -> ConnectionGuard {
        self.open.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard {
            registry: Arc::clone(self),
        }
    }

    pub fn open_connections(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    /// Wait up to `limit` for every tracked connection to finish.
    /// Returns false if some were still open.
    pub async fn wait_closed(&self, limit: Duration) -> bool {
        let all_closed = async {
            loop {
                let drained = self.drained.notified();
                if self.open_connections() == 0 {
                    return;
                }
                drained.await;
            }
        };
        tokio::time::timeout(limit, all_closed).await.is_ok()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PeerId, mpsc::UnboundedSender<String>>> {
        self.peers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Keeps one connection counted as open.
pub struct ConnectionGuard {
    registry: Arc<PeerRegistry>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if self.registry.open.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.registry.drained.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_assigns_distinct_ids() {
        let registry = PeerRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let a = registry.add(tx.clone());
        let b = registry.add(tx);
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);

        registry.remove(a);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_broadcast_respects_include_sender() {
        let registry = PeerRegistry::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let a = registry.add(tx_a);
        registry.add(tx_b);

        assert_eq!(registry.broadcast(a, "one", true), 2);
        assert_eq!(rx_a.try_recv().unwrap(), "one");
        assert_eq!(rx_b.try_recv().unwrap(), "one");

        assert_eq!(registry.broadcast(a, "two", false), 1);
        assert!(rx_a.try_recv().is_err());
        assert_eq!(rx_b.try_recv().unwrap(), "two");
    }

    #[test]
    fn test_broadcast_forgets_closed_peers() {
        let registry = PeerRegistry::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let (tx_live, _rx_live) = mpsc::unbounded_channel();
        registry.add(tx);
        let live = registry.add(tx_live);
        drop(rx);

        assert_eq!(registry.broadcast(live, "x", true), 1);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_closed_tracks_guards() {
        let registry = Arc::new(PeerRegistry::new());
        assert!(registry.wait_closed(Duration::from_secs(1)).await);

        let first = registry.track();
        let second = registry.track();
        assert_eq!(registry.open_connections(), 2);
        assert!(!registry.wait_closed(Duration::from_secs(1)).await);

        drop(first);
        let waiter = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.wait_closed(Duration::from_secs(10)).await })
        };
        tokio::time::sleep(Duration::from_secs(2)).await;
        drop(second);
        assert!(waiter.await.unwrap());
        assert_eq!(registry.open_connections(), 0);
    }

    #[test]
    fn test_disconnect_all() {
        let registry = PeerRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        registry.add(tx);
        assert_eq!(registry.disconnect_all(), 1);
        assert!(registry.is_empty());
        assert!(rx.try_recv().is_err());
    }
}
