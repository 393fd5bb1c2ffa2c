//! Channel abstraction for peer links.
//!
//! The sync manager never owns sockets. It hands encoded messages to a
//! [`SyncChannel`] and is fed received bytes through
//! [`SyncManager::on_bytes_received`](crate::SyncManager::on_bytes_received).

use crate::error::{SyncError, SyncResult};
use crate::peer::PeerId;
use parking_lot::{Mutex, RwLock};
use sharetree_codec::Bytes;
use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc::UnboundedSender;

/// Delivers encoded messages to peers.
pub trait SyncChannel: Send + Sync {
    /// Sends `bytes` to `peer`.
    fn send(&self, peer: PeerId, bytes: Bytes) -> SyncResult<()>;
}

impl<T: SyncChannel + ?Sized> SyncChannel for std::sync::Arc<T> {
    fn send(&self, peer: PeerId, bytes: Bytes) -> SyncResult<()> {
        (**self).send(peer, bytes)
    }
}

/// A channel that records every send, for tests.
#[derive(Debug, Default)]
pub struct MockChannel {
    sent: Mutex<Vec<(PeerId, Bytes)>>,
    down: Mutex<HashSet<PeerId>>,
}

impl MockChannel {
    /// Creates a new mock channel.
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes everything sent so far.
    pub fn take_sent(&self) -> Vec<(PeerId, Bytes)> {
        std::mem::take(&mut *self.sent.lock())
    }

    /// Number of messages sent and not yet taken.
    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    /// Makes sends to `peer` fail (or succeed again).
    pub fn set_down(&self, peer: PeerId, down: bool) {
        let mut set = self.down.lock();
        if down {
            set.insert(peer);
        } else {
            set.remove(&peer);
        }
    }
}

impl SyncChannel for MockChannel {
    fn send(&self, peer: PeerId, bytes: Bytes) -> SyncResult<()> {
        if self.down.lock().contains(&peer) {
            return Err(SyncError::channel_retryable(format!("peer {peer} unreachable")));
        }
        self.sent.lock().push((peer, bytes));
        Ok(())
    }
}

/// A channel backed by tokio unbounded senders, one route per peer.
///
/// Each route delivers `(sender, bytes)` so the receiving task knows which
/// of its connections the bytes arrived on.
#[derive(Debug)]
pub struct MpscChannel {
    local: PeerId,
    routes: RwLock<HashMap<PeerId, UnboundedSender<(PeerId, Bytes)>>>,
}

impl MpscChannel {
    /// Creates a channel for the node known to its peers as `local`.
    pub fn new(local: PeerId) -> Self {
        Self {
            local,
            routes: RwLock::new(HashMap::new()),
        }
    }

    /// Adds or replaces the route to `peer`.
    pub fn add_route(&self, peer: PeerId, tx: UnboundedSender<(PeerId, Bytes)>) {
        self.routes.write().insert(peer, tx);
    }

    /// Removes the route to `peer`.
    pub fn remove_route(&self, peer: PeerId) -> bool {
        self.routes.write().remove(&peer).is_some()
    }
}

impl SyncChannel for MpscChannel {
    fn send(&self, peer: PeerId, bytes: Bytes) -> SyncResult<()> {
        let routes = self.routes.read();
        let tx = routes
            .get(&peer)
            .ok_or_else(|| SyncError::channel_fatal(format!("no route to peer {peer}")))?;
        tx.send((self.local, bytes))
            .map_err(|_| SyncError::channel_fatal(format!("link to peer {peer} closed")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_channel_records_sends() {
        let channel = MockChannel::new();
        channel.send(PeerId(1), Bytes::from_static(b"a")).unwrap();
        channel.send(PeerId(2), Bytes::from_static(b"b")).unwrap();
        assert_eq!(channel.sent_count(), 2);

        let sent = channel.take_sent();
        assert_eq!(sent[0].0, PeerId(1));
        assert_eq!(sent[1].1, Bytes::from_static(b"b"));
        assert_eq!(channel.sent_count(), 0);
    }

    #[test]
    fn mock_channel_down_peer() {
        let channel = MockChannel::new();
        channel.set_down(PeerId(1), true);
        let err = channel.send(PeerId(1), Bytes::new()).unwrap_err();
        assert!(err.is_retryable());
        channel.set_down(PeerId(1), false);
        assert!(channel.send(PeerId(1), Bytes::new()).is_ok());
    }

    #[test]
    fn mpsc_channel_routes_with_sender_id() {
        let channel = MpscChannel::new(PeerId(9));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        channel.add_route(PeerId(1), tx);

        channel.send(PeerId(1), Bytes::from_static(b"hi")).unwrap();
        let (from, bytes) = rx.try_recv().unwrap();
        assert_eq!(from, PeerId(9));
        assert_eq!(bytes, Bytes::from_static(b"hi"));

        assert!(channel.send(PeerId(2), Bytes::new()).is_err());
        drop(rx);
        assert!(channel.send(PeerId(1), Bytes::new()).is_err());
        assert!(channel.remove_route(PeerId(1)));
    }
}
