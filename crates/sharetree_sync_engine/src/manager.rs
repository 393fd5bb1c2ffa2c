//! The sync manager.
//!
//! A `SyncManager` connects one [`SyncContext`](sharetree_core::SyncContext)
//! to any number of peers. Each call to [`update`](SyncManager::update)
//! runs one exchange round:
//!
//! 1. Local operations drained from the context are queued on every
//!    active link.
//! 2. Received messages are processed per link, in arrival order. An
//!    identity completes the handshake and queues the whole local tree to
//!    that peer. Each incoming operation is transformed against the link's
//!    outstanding operations, applied, and queued on every other link.
//! 3. Queued operations (or a lone Ack) are sent in batches.
//! 4. Parked remote operations spend one retry tick.

use crate::channel::SyncChannel;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::peer::{LinkState, PeerId, RemotePeer};
use sharetree_codec::Bytes;
use sharetree_core::{OwnerFilter, SharedContext, SyncContext};
use sharetree_protocol::{
    AuthorityLevel, IdentityInfo, Operation, Ranks, Sequence, SyncMessage, VersionedOp,
};
use tracing::{debug, info, warn};

/// Counters for one manager.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Completed `update` rounds.
    pub updates: u64,
    /// Messages sent.
    pub messages_sent: u64,
    /// Messages received and decoded.
    pub messages_received: u64,
    /// Non-Ack operations received in sequence.
    pub ops_received: u64,
    /// Operations queued to peers, forwards and catch-up included.
    pub ops_queued: u64,
    /// Applied remote operations relayed to other peers.
    pub ops_forwarded: u64,
    /// Messages that failed to decode.
    pub decode_errors: u64,
    /// Operations dropped as duplicates or after a sequence gap.
    pub sequence_errors: u64,
    /// Refused identities.
    pub handshake_failures: u64,
    /// Failed sends.
    pub send_failures: u64,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Summary of one [`SyncManager::update`] round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateResult {
    /// Operations received from peers.
    pub received: usize,
    /// Operations that changed the local tree.
    pub applied: usize,
    /// Messages sent.
    pub sent: usize,
    /// Parked operations that expired.
    pub expired: usize,
}

/// Exchanges operations between a context and its peers.
pub struct SyncManager<C: SyncChannel> {
    config: SyncConfig,
    context: SharedContext,
    channel: C,
    peers: Vec<RemotePeer>,
    stats: SyncStats,
}

impl<C: SyncChannel> SyncManager<C> {
    /// Creates a manager for `context` sending through `channel`.
    pub fn new(config: SyncConfig, context: SharedContext, channel: C) -> Self {
        Self {
            config,
            context,
            channel,
            peers: Vec::new(),
            stats: SyncStats::default(),
        }
    }

    /// The managed context.
    pub fn context(&self) -> &SharedContext {
        &self.context
    }

    /// The channel.
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// The configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Current counters.
    pub fn stats(&self) -> SyncStats {
        self.stats.clone()
    }

    /// Connected peer ids, in connection order.
    pub fn peer_ids(&self) -> Vec<PeerId> {
        self.peers.iter().map(|p| p.id).collect()
    }

    /// Handshake state of a link.
    pub fn link_state(&self, peer: PeerId) -> Option<LinkState> {
        self.peer(peer).map(|p| p.state)
    }

    /// Identity announced by a peer, once received.
    pub fn peer_identity(&self, peer: PeerId) -> Option<&IdentityInfo> {
        self.peer(peer).and_then(|p| p.identity.as_ref())
    }

    fn peer(&self, id: PeerId) -> Option<&RemotePeer> {
        self.peers.iter().find(|p| p.id == id)
    }

    fn identity(&self, ctx: &SyncContext) -> IdentityInfo {
        let mut info = IdentityInfo::new(
            ctx.authority(),
            ctx.system_id(),
            ctx.local_user(),
            self.config.user_name.clone(),
        );
        info.protocol_version = self.config.protocol_version;
        info
    }

    /// Opens a link and sends our identity on it.
    ///
    /// # Errors
    ///
    /// `DuplicatePeer` if the id is in use; channel and codec errors from
    /// sending the identity.
    pub fn add_connection(&mut self, peer: PeerId) -> SyncResult<()> {
        if self.peer(peer).is_some() {
            return Err(SyncError::DuplicatePeer(peer));
        }
        let identity = self.context.read(|ctx| self.identity(ctx));
        let bytes = SyncMessage::Identity(identity).encode()?;
        self.peers.push(RemotePeer::new(peer));
        info!(peer = %peer, "connection added");
        self.send(peer, bytes)
    }

    /// Closes a link and removes owned elements that should not outlive it.
    ///
    /// A High authority peer removes the elements owned by the departed
    /// user. A Medium authority peer losing a link to its own user keeps
    /// everything. Otherwise, if purging is enabled, every element owned by
    /// anyone but the local user is removed. The deletes are queued for the
    /// remaining peers. Returns the number of removed subtrees.
    ///
    /// # Errors
    ///
    /// `UnknownPeer` if there is no such link.
    pub fn remove_connection(&mut self, peer: PeerId) -> SyncResult<usize> {
        let index = self
            .peers
            .iter()
            .position(|p| p.id == peer)
            .ok_or(SyncError::UnknownPeer(peer))?;
        let removed = self.peers.remove(index);
        info!(peer = %peer, "connection removed");

        if removed.state != LinkState::Active {
            return Ok(0);
        }
        let Some(identity) = removed.identity else {
            return Ok(0);
        };
        let purge = self.config.purge_on_disconnect;
        let count = self.context.write(|ctx| {
            let filter = match ctx.authority() {
                AuthorityLevel::High => Some(OwnerFilter::Only(identity.user_id)),
                AuthorityLevel::Medium if identity.user_id == ctx.local_user() => None,
                _ if purge => Some(OwnerFilter::AllExcept(ctx.local_user())),
                _ => None,
            };
            filter.map_or(0, |filter| ctx.remove_owned(filter))
        });
        if count > 0 {
            debug!(peer = %peer, user = %identity.user_id, removed = count, "removed owned data");
        }
        Ok(count)
    }

    /// Queues bytes received from `peer` for the next update.
    ///
    /// # Errors
    ///
    /// `UnknownPeer` if there is no such link.
    pub fn on_bytes_received(&mut self, peer: PeerId, bytes: Bytes) -> SyncResult<()> {
        let link = self
            .peers
            .iter_mut()
            .find(|p| p.id == peer)
            .ok_or(SyncError::UnknownPeer(peer))?;
        link.incoming.push_back(bytes);
        Ok(())
    }

    /// Runs one exchange round.
    pub fn update(&mut self) -> UpdateResult {
        let mut result = UpdateResult::default();
        let context = self.context.clone();
        let mut ctx = context.lock();

        let local = ctx.drain_outbound();
        if !local.is_empty() {
            for peer in self.peers.iter_mut().filter(|p| p.is_active()) {
                for op in &local {
                    peer.oplog.record_outgoing(op.clone());
                    self.stats.ops_queued += 1;
                }
            }
        }

        for index in 0..self.peers.len() {
            let incoming = std::mem::take(&mut self.peers[index].incoming);
            for bytes in incoming {
                self.process_message(&mut ctx, index, &bytes, &mut result);
            }
        }

        for index in 0..self.peers.len() {
            if self.peers[index].is_active() {
                self.flush(index, ctx.authority(), &mut result);
            }
        }

        result.expired = ctx.retry_pending();
        self.stats.updates += 1;
        result
    }

    /// Whether every link is active, nothing is queued or unacknowledged in
    /// either direction, and the context has no pending work.
    pub fn is_fully_synced(&self) -> bool {
        let ctx_idle = self
            .context
            .read(|ctx| ctx.outbound_len() == 0 && ctx.pending_len() == 0);
        ctx_idle
            && self
                .peers
                .iter()
                .all(|p| p.is_active() && p.incoming.is_empty() && p.oplog.is_settled())
    }

    fn process_message(&mut self, ctx: &mut SyncContext, index: usize, bytes: &[u8], result: &mut UpdateResult) {
        let peer_id = self.peers[index].id;
        if self.peers[index].state == LinkState::Rejected {
            return;
        }
        let message = match SyncMessage::decode_with(ctx.operation_factory(), bytes) {
            Ok(message) => message,
            Err(err) => {
                warn!(peer = %peer_id, error = %err, "dropping undecodable message");
                self.stats.decode_errors += 1;
                self.stats.last_error = Some(err.to_string());
                return;
            }
        };
        self.stats.messages_received += 1;

        match message {
            SyncMessage::Identity(info) => self.handshake(ctx, index, info),
            SyncMessage::Changes(ops) => {
                if !self.peers[index].is_active() {
                    warn!(peer = %peer_id, "changes received before identity");
                    self.stats.sequence_errors += ops.len() as u64;
                    return;
                }
                for versioned in ops {
                    self.receive_op(ctx, index, versioned, result);
                }
            }
        }
    }

    fn handshake(&mut self, ctx: &mut SyncContext, index: usize, info: IdentityInfo) {
        let peer_id = self.peers[index].id;
        let refusal = if info.protocol_version != self.config.protocol_version {
            Some(SyncError::VersionMismatch {
                local: self.config.protocol_version,
                remote: info.protocol_version,
            })
        } else if info.system_id == ctx.system_id()
            || self.peers.iter().enumerate().any(|(i, p)| {
                i != index && p.identity.as_ref().is_some_and(|other| other.system_id == info.system_id)
            })
        {
            Some(SyncError::DuplicateSystemId {
                system: info.system_id,
            })
        } else {
            None
        };

        let peer = &mut self.peers[index];
        if let Some(err) = refusal {
            warn!(peer = %peer_id, error = %err, "identity refused");
            peer.state = LinkState::Rejected;
            self.stats.handshake_failures += 1;
            self.stats.last_error = Some(err.to_string());
            return;
        }

        info!(
            peer = %peer_id,
            user = %info.user_name,
            system = %info.system_id,
            authority = %info.authority,
            "handshake complete"
        );
        peer.identity = Some(info);
        peer.state = LinkState::Active;
        peer.oplog.reset();
        for op in ctx.starting_state() {
            peer.oplog.record_outgoing(op);
            self.stats.ops_queued += 1;
        }
    }

    fn receive_op(&mut self, ctx: &mut SyncContext, index: usize, versioned: VersionedOp, result: &mut UpdateResult) {
        let peer = &mut self.peers[index];
        let Some(rank) = peer.rank() else { return };

        if versioned.op.is_ack() {
            peer.oplog.acknowledge(versioned.state);
            return;
        }
        match peer.oplog.check_sequence(&versioned) {
            Sequence::InOrder => {}
            Sequence::Duplicate => {
                debug!(peer = %peer.id, "ignoring duplicate operation");
                self.stats.sequence_errors += 1;
                return;
            }
            Sequence::Gap { expected, got } => {
                warn!(peer = %peer.id, expected, got, "operation sequence gap");
                self.stats.sequence_errors += 1;
                return;
            }
        }

        peer.oplog.acknowledge(versioned.state);
        let op = ctx.transforms().transform_against(
            peer.oplog.outstanding_ops_mut(),
            versioned.op,
            Ranks::new(ctx.rank(), rank),
        );
        peer.oplog.mark_received();
        self.stats.ops_received += 1;
        result.received += 1;

        let applied = ctx.receive_remote(op, rank);
        result.applied += applied.len();
        for remote in applied {
            let forwarded: Operation = remote.op.with_authority(ctx.authority());
            for other in self
                .peers
                .iter_mut()
                .filter(|p| p.is_active() && p.rank() != Some(remote.from))
            {
                other.oplog.record_outgoing(forwarded.clone());
                self.stats.ops_queued += 1;
                self.stats.ops_forwarded += 1;
            }
        }
    }

    fn flush(&mut self, index: usize, authority: AuthorityLevel, result: &mut UpdateResult) {
        loop {
            let peer = &mut self.peers[index];
            let batch = peer.oplog.take_batch(self.config.max_ops_per_message, authority);
            if batch.is_empty() {
                return;
            }
            let peer_id = peer.id;
            let sent = SyncMessage::Changes(batch)
                .encode()
                .map_err(SyncError::from)
                .and_then(|bytes| self.send(peer_id, bytes));
            match sent {
                Ok(()) => result.sent += 1,
                Err(err) => {
                    warn!(peer = %peer_id, error = %err, "send failed");
                    self.stats.last_error = Some(err.to_string());
                    return;
                }
            }
        }
    }

    fn send(&mut self, peer: PeerId, bytes: Bytes) -> SyncResult<()> {
        match self.channel.send(peer, bytes) {
            Ok(()) => {
                self.stats.messages_sent += 1;
                Ok(())
            }
            Err(err) => {
                self.stats.send_failures += 1;
                Err(err)
            }
        }
    }
}

impl<C: SyncChannel> std::fmt::Debug for SyncManager<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncManager")
            .field("peers", &self.peer_ids())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MockChannel;
    use sharetree_core::ContextConfig;
    use sharetree_protocol::{ElementKind, SystemId, UserId};
    use std::sync::Arc;

    fn manager(system: u32, authority: AuthorityLevel) -> SyncManager<Arc<MockChannel>> {
        let ctx = SyncContext::new(
            ContextConfig::new()
                .with_system_id(SystemId::new(system).unwrap())
                .with_authority(authority)
                .with_local_user(UserId(system)),
        );
        SyncManager::new(
            SyncConfig::new(format!("user{system}")),
            SharedContext::new(ctx),
            Arc::new(MockChannel::new()),
        )
    }

    /// Moves everything `from` has sent into `to`'s link with id `link`.
    fn pump(from: &SyncManager<Arc<MockChannel>>, to: &mut SyncManager<Arc<MockChannel>>, link: PeerId) {
        for (_, bytes) in from.channel().take_sent() {
            to.on_bytes_received(link, bytes).unwrap();
        }
    }

    fn connect() -> (SyncManager<Arc<MockChannel>>, SyncManager<Arc<MockChannel>>) {
        let mut a = manager(1, AuthorityLevel::High);
        let mut b = manager(2, AuthorityLevel::Low);
        a.add_connection(PeerId(2)).unwrap();
        b.add_connection(PeerId(1)).unwrap();
        pump(&a, &mut b, PeerId(1));
        pump(&b, &mut a, PeerId(2));
        (a, b)
    }

    fn settle(a: &mut SyncManager<Arc<MockChannel>>, b: &mut SyncManager<Arc<MockChannel>>) {
        for _ in 0..8 {
            a.update();
            b.update();
            pump(a, b, PeerId(1));
            pump(b, a, PeerId(2));
        }
    }

    #[test]
    fn add_connection_sends_identity() {
        let mut a = manager(1, AuthorityLevel::Low);
        a.add_connection(PeerId(5)).unwrap();
        let sent = a.channel().take_sent();
        assert_eq!(sent.len(), 1);
        let SyncMessage::Identity(info) = SyncMessage::decode(&sent[0].1).unwrap() else {
            panic!("expected identity");
        };
        assert_eq!(info.system_id.as_u32(), 1);
        assert_eq!(info.user_name, "user1");
        assert_eq!(a.link_state(PeerId(5)), Some(LinkState::AwaitingIdentity));
        assert!(matches!(a.add_connection(PeerId(5)), Err(SyncError::DuplicatePeer(_))));
    }

    #[test]
    fn handshake_activates_links() {
        let (mut a, mut b) = connect();
        a.update();
        b.update();
        assert_eq!(a.link_state(PeerId(2)), Some(LinkState::Active));
        assert_eq!(b.peer_identity(PeerId(1)).unwrap().user_name, "user1");
    }

    #[test]
    fn changes_replicate_and_settle() {
        let (mut a, mut b) = connect();
        settle(&mut a, &mut b);
        let id = a
            .context()
            .write(|ctx| {
                let root = ctx.root_id();
                ctx.create_child(root, ElementKind::Int32, "score", None, Some(3.into()))
            })
            .unwrap();
        settle(&mut a, &mut b);

        assert_eq!(b.context().value_of(id), Some(3.into()));
        assert!(a.is_fully_synced());
        assert!(b.is_fully_synced());
    }

    #[test]
    fn catch_up_sends_existing_tree() {
        let mut a = manager(1, AuthorityLevel::High);
        let mut b = manager(2, AuthorityLevel::Low);
        let id = a
            .context()
            .write(|ctx| {
                let root = ctx.root_id();
                ctx.create_object(root, "scene", "Scene", None)
            })
            .unwrap();
        a.update();

        a.add_connection(PeerId(2)).unwrap();
        b.add_connection(PeerId(1)).unwrap();
        pump(&a, &mut b, PeerId(1));
        pump(&b, &mut a, PeerId(2));
        settle(&mut a, &mut b);

        assert!(b.context().read(|ctx| ctx.lookup(id).is_some()));
    }

    #[test]
    fn undecodable_bytes_are_counted_and_dropped() {
        let (mut a, _b) = connect();
        a.on_bytes_received(PeerId(2), Bytes::from_static(&[0xEE, 1, 2])).unwrap();
        a.update();
        assert_eq!(a.stats().decode_errors, 1);
        assert_eq!(a.link_state(PeerId(2)), Some(LinkState::Active));
    }

    #[test]
    fn unknown_peer_is_an_error() {
        let mut a = manager(1, AuthorityLevel::Low);
        assert!(matches!(
            a.on_bytes_received(PeerId(3), Bytes::new()),
            Err(SyncError::UnknownPeer(PeerId(3)))
        ));
        assert!(matches!(a.remove_connection(PeerId(3)), Err(SyncError::UnknownPeer(_))));
    }

    #[test]
    fn duplicate_system_id_is_refused() {
        let mut a = manager(1, AuthorityLevel::Low);
        let mut twin = manager(1, AuthorityLevel::Low);
        a.add_connection(PeerId(2)).unwrap();
        twin.add_connection(PeerId(1)).unwrap();
        pump(&twin, &mut a, PeerId(2));
        a.update();
        assert_eq!(a.link_state(PeerId(2)), Some(LinkState::Rejected));
        assert_eq!(a.stats().handshake_failures, 1);
    }

    #[test]
    fn version_mismatch_is_refused() {
        let mut a = manager(1, AuthorityLevel::Low);
        let ctx = SyncContext::new(ContextConfig::new().with_system_id(SystemId::new(2).unwrap()));
        let mut old = SyncManager::new(
            SyncConfig::new("old").with_protocol_version(0),
            SharedContext::new(ctx),
            Arc::new(MockChannel::new()),
        );
        a.add_connection(PeerId(2)).unwrap();
        old.add_connection(PeerId(1)).unwrap();
        pump(&old, &mut a, PeerId(2));
        a.update();
        assert_eq!(a.link_state(PeerId(2)), Some(LinkState::Rejected));
    }

    #[test]
    fn high_authority_removes_departed_users_data() {
        let (mut a, mut b) = connect();
        settle(&mut a, &mut b);
        let cursor = b
            .context()
            .write(|ctx| {
                let root = ctx.root_id();
                ctx.create_object(root, "cursor", "Cursor", Some(UserId(2)))
            })
            .unwrap();
        settle(&mut a, &mut b);
        assert!(a.context().read(|ctx| ctx.lookup(cursor).is_some()));

        assert_eq!(a.remove_connection(PeerId(2)).unwrap(), 1);
        assert!(a.context().read(|ctx| ctx.lookup(cursor).is_none()));
    }

    #[test]
    fn low_authority_purges_other_users_data() {
        let (mut a, mut b) = connect();
        settle(&mut a, &mut b);
        let (mine, theirs) = b.context().write(|ctx| {
            let root = ctx.root_id();
            let mine = ctx.create_object(root, "mine", "Cursor", Some(UserId(2))).unwrap();
            let theirs = ctx.create_object(root, "theirs", "Cursor", Some(UserId(7))).unwrap();
            (mine, theirs)
        });

        assert_eq!(b.remove_connection(PeerId(1)).unwrap(), 1);
        b.context().read(|ctx| {
            assert!(ctx.lookup(mine).is_some());
            assert!(ctx.lookup(theirs).is_none());
        });
    }
}
