//! Per-link state.

use sharetree_codec::Bytes;
use sharetree_protocol::{IdentityInfo, LinkOplog, PeerRank};
use std::collections::VecDeque;
use std::fmt;

/// Application-chosen id of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub u32);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handshake progress of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Our identity is sent; waiting for the remote's.
    AwaitingIdentity,
    /// Identities exchanged; operations flow.
    Active,
    /// The remote's identity was refused. Its messages are ignored.
    Rejected,
}

/// One connected peer.
#[derive(Debug)]
pub(crate) struct RemotePeer {
    pub(crate) id: PeerId,
    pub(crate) state: LinkState,
    pub(crate) identity: Option<IdentityInfo>,
    pub(crate) oplog: LinkOplog,
    pub(crate) incoming: VecDeque<Bytes>,
}

impl RemotePeer {
    pub(crate) fn new(id: PeerId) -> Self {
        Self {
            id,
            state: LinkState::AwaitingIdentity,
            identity: None,
            oplog: LinkOplog::new(),
            incoming: VecDeque::new(),
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.state == LinkState::Active
    }

    pub(crate) fn rank(&self) -> Option<PeerRank> {
        self.identity.as_ref().map(IdentityInfo::rank)
    }
}
