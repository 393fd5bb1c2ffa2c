//! In-memory network of sync managers.
//!
//! Node `i` reaches node `j` over the link `PeerId(j)`. Messages stay in
//! each node's mock channel until [`TestNetwork::deliver_from`] (or
//! [`TestNetwork::step`]) moves them, which lets tests hold traffic back to
//! create concurrent edits.
//!
//! Links must form a tree. Managers relay applied operations to their other
//! peers, so a cycle would deliver the same change twice.

use crate::fixtures::{build_sample_tree, test_manager, SampleTree, TestManager};
use sharetree_core::{NodeView, SharedContext, SyncContext};
use sharetree_protocol::{AuthorityLevel, ElementId};
use sharetree_sync_engine::PeerId;
use std::collections::BTreeMap;

/// A set of managers exchanging messages through mock channels.
pub struct TestNetwork {
    nodes: Vec<TestManager>,
}

impl TestNetwork {
    /// Creates unconnected nodes; node `i` gets system id `i + 1`.
    pub fn new(authorities: &[AuthorityLevel]) -> Self {
        let nodes = authorities
            .iter()
            .zip(1u32..)
            .map(|(authority, system)| test_manager(system, *authority))
            .collect();
        Self { nodes }
    }

    /// Creates two linked nodes.
    pub fn pair(a: AuthorityLevel, b: AuthorityLevel) -> Self {
        let mut net = Self::new(&[a, b]);
        net.connect(0, 1);
        net
    }

    /// Creates node 0 as a hub linked to every other node. Leaves reach
    /// each other only through the hub.
    pub fn star(hub: AuthorityLevel, leaves: &[AuthorityLevel]) -> Self {
        let mut authorities = vec![hub];
        authorities.extend_from_slice(leaves);
        let mut net = Self::new(&authorities);
        for leaf in 1..net.len() {
            net.connect(0, leaf);
        }
        net
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the network has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Opens the link between `a` and `b` on both sides.
    pub fn connect(&mut self, a: usize, b: usize) {
        self.nodes[a]
            .add_connection(link(b))
            .expect("add connection");
        self.nodes[b]
            .add_connection(link(a))
            .expect("add connection");
    }

    /// Closes the link on both sides, dropping anything in flight between
    /// them. Returns how many owned subtrees each side removed.
    pub fn disconnect(&mut self, a: usize, b: usize) -> (usize, usize) {
        self.discard_between(a, b);
        self.discard_between(b, a);
        let removed_a = self.nodes[a]
            .remove_connection(link(b))
            .expect("remove connection");
        let removed_b = self.nodes[b]
            .remove_connection(link(a))
            .expect("remove connection");
        (removed_a, removed_b)
    }

    /// The manager of node `i`.
    pub fn node(&self, i: usize) -> &TestManager {
        &self.nodes[i]
    }

    /// The manager of node `i`.
    pub fn node_mut(&mut self, i: usize) -> &mut TestManager {
        &mut self.nodes[i]
    }

    /// The context of node `i`.
    pub fn context(&self, i: usize) -> &SharedContext {
        self.nodes[i].context()
    }

    /// Runs `f` against the context of node `i`.
    pub fn edit<R>(&self, i: usize, f: impl FnOnce(&mut SyncContext) -> R) -> R {
        self.nodes[i].context().write(f)
    }

    /// Runs one update round on node `i` without delivering anything.
    pub fn update_node(&mut self, i: usize) {
        self.nodes[i].update();
    }

    /// Moves everything node `from` has sent to its recipients. Returns the
    /// number of messages delivered.
    pub fn deliver_from(&mut self, from: usize) -> usize {
        let sent = self.nodes[from].channel().take_sent();
        let mut delivered = 0;
        for (to, bytes) in sent {
            let Some(node) = self.nodes.get_mut(to.0 as usize) else {
                continue;
            };
            if node.on_bytes_received(link(from), bytes).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Updates every node, then delivers every message. Returns the number
    /// of messages delivered.
    pub fn step(&mut self) -> usize {
        for node in &mut self.nodes {
            node.update();
        }
        (0..self.nodes.len()).map(|i| self.deliver_from(i)).sum()
    }

    /// Steps until nothing is in flight and every link is settled. Returns
    /// `false` if that did not happen within `max_rounds`.
    pub fn run_until_synced(&mut self, max_rounds: usize) -> bool {
        for _ in 0..max_rounds {
            let delivered = self.step();
            if delivered == 0 && self.nodes.iter().all(TestManager::is_fully_synced) {
                return true;
            }
        }
        false
    }

    /// Comparable content of each node's tree.
    pub fn views(&self) -> Vec<BTreeMap<ElementId, NodeView>> {
        self.nodes
            .iter()
            .map(|n| n.context().read(|ctx| ctx.tree().canonical_view()))
            .collect()
    }

    /// Whether every node holds the same tree.
    pub fn is_converged(&self) -> bool {
        let views = self.views();
        views.windows(2).all(|pair| pair[0] == pair[1])
    }

    /// Panics with both renderings if any node differs from node 0.
    pub fn assert_converged(&self) {
        let views = self.views();
        for (i, view) in views.iter().enumerate().skip(1) {
            if *view != views[0] {
                panic!(
                    "node {i} diverged from node 0\n--- node 0 ---\n{}--- node {i} ---\n{}",
                    self.render(0),
                    self.render(i)
                );
            }
        }
    }

    /// The tree of node `i` as pretty JSON.
    pub fn snapshot_json(&self, i: usize) -> String {
        let snapshot = self.nodes[i].context().read(SyncContext::snapshot);
        serde_json::to_string_pretty(&snapshot).unwrap_or_else(|err| err.to_string())
    }

    /// Renders the tree of node `i`.
    pub fn render(&self, i: usize) -> String {
        self.nodes[i].context().read(|ctx| ctx.tree().render())
    }

    /// Builds the sample tree on node `owner` and replicates it everywhere.
    pub fn with_sample_tree(&mut self, owner: usize) -> SampleTree {
        let ids = self.edit(owner, build_sample_tree);
        assert!(self.run_until_synced(64), "sample tree did not replicate");
        ids
    }

    fn discard_between(&mut self, from: usize, to: usize) {
        let target = link(to);
        let sent = self.nodes[from].channel().take_sent();
        for (peer, bytes) in sent.into_iter().filter(|(peer, _)| *peer != target) {
            if let Some(node) = self.nodes.get_mut(peer.0 as usize) {
                let _ = node.on_bytes_received(link(from), bytes);
            }
        }
    }
}

fn link(index: usize) -> PeerId {
    PeerId(index as u32)
}
