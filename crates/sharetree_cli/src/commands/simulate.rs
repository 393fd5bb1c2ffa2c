//! Simulate command implementation.
//!
//! Node 0 is a High authority hub owning a small scene; every client links
//! to the hub only. Each node runs on its own tokio task, ticking its
//! manager and making random edits until its quota is spent. Once every
//! node reports a settled link for several consecutive polls, the tasks
//! stop and the trees are compared.

use super::{CliError, CliResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use sharetree_codec::{Bytes, TypedValue};
use sharetree_core::{ChildKey, ContextConfig, SharedContext, SnapshotNode, SyncContext};
use sharetree_protocol::{AuthorityLevel, ElementId, ElementKind, SystemId, UserId};
use sharetree_sync_engine::{MpscChannel, PeerId, SyncConfig, SyncManager, SyncStats};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

const TICK: Duration = Duration::from_millis(5);
const POLL: Duration = Duration::from_millis(20);
const SETTLED_POLLS: usize = 5;
const DEADLINE: Duration = Duration::from_secs(30);

/// Elements the simulated edits target.
#[derive(Debug, Clone, Copy)]
struct Scene {
    scene: ElementId,
    score: ElementId,
    tags: ElementId,
}

/// Per-peer result.
#[derive(Debug, Serialize)]
pub struct PeerSummary {
    /// Peer name.
    pub name: String,
    /// Edits that changed the local tree.
    pub edits: usize,
    /// Messages sent.
    pub messages_sent: u64,
    /// Remote operations received.
    pub ops_received: u64,
    /// Operations relayed to other peers.
    pub ops_forwarded: u64,
}

/// Simulation output.
#[derive(Debug, Serialize)]
pub struct SimulationReport {
    /// Whether all trees ended equal.
    pub converged: bool,
    /// Number of elements in the hub's tree, root included.
    pub elements: usize,
    /// Per-peer results, hub first.
    pub peers: Vec<PeerSummary>,
    /// The hub's tree.
    pub tree: SnapshotNode,
}

struct PeerTask {
    index: usize,
    name: String,
    manager: SyncManager<MpscChannel>,
    inbox: mpsc::UnboundedReceiver<(PeerId, Bytes)>,
    settled: Arc<AtomicBool>,
    shutdown: watch::Receiver<bool>,
    rng: StdRng,
    edits_left: usize,
    scene: Scene,
}

fn context(index: usize, authority: AuthorityLevel) -> CliResult<SharedContext> {
    let system = u32::try_from(index + 1)
        .ok()
        .and_then(SystemId::new)
        .ok_or_else(|| CliError::InvalidArgument(format!("no system id for peer {index}")))?;
    let config = ContextConfig::new()
        .with_authority(authority)
        .with_system_id(system)
        .with_local_user(UserId(system.as_u32()));
    Ok(SharedContext::new(SyncContext::new(config)))
}

fn build_scene(ctx: &mut SyncContext) -> CliResult<Scene> {
    let root = ctx.root_id();
    let scene = ctx.create_object(root, "scene", "Scene", None)?;
    let score = ctx.create_child(scene, ElementKind::Int32, "score", None, Some(0.into()))?;
    let tags = ctx.create_child(scene, ElementKind::StringArray, "tags", None, None)?;
    Ok(Scene { scene, score, tags })
}

/// Runs the simulate command.
pub async fn run(clients: usize, edits: usize, seed: u64, format: &str) -> CliResult<()> {
    let node_count = clients + 1;
    let contexts = (0..node_count)
        .map(|i| {
            let authority = if i == 0 {
                AuthorityLevel::High
            } else {
                AuthorityLevel::Low
            };
            context(i, authority)
        })
        .collect::<CliResult<Vec<_>>>()?;
    let scene = contexts[0].write(build_scene)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut senders = Vec::with_capacity(node_count);
    let mut inboxes = Vec::with_capacity(node_count);
    for _ in 0..node_count {
        let (tx, rx) = mpsc::unbounded_channel();
        senders.push(tx);
        inboxes.push(rx);
    }

    let mut flags = Vec::with_capacity(node_count);
    let mut handles = Vec::with_capacity(node_count);
    for (index, inbox) in inboxes.into_iter().enumerate() {
        let local = link(index);
        let channel = MpscChannel::new(local);
        let links: Vec<usize> = if index == 0 {
            (1..node_count).collect()
        } else {
            vec![0]
        };
        for peer in &links {
            channel.add_route(link(*peer), senders[*peer].clone());
        }

        let name = if index == 0 {
            "hub".to_string()
        } else {
            format!("client{index}")
        };
        let mut manager = SyncManager::new(
            SyncConfig::new(name.clone()),
            contexts[index].clone(),
            channel,
        );
        for peer in links {
            manager.add_connection(link(peer))?;
        }

        let settled = Arc::new(AtomicBool::new(false));
        flags.push(settled.clone());
        let task = PeerTask {
            index,
            name,
            manager,
            inbox,
            settled,
            shutdown: shutdown_rx.clone(),
            rng: StdRng::seed_from_u64(seed.wrapping_add(index as u64)),
            edits_left: edits,
            scene,
        };
        handles.push(tokio::spawn(run_peer(task)));
    }
    drop(senders);

    let settled = tokio::time::timeout(DEADLINE, wait_until_settled(&flags)).await.is_ok();
    let _ = shutdown_tx.send(true);

    let mut peers = Vec::with_capacity(node_count);
    for handle in handles {
        peers.push(handle.await??);
    }
    if !settled {
        return Err(CliError::Diverged("peers did not settle before the deadline".into()));
    }

    let views: Vec<_> = contexts
        .iter()
        .map(|ctx| ctx.read(|c| c.tree().canonical_view()))
        .collect();
    let converged = views.windows(2).all(|pair| pair[0] == pair[1]);
    let report = SimulationReport {
        converged,
        elements: contexts[0].read(|c| c.tree().len()),
        peers,
        tree: contexts[0].read(SyncContext::snapshot),
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => print_text_output(&report, &contexts[0]),
    }

    if !converged {
        let first = views.iter().position(|view| *view != views[0]).unwrap_or(0);
        return Err(CliError::Diverged(format!(
            "client{first} differs from the hub:\n{}",
            contexts[first].read(|c| c.tree().render())
        )));
    }
    Ok(())
}

async fn wait_until_settled(flags: &[Arc<AtomicBool>]) {
    let mut streak = 0;
    while streak < SETTLED_POLLS {
        tokio::time::sleep(POLL).await;
        if flags.iter().all(|flag| flag.load(Ordering::Acquire)) {
            streak += 1;
        } else {
            streak = 0;
        }
    }
}

async fn run_peer(mut task: PeerTask) -> CliResult<PeerSummary> {
    let mut tick = tokio::time::interval(TICK);
    let mut edits = 0;
    loop {
        tokio::select! {
            Some((from, bytes)) = task.inbox.recv() => {
                task.manager.on_bytes_received(from, bytes)?;
            }
            _ = tick.tick() => {
                if task.edits_left > 0 && random_edit(&mut task) {
                    edits += 1;
                }
                task.manager.update();
                let settled = task.edits_left == 0 && task.manager.is_fully_synced();
                task.settled.store(settled, Ordering::Release);
            }
            _ = task.shutdown.changed() => break,
        }
    }

    let stats: SyncStats = task.manager.stats();
    debug!(peer = %task.name, ?stats, "peer stopped");
    Ok(PeerSummary {
        name: task.name,
        edits,
        messages_sent: stats.messages_sent,
        ops_received: stats.ops_received,
        ops_forwarded: stats.ops_forwarded,
    })
}

/// Makes one random edit once the scene has replicated. Returns whether the
/// tree changed.
fn random_edit(task: &mut PeerTask) -> bool {
    let scene = task.scene;
    let index = task.index;
    let serial = task.edits_left;
    let choice = task.rng.gen_range(0..6);
    let number: i32 = task.rng.gen_range(-1000..1000);
    let position: usize = task.rng.gen();

    let changed = task.manager.context().write(|ctx| {
        let Some(tag_count) = ctx.lookup(scene.tags).and_then(|e| e.items()).map(<[TypedValue]>::len) else {
            return None;
        };
        let result = match choice {
            0 => ctx.set_value(scene.score, number).map(|_| ()),
            1 => ctx.array_insert(scene.tags, position % (tag_count + 1), format!("c{index}-{serial}")),
            2 if tag_count > 0 => ctx.array_remove(scene.tags, position % tag_count).map(|_| ()),
            3 if tag_count > 0 => ctx.array_set(scene.tags, position % tag_count, format!("u{index}-{serial}")),
            4 => ctx
                .create_child(scene.scene, ElementKind::Int32, "shared", None, Some(number.into()))
                .map(|_| ()),
            5 => ctx.remove_child(scene.scene, ChildKey::Name("shared")),
            _ => return Some(false),
        };
        match result {
            Ok(()) => Some(true),
            Err(err) => {
                debug!(peer = index, error = %err, "edit skipped");
                Some(false)
            }
        }
    });

    match changed {
        Some(changed) => {
            task.edits_left -= 1;
            changed
        }
        None => false,
    }
}

fn link(index: usize) -> PeerId {
    PeerId(index as u32)
}

fn print_text_output(report: &SimulationReport, hub: &SharedContext) {
    info!(converged = report.converged, elements = report.elements, "simulation finished");
    println!("=== Converged Tree ===");
    print!("{}", hub.read(|c| c.tree().render()));
    println!();
    println!("=== Peers ===");
    for peer in &report.peers {
        println!(
            "{:<10} edits={:<4} sent={:<5} received={:<5} forwarded={}",
            peer.name, peer.edits, peer.messages_sent, peer.ops_received, peer.ops_forwarded
        );
    }
    println!();
    println!("Converged: {}", if report.converged { "yes" } else { "no" });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_small_session_converges() {
        run(2, 10, 7, "json").await.unwrap();
    }

    #[test]
    fn test_peer_without_system_id_is_an_argument_error() {
        let result = context(u32::MAX as usize, AuthorityLevel::Low);
        assert!(matches!(result, Err(CliError::InvalidArgument(_))));
    }

    #[test]
    fn test_scene_is_built_on_hub() {
        let hub = context(0, AuthorityLevel::High).unwrap();
        let scene = hub.write(build_scene).unwrap();
        hub.read(|ctx| {
            assert_eq!(ctx.system_id().as_u32(), 1);
            assert_eq!(ctx.lookup(scene.scene).unwrap().object_type(), Some("Scene"));
            assert!(ctx.lookup(scene.tags).unwrap().items().unwrap().is_empty());
        });
    }
}
