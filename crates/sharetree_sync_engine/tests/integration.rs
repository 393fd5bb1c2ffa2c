//! Integration tests for managers exchanging operations over mock links.

use proptest::prelude::*;
use sharetree_codec::TypedValue;
use sharetree_core::ChildKey;
use sharetree_protocol::{
    AuthorityLevel, ElementKind, Operation, OperationalState, SyncMessage, UserId, VersionedOp,
};
use sharetree_sync_engine::LinkState;
use sharetree_testkit::prelude::*;

const HIGH: AuthorityLevel = AuthorityLevel::High;
const MEDIUM: AuthorityLevel = AuthorityLevel::Medium;
const LOW: AuthorityLevel = AuthorityLevel::Low;

fn tags(net: &TestNetwork, node: usize, ids: &SampleTree) -> Vec<TypedValue> {
    net.context(node).read(|ctx| {
        ctx.lookup(ids.tags)
            .and_then(|e| e.items())
            .map(<[TypedValue]>::to_vec)
            .unwrap_or_default()
    })
}

fn strings(items: &[&str]) -> Vec<TypedValue> {
    items.iter().map(|s| TypedValue::from(*s)).collect()
}

#[test]
fn created_then_updated_value_reaches_peer() {
    let mut net = TestNetwork::pair(LOW, LOW);
    assert!(net.run_until_synced(16));

    let score = net.edit(0, |ctx| {
        let root = ctx.root_id();
        let score = ctx
            .create_child(root, ElementKind::Int32, "score", None, Some(0.into()))
            .unwrap();
        ctx.set_value(score, 10).unwrap();
        score
    });
    assert!(net.run_until_synced(16));

    assert_eq!(net.context(1).value_of(score), Some(TypedValue::Int32(10)));
    net.assert_converged();
}

#[test]
fn higher_authority_wins_concurrent_modify() {
    let mut net = TestNetwork::pair(HIGH, LOW);
    let ids = net.with_sample_tree(1);

    net.edit(0, |ctx| ctx.set_value(ids.score, 1).unwrap());
    net.edit(1, |ctx| ctx.set_value(ids.score, 2).unwrap());
    net.update_node(0);
    net.update_node(1);
    assert!(net.run_until_synced(16));

    net.assert_converged();
    assert_eq!(net.context(1).value_of(ids.score), Some(1.into()));
}

#[test]
fn equal_authority_falls_back_to_system_id() {
    let mut net = TestNetwork::pair(LOW, LOW);
    let ids = net.with_sample_tree(0);

    net.edit(0, |ctx| ctx.set_value(ids.title, "from one").unwrap());
    net.edit(1, |ctx| ctx.set_value(ids.title, "from two").unwrap());
    net.update_node(0);
    net.update_node(1);
    assert!(net.run_until_synced(16));

    net.assert_converged();
    assert_eq!(net.context(0).value_of(ids.title), Some("from two".into()));
}

#[test]
fn concurrent_remove_and_insert_keep_insert_position() {
    let mut net = TestNetwork::pair(LOW, HIGH);
    let ids = net.with_sample_tree(0);
    net.edit(0, |ctx| ctx.array_insert(ids.tags, 2, "c").unwrap());
    assert!(net.run_until_synced(16));
    assert_eq!(tags(&net, 1, &ids), strings(&["a", "b", "c"]));

    net.edit(0, |ctx| ctx.array_remove(ids.tags, 0).unwrap());
    net.edit(1, |ctx| ctx.array_insert(ids.tags, 1, "d").unwrap());
    net.update_node(0);
    net.update_node(1);
    assert!(net.run_until_synced(16));

    net.assert_converged();
    assert_eq!(tags(&net, 0, &ids), strings(&["d", "b", "c"]));
}

#[test]
fn concurrent_deletes_of_same_element_converge() {
    let mut net = TestNetwork::pair(LOW, LOW);
    let ids = net.with_sample_tree(0);

    net.edit(0, |ctx| ctx.remove_child(ids.scene, ChildKey::Name("title")).unwrap());
    net.edit(1, |ctx| ctx.remove_child(ids.scene, ChildKey::Id(ids.title)).unwrap());
    net.update_node(0);
    net.update_node(1);
    assert!(net.run_until_synced(16));

    net.assert_converged();
    assert!(net.context(0).read(|ctx| ctx.lookup(ids.title).is_none()));
}

#[test]
fn delete_beats_concurrent_modify_below_it() {
    let mut net = TestNetwork::pair(LOW, HIGH);
    let ids = net.with_sample_tree(0);

    net.edit(0, |ctx| {
        let root = ctx.root_id();
        ctx.remove_child(root, ChildKey::Name("scene")).unwrap();
    });
    net.edit(1, |ctx| ctx.set_value(ids.score, 9).unwrap());
    net.update_node(0);
    net.update_node(1);
    assert!(net.run_until_synced(16));

    net.assert_converged();
    for node in 0..2 {
        net.context(node).read(|ctx| {
            assert!(ctx.lookup(ids.scene).is_none());
            assert!(ctx.lookup(ids.score).is_none());
        });
    }
}

#[test]
fn concurrent_same_name_creates_leave_one_child() {
    let mut net = TestNetwork::star(HIGH, &[LOW, LOW]);
    let ids = net.with_sample_tree(0);

    for leaf in 1..3 {
        net.edit(leaf, |ctx| {
            ctx.create_child(ids.scene, ElementKind::Int32, "x", None, Some(TypedValue::Int32(leaf as i32)))
                .unwrap()
        });
        net.update_node(leaf);
    }
    assert!(net.run_until_synced(32));

    net.assert_converged();
    let named_x = net.context(2).read(|ctx| {
        let scene = ctx.lookup(ids.scene).unwrap();
        scene
            .children()
            .iter()
            .filter(|id| ctx.lookup(**id).is_some_and(|e| e.name() == "x"))
            .count()
    });
    assert_eq!(named_x, 1);
}

#[test]
fn hub_relays_between_leaves() {
    let mut net = TestNetwork::star(HIGH, &[LOW, MEDIUM]);
    let ids = net.with_sample_tree(1);

    net.edit(2, |ctx| ctx.set_value(ids.score, 7).unwrap());
    assert!(net.run_until_synced(32));

    net.assert_converged();
    assert_eq!(net.context(1).value_of(ids.score), Some(7.into()));
    assert!(net.node(0).stats().ops_forwarded > 0);
}

#[test]
fn late_joiner_catches_up_through_hub() {
    let mut net = TestNetwork::new(&[HIGH, LOW, LOW]);
    net.connect(0, 1);
    let ids = net.with_sample_tree(1);
    net.edit(1, |ctx| ctx.array_insert(ids.tags, 0, "first").unwrap());
    assert!(net.run_until_synced(32));

    net.connect(0, 2);
    assert!(net.run_until_synced(32));

    net.assert_converged();
    assert_eq!(tags(&net, 2, &ids), strings(&["first", "a", "b"]));
}

#[test]
fn tree_built_before_connecting_is_sent_on_handshake() {
    let mut net = TestNetwork::new(&[HIGH, LOW]);
    let ids = net.edit(0, build_sample_tree);
    net.update_node(0);

    net.connect(0, 1);
    assert!(net.run_until_synced(32));

    net.assert_converged();
    assert_eq!(net.context(1).value_of(ids.title), Some("untitled".into()));
}

#[test]
fn hub_removes_departed_users_data_everywhere() {
    let mut net = TestNetwork::star(HIGH, &[LOW, LOW]);
    let ids = net.with_sample_tree(0);
    let cursor = net.edit(1, |ctx| {
        ctx.create_object(ids.scene, "cursor", "Cursor", Some(UserId(2)))
            .unwrap()
    });
    assert!(net.run_until_synced(32));
    assert!(net.context(2).read(|ctx| ctx.lookup(cursor).is_some()));

    let (hub_removed, leaf_removed) = net.disconnect(0, 1);
    assert_eq!(hub_removed, 1);
    assert_eq!(leaf_removed, 0);
    assert!(net.run_until_synced(32));

    assert!(net.context(0).read(|ctx| ctx.lookup(cursor).is_none()));
    assert!(net.context(2).read(|ctx| ctx.lookup(cursor).is_none()));
    assert!(net.context(1).read(|ctx| ctx.lookup(cursor).is_some()));
}

#[test]
fn duplicate_system_id_is_rejected() {
    let mut a = test_manager(1, LOW);
    let mut b = test_manager(1, LOW);
    a.add_connection(sharetree_sync_engine::PeerId(9)).unwrap();
    b.add_connection(sharetree_sync_engine::PeerId(1)).unwrap();
    for (_, bytes) in b.channel().take_sent() {
        a.on_bytes_received(sharetree_sync_engine::PeerId(9), bytes).unwrap();
    }
    a.update();

    assert_eq!(a.link_state(sharetree_sync_engine::PeerId(9)), Some(LinkState::Rejected));
    assert!(!a.is_fully_synced());
}

#[test]
fn tampered_message_is_dropped_without_breaking_link() {
    let mut net = TestNetwork::pair(LOW, LOW);
    let ids = net.with_sample_tree(0);

    let mut bytes = SyncMessage::Changes(vec![VersionedOp::new(
        OperationalState::new(0, 0),
        Operation::modify(ids.score, LOW, vec![ids.scene], 3.into()),
    )])
    .encode()
    .unwrap()
    .to_vec();
    bytes.truncate(bytes.len() - 2);
    net.node_mut(1)
        .on_bytes_received(sharetree_sync_engine::PeerId(0), bytes.into())
        .unwrap();
    net.update_node(1);

    assert_eq!(net.node(1).stats().decode_errors, 1);
    net.edit(0, |ctx| ctx.set_value(ids.score, 4).unwrap());
    assert!(net.run_until_synced(16));
    assert_eq!(net.context(1).value_of(ids.score), Some(4.into()));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_operations_survive_the_wire(op in operation_strategy()) {
        let decoded = Operation::decode(&op.encode().unwrap()).unwrap();
        prop_assert_eq!(decoded, op.clone());

        let message = SyncMessage::Changes(vec![VersionedOp::new(OperationalState::new(3, 4), op)]);
        let bytes = message.encode().unwrap();
        prop_assert_eq!(SyncMessage::decode(&bytes).unwrap(), message);
    }

    #[test]
    fn prop_star_converges_under_any_interleaving(
        script in prop::collection::vec((0usize..4, edit_strategy(), any::<bool>()), 1..40),
        hub in authority_strategy(),
        leaves in prop::collection::vec(authority_strategy(), 2..=3),
    ) {
        let mut net = TestNetwork::star(hub, &leaves);
        let ids = net.with_sample_tree(0);

        for (node, edit, flush) in &script {
            let node = node % net.len();
            net.edit(node, |ctx| apply_edit(ctx, &ids, edit));
            if *flush {
                net.update_node(node);
                net.deliver_from(node);
            }
        }

        prop_assert!(net.run_until_synced(256));
        let rendered: Vec<String> = (0..net.len()).map(|i| net.render(i)).collect();
        prop_assert!(net.is_converged(), "diverged:\n{}", rendered.join("\n"));
    }
}
