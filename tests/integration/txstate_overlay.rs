#![allow(missing_docs)]

use std::sync::Arc;

use umbra::{
    cursor::{CursorPool, NodeCursor, RelationshipScanCursor},
    security::{FullAccess, LabelRestricted},
    storage::{AllNodeScan, IndexQuery, MemStore},
    txn::{KernelTransaction, Transaction},
    types::{LabelId, NodeId, PropKeyId, PropValue, RelTypeId},
};

fn pool_over(store: &MemStore) -> Arc<CursorPool> {
    CursorPool::new(Arc::new(store.clone()))
}

fn full_txn(store: &MemStore) -> Arc<KernelTransaction> {
    let (nodes, rels) = store.id_base();
    Arc::new(KernelTransaction::with_id_base(
        Arc::new(FullAccess),
        nodes,
        rels,
    ))
}

fn as_txn(txn: &Arc<KernelTransaction>) -> Arc<dyn Transaction> {
    Arc::clone(txn) as Arc<dyn Transaction>
}

fn collect_nodes(cursor: &mut NodeCursor) -> Vec<u64> {
    let mut out = Vec::new();
    while cursor.next() {
        out.push(cursor.node_reference().0);
    }
    out
}

fn collect_rels(cursor: &mut RelationshipScanCursor) -> Vec<u64> {
    let mut out = Vec::new();
    while cursor.next() {
        out.push(cursor.relationship_reference().0);
    }
    out
}

#[test]
fn scan_yields_tx_created_nodes_before_storage() {
    let store = MemStore::new();
    let stored = store.insert_node([], []);
    let pool = pool_over(&store);
    let txn = full_txn(&store);
    let first = txn.create_node();
    let second = txn.create_node();

    let mut cursor = pool.allocate_node_cursor();
    cursor.scan(as_txn(&txn), None);
    assert_eq!(
        collect_nodes(&mut cursor),
        vec![first.0, second.0, stored.0],
        "tx additions come first, in creation order"
    );
    assert!(!cursor.next(), "exhausted cursor stays exhausted");
}

#[test]
fn relationship_created_and_deleted_in_tx_is_invisible() {
    let store = MemStore::new();
    let a = store.insert_node([], []);
    let b = store.insert_node([], []);
    let pool = pool_over(&store);
    let txn = full_txn(&store);
    let rel = txn.create_relationship(RelTypeId(1), a, b);
    txn.delete_relationship(rel);

    let mut cursor = pool.allocate_relationship_scan_cursor();
    cursor.single(rel, as_txn(&txn), None);
    assert!(!cursor.next(), "rolled-back relationship must not surface");
}

#[test]
fn has_label_answers_from_tx_state_alone() {
    let store = MemStore::new();
    let pool = pool_over(&store);
    let txn = full_txn(&store);
    let node = txn.create_node();
    txn.add_label(node, LabelId(3));

    let mut cursor = pool.allocate_node_cursor();
    cursor.single(node, as_txn(&txn), None);
    assert!(cursor.next());
    assert!(cursor.has_label(LabelId(3)));
    assert!(!cursor.has_label(LabelId(4)));
    assert_eq!(cursor.labels().as_slice(), &[LabelId(3)]);
}

#[test]
fn deleted_storage_node_is_hidden_from_scan_and_single() {
    let store = MemStore::new();
    let keep = store.insert_node([], []);
    let gone = store.insert_node([], []);
    let pool = pool_over(&store);
    let txn = full_txn(&store);
    txn.delete_node(gone);

    let mut cursor = pool.allocate_node_cursor();
    cursor.scan(as_txn(&txn), None);
    assert_eq!(collect_nodes(&mut cursor), vec![keep.0]);

    cursor.single(gone, as_txn(&txn), None);
    assert!(!cursor.next());
}

#[test]
fn scan_snapshot_ignores_writes_after_initialization() {
    let store = MemStore::new();
    let a = store.insert_node([], []);
    let b = store.insert_node([], []);
    let c = store.insert_node([], []);
    let pool = pool_over(&store);
    let txn = full_txn(&store);

    let mut cursor = pool.allocate_node_cursor();
    cursor.scan(as_txn(&txn), None);
    assert!(cursor.next());
    assert_eq!(cursor.node_reference(), a);

    // Writes after the first advance must not leak into this iteration.
    let late = txn.create_node();
    txn.delete_node(b);
    assert_eq!(
        collect_nodes(&mut cursor),
        vec![b.0, c.0],
        "frozen snapshots keep the remaining results stable"
    );

    // A fresh scan sees the new state.
    cursor.scan(as_txn(&txn), None);
    assert_eq!(collect_nodes(&mut cursor), vec![late.0, a.0, c.0]);
}

#[test]
fn labels_merge_storage_with_tx_diff() {
    let store = MemStore::new();
    let node = store.insert_node([LabelId(1), LabelId(2)], []);
    let pool = pool_over(&store);
    let txn = full_txn(&store);
    txn.remove_label(node, LabelId(1));
    txn.add_label(node, LabelId(9));

    let mut cursor = pool.allocate_node_cursor();
    cursor.single(node, as_txn(&txn), None);
    assert!(cursor.next());
    assert_eq!(cursor.labels().as_slice(), &[LabelId(2), LabelId(9)]);
    assert!(!cursor.has_label(LabelId(1)));
    assert!(cursor.has_label(LabelId(9)));
}

#[test]
fn property_cursor_applies_overrides_removals_and_additions() {
    let store = MemStore::new();
    let node = store.insert_node(
        [],
        [
            (PropKeyId(1), PropValue::Int(10)),
            (PropKeyId(2), PropValue::Int(20)),
        ],
    );
    let pool = pool_over(&store);
    let txn = full_txn(&store);
    txn.remove_node_property(node, PropKeyId(1));
    txn.set_node_property(node, PropKeyId(2), PropValue::Int(21));
    txn.set_node_property(node, PropKeyId(3), PropValue::Text("new".into()));

    let mut nodes = pool.allocate_node_cursor();
    nodes.single(node, as_txn(&txn), None);
    assert!(nodes.next());
    let mut props = pool.allocate_property_cursor();
    nodes.properties(&mut props);

    assert!(props.next());
    assert_eq!(props.property_key(), PropKeyId(2));
    assert_eq!(props.property_value(), PropValue::Int(21));
    assert!(props.next());
    assert_eq!(props.property_key(), PropKeyId(3));
    assert_eq!(props.property_value(), PropValue::Text("new".into()));
    assert!(!props.next());
}

#[test]
fn tx_created_node_reads_properties_without_storage() {
    let store = MemStore::new();
    let pool = pool_over(&store);
    let txn = full_txn(&store);
    let node = txn.create_node();
    txn.set_node_property(node, PropKeyId(5), PropValue::Bool(true));

    let mut nodes = pool.allocate_node_cursor();
    nodes.single(node, as_txn(&txn), None);
    assert!(nodes.next());
    let mut props = pool.allocate_property_cursor();
    nodes.properties(&mut props);
    assert!(props.next());
    assert_eq!(props.property_key(), PropKeyId(5));
    assert!(!props.next());
}

#[test]
fn uninitialized_property_cursor_yields_nothing() {
    let store = MemStore::new();
    let pool = pool_over(&store);
    let mut props = pool.allocate_property_cursor();
    assert!(props.is_closed());
    assert!(!props.next(), "closed property cursor fails closed");
}

#[test]
fn denying_access_mode_filters_storage_nodes() {
    let store = MemStore::new();
    let secret = store.insert_node([LabelId(7)], []);
    let open = store.insert_node([LabelId(1)], []);
    let pool = pool_over(&store);
    let (nodes, rels) = store.id_base();
    let mode = LabelRestricted::deny([LabelId(7)]);
    let txn = Arc::new(KernelTransaction::with_id_base(Arc::new(mode), nodes, rels));

    let mut cursor = pool.allocate_node_cursor();
    cursor.scan(as_txn(&txn), None);
    assert_eq!(collect_nodes(&mut cursor), vec![open.0]);

    // Gaining the denied label in this transaction hides the node too.
    txn.add_label(open, LabelId(7));
    cursor.scan(as_txn(&txn), None);
    assert_eq!(collect_nodes(&mut cursor), Vec::<u64>::new());

    cursor.single(secret, as_txn(&txn), None);
    assert!(!cursor.next(), "denied node invisible by direct id too");
}

#[test]
fn attribute_cursors_fail_closed_on_denied_node() {
    let store = MemStore::new();
    let open = store.insert_node([LabelId(1)], []);
    let pool = pool_over(&store);
    let (nodes, rels) = store.id_base();
    let mode = LabelRestricted::deny([LabelId(7)]);
    let txn = Arc::new(KernelTransaction::with_id_base(Arc::new(mode), nodes, rels));
    let hidden = txn.create_node();
    txn.add_label(hidden, LabelId(7));
    txn.set_node_property(hidden, PropKeyId(1), PropValue::Int(1));
    txn.create_relationship(RelTypeId(1), hidden, open);

    let mut cursor = pool.allocate_node_cursor();
    cursor.single(hidden, as_txn(&txn), None);
    assert!(cursor.next(), "the tx's own additions surface in the scan");
    assert!(!cursor.has_label(LabelId(7)), "denied label reads as absent");

    let mut props = pool.allocate_property_cursor();
    cursor.properties(&mut props);
    assert!(!props.next(), "denied node leaks no properties");

    let mut traversal = pool.allocate_relationship_traversal_cursor();
    cursor.all_relationships(&mut traversal);
    assert!(!traversal.next(), "denied node leaks no relationships");

    let mut groups = pool.allocate_relationship_group_cursor();
    cursor.relationships(&mut groups);
    assert!(!groups.next(), "denied node leaks no groups");
}

#[test]
fn relationship_properties_fail_closed_when_endpoint_denied() {
    let store = MemStore::new();
    let secret = store.insert_node([LabelId(7)], []);
    let open = store.insert_node([LabelId(1)], []);
    let other = store.insert_node([LabelId(1)], []);
    let guarded = store.insert_relationship(
        RelTypeId(1),
        secret,
        open,
        [(PropKeyId(1), PropValue::Int(1))],
    );
    let plain = store.insert_relationship(
        RelTypeId(1),
        open,
        other,
        [(PropKeyId(2), PropValue::Int(2))],
    );
    let pool = pool_over(&store);
    let (nodes, rels) = store.id_base();
    let mode = LabelRestricted::deny([LabelId(7)]);
    let txn = Arc::new(KernelTransaction::with_id_base(Arc::new(mode), nodes, rels));

    let mut cursor = pool.allocate_relationship_scan_cursor();
    let mut props = pool.allocate_property_cursor();

    cursor.single(guarded, as_txn(&txn), None);
    assert!(cursor.next());
    cursor.properties(&mut props);
    assert!(!props.next(), "denied endpoint blocks the property path");

    cursor.single(plain, as_txn(&txn), None);
    assert!(cursor.next());
    cursor.properties(&mut props);
    assert!(props.next());
    assert_eq!(props.property_key(), PropKeyId(2));
    assert!(!props.next());
}

#[test]
fn label_index_scan_honors_tx_diff_and_deletions() {
    let store = MemStore::new();
    let label = LabelId(4);
    let stays = store.insert_node([label], []);
    let loses = store.insert_node([label], []);
    let dies = store.insert_node([label], []);
    let gains = store.insert_node([], []);
    let pool = pool_over(&store);
    let txn = full_txn(&store);
    txn.remove_label(loses, label);
    txn.delete_node(dies);
    txn.add_label(gains, label);
    let fresh = txn.create_node();
    txn.add_label(fresh, label);

    let mut cursor = pool.allocate_node_label_index_cursor();
    cursor.scan(label, as_txn(&txn), None);
    let mut seen = Vec::new();
    while cursor.next() {
        seen.push(cursor.node_reference().0);
    }
    seen.sort_unstable();
    let mut expected = vec![stays.0, gains.0, fresh.0];
    expected.sort_unstable();
    assert_eq!(seen, expected);
}

#[test]
fn label_index_scan_fails_closed_for_denied_label() {
    let store = MemStore::new();
    store.insert_node([LabelId(7)], []);
    let pool = pool_over(&store);
    let (nodes, rels) = store.id_base();
    let mode = LabelRestricted::deny([LabelId(7)]);
    let txn = Arc::new(KernelTransaction::with_id_base(Arc::new(mode), nodes, rels));

    let mut cursor = pool.allocate_node_label_index_cursor();
    cursor.scan(LabelId(7), as_txn(&txn), None);
    assert!(!cursor.next(), "scan of a denied label yields nothing");
}

#[test]
fn label_index_scan_checks_access_on_tx_added_entries() {
    let store = MemStore::new();
    let tainted = store.insert_node([LabelId(7)], []);
    let pool = pool_over(&store);
    let (nodes, rels) = store.id_base();
    let mode = LabelRestricted::deny([LabelId(7)]);
    let txn = Arc::new(KernelTransaction::with_id_base(Arc::new(mode), nodes, rels));
    txn.add_label(tainted, LabelId(1));
    let fresh = txn.create_node();
    txn.add_label(fresh, LabelId(1));

    let mut cursor = pool.allocate_node_label_index_cursor();
    cursor.scan(LabelId(1), as_txn(&txn), None);
    let mut seen = Vec::new();
    while cursor.next() {
        seen.push(cursor.node_reference().0);
    }
    assert_eq!(
        seen,
        vec![fresh.0],
        "a node still carrying a denied label stays hidden even when it gains the scanned label in-tx"
    );
}

#[test]
fn value_index_seek_overlays_tx_property_changes() {
    let store = MemStore::new();
    let key = PropKeyId(1);
    let wanted = PropValue::Int(7);
    let stays = store.insert_node([], [(key, wanted.clone())]);
    let falsified = store.insert_node([], [(key, wanted.clone())]);
    let dies = store.insert_node([], [(key, wanted.clone())]);
    let joins = store.insert_node([], [(key, PropValue::Int(8))]);
    let pool = pool_over(&store);
    let txn = full_txn(&store);
    txn.set_node_property(falsified, key, PropValue::Int(9));
    txn.delete_node(dies);
    txn.set_node_property(joins, key, wanted.clone());

    let mut cursor = pool.allocate_node_index_cursor();
    cursor.seek(key, IndexQuery::Exact(wanted), as_txn(&txn), None);
    let mut seen = Vec::new();
    while cursor.next() {
        seen.push(cursor.node_reference().0);
    }
    seen.sort_unstable();
    let mut expected = vec![stays.0, joins.0];
    expected.sort_unstable();
    assert_eq!(seen, expected);
}

#[test]
fn traversal_merges_tx_relationships_with_storage() {
    let store = MemStore::new();
    let origin = store.insert_node([], []);
    let other = store.insert_node([], []);
    let kept = store.insert_relationship(RelTypeId(1), origin, other, []);
    let dropped = store.insert_relationship(RelTypeId(1), other, origin, []);
    let pool = pool_over(&store);
    let txn = full_txn(&store);
    let added = txn.create_relationship(RelTypeId(2), origin, other);
    txn.delete_relationship(dropped);

    let mut nodes = pool.allocate_node_cursor();
    nodes.single(origin, as_txn(&txn), None);
    assert!(nodes.next());
    let mut rels = pool.allocate_relationship_traversal_cursor();
    nodes.all_relationships(&mut rels);

    assert!(rels.next());
    assert_eq!(rels.relationship_reference(), added);
    assert_eq!(rels.rel_type(), RelTypeId(2));
    assert_eq!(rels.origin_node_reference(), origin);
    assert_eq!(rels.neighbour_node_reference(), other);
    assert!(rels.next());
    assert_eq!(rels.relationship_reference(), kept);
    assert!(!rels.next(), "deleted relationship is filtered out");
}

#[test]
fn group_cursor_merges_degrees_and_virtual_groups() {
    let store = MemStore::new();
    let origin = store.insert_node([], []);
    let other = store.insert_node([], []);
    store.insert_relationship(RelTypeId(1), origin, other, []);
    store.insert_relationship(RelTypeId(1), other, origin, []);
    let emptied = store.insert_relationship(RelTypeId(2), origin, other, []);
    let pool = pool_over(&store);
    let txn = full_txn(&store);
    txn.create_relationship(RelTypeId(1), origin, other);
    txn.create_relationship(RelTypeId(3), origin, origin);
    txn.delete_relationship(emptied);

    let mut nodes = pool.allocate_node_cursor();
    nodes.single(origin, as_txn(&txn), None);
    assert!(nodes.next());
    let mut groups = pool.allocate_relationship_group_cursor();
    nodes.relationships(&mut groups);

    assert!(groups.next());
    assert_eq!(groups.group_type(), RelTypeId(1));
    assert_eq!(groups.total_degree(), 3);
    assert!(groups.next());
    assert_eq!(groups.group_type(), RelTypeId(3), "virtual tx-only group");
    assert_eq!(groups.total_degree(), 1);
    assert!(!groups.next(), "type emptied by the tx is skipped");
}

#[test]
fn relationship_scan_yields_tx_additions_then_storage() {
    let store = MemStore::new();
    let a = store.insert_node([], []);
    let b = store.insert_node([], []);
    let stored = store.insert_relationship(RelTypeId(1), a, b, []);
    let gone = store.insert_relationship(RelTypeId(1), b, a, []);
    let pool = pool_over(&store);
    let txn = full_txn(&store);
    let added = txn.create_relationship(RelTypeId(5), a, b);
    txn.delete_relationship(gone);

    let mut cursor = pool.allocate_relationship_scan_cursor();
    cursor.scan(as_txn(&txn), None);
    assert_eq!(collect_rels(&mut cursor), vec![added.0, stored.0]);
}

#[test]
fn batch_scans_partition_without_overlap() {
    let store = MemStore::new();
    for _ in 0..10 {
        store.insert_node([], []);
    }
    let pool = pool_over(&store);
    let txn = full_txn(&store);
    let extra = txn.create_node();

    let scan = AllNodeScan::new();
    let mut seen = Vec::new();
    loop {
        let mut cursor = pool.allocate_node_cursor();
        cursor.scan_batch(&scan, 4, as_txn(&txn), None);
        let batch = collect_nodes(&mut cursor);
        if batch.is_empty() {
            break;
        }
        seen.extend(batch);
    }
    seen.sort_unstable();
    let mut expected: Vec<u64> = (0..10).collect();
    expected.push(extra.0);
    expected.sort_unstable();
    assert_eq!(seen, expected, "batches cover everything exactly once");
}

#[test]
fn pooled_cursor_reuse_leaves_no_residual_state() {
    let store = MemStore::new();
    store.insert_node([], []);
    let pool = pool_over(&store);
    let txn = full_txn(&store);
    txn.create_node();

    {
        let mut cursor = pool.allocate_node_cursor();
        cursor.scan(as_txn(&txn), None);
        assert!(cursor.next());
        assert!(!cursor.is_closed());
    }
    assert_eq!(pool.shelved::<NodeCursor>(), 1, "drop shelves the cursor");

    let reused = pool.allocate_node_cursor();
    assert_eq!(pool.shelved::<NodeCursor>(), 0, "reuse drains the shelf");
    assert!(reused.is_closed(), "reused cursor carries no transaction");
    drop(reused);

    // A clean transaction through the reused cursor sees only storage.
    let clean = full_txn(&store);
    let mut cursor = pool.allocate_node_cursor();
    cursor.scan(as_txn(&clean), None);
    assert_eq!(collect_nodes(&mut cursor), vec![0]);
}

#[test]
#[should_panic(expected = "node cursor not positioned")]
fn attribute_access_without_position_panics() {
    let store = MemStore::new();
    let pool = pool_over(&store);
    let txn = full_txn(&store);
    let mut cursor = pool.allocate_node_cursor();
    cursor.scan(as_txn(&txn), None);
    let _ = cursor.node_reference();
}

#[test]
fn single_lookup_of_missing_node_yields_nothing() {
    let store = MemStore::new();
    let pool = pool_over(&store);
    let txn = full_txn(&store);
    let mut cursor = pool.allocate_node_cursor();
    cursor.single(NodeId(99), as_txn(&txn), None);
    assert!(!cursor.next());
}
