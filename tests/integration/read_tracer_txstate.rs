#![allow(missing_docs)]

//! Trace-event contract of the overlay cursors when transaction state is
//! in play: one start event per scan initialization, one yield event per
//! data-returning advance, nothing for filtered entities or after
//! exhaustion.

use std::sync::Arc;

use umbra::{
    cursor::CursorPool,
    security::{FullAccess, LabelRestricted},
    storage::{IndexQuery, MemStore},
    tracer::{ReadTracer, RecordingTracer, TraceEvent},
    txn::{KernelTransaction, Transaction},
    types::{LabelId, PropKeyId, PropValue, RelTypeId},
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

fn as_tracer(tracer: &Arc<RecordingTracer>) -> Option<Arc<dyn ReadTracer>> {
    Some(Arc::clone(tracer) as Arc<dyn ReadTracer>)
}

#[test]
fn all_nodes_scan_traces_start_yields_and_silent_exhaustion() {
    let store = MemStore::new();
    let pool = pool_over(&store);
    let txn = full_txn(&store);
    let a = txn.create_node();
    let b = txn.create_node();
    let tracer = Arc::new(RecordingTracer::new());

    let mut cursor = pool.allocate_node_cursor();
    cursor.scan(as_txn(&txn), as_tracer(&tracer));
    while cursor.next() {}
    assert!(!cursor.next(), "probe after exhaustion");

    assert_eq!(
        tracer.take_events(),
        vec![
            TraceEvent::AllNodesScan,
            TraceEvent::Node(a),
            TraceEvent::Node(b),
        ]
    );
}

#[test]
fn single_node_lookup_traces_only_the_yield() {
    let store = MemStore::new();
    let node = store.insert_node([], []);
    let pool = pool_over(&store);
    let txn = full_txn(&store);
    let tracer = Arc::new(RecordingTracer::new());

    let mut cursor = pool.allocate_node_cursor();
    cursor.single(node, as_txn(&txn), as_tracer(&tracer));
    assert!(cursor.next());
    assert!(!cursor.next());

    assert_eq!(tracer.take_events(), vec![TraceEvent::Node(node)]);
}

#[test]
fn label_scan_traces_start_then_merged_yields() {
    let store = MemStore::new();
    let label = LabelId(2);
    let stored = store.insert_node([label], []);
    let pool = pool_over(&store);
    let txn = full_txn(&store);
    let added = txn.create_node();
    txn.add_label(added, label);
    let tracer = Arc::new(RecordingTracer::new());

    let mut cursor = pool.allocate_node_label_index_cursor();
    cursor.scan(label, as_txn(&txn), as_tracer(&tracer));
    while cursor.next() {}

    assert_eq!(
        tracer.take_events(),
        vec![
            TraceEvent::LabelScan(label),
            TraceEvent::Node(added),
            TraceEvent::Node(stored),
        ]
    );
}

#[test]
fn denied_label_scan_traces_only_the_start() {
    let store = MemStore::new();
    store.insert_node([LabelId(7)], []);
    let pool = pool_over(&store);
    let (nodes, rels) = store.id_base();
    let txn = Arc::new(KernelTransaction::with_id_base(
        Arc::new(LabelRestricted::deny([LabelId(7)])),
        nodes,
        rels,
    ));
    let tracer = Arc::new(RecordingTracer::new());

    let mut cursor = pool.allocate_node_label_index_cursor();
    cursor.scan(LabelId(7), as_txn(&txn), as_tracer(&tracer));
    assert!(!cursor.next());

    assert_eq!(tracer.take_events(), vec![TraceEvent::LabelScan(LabelId(7))]);
}

#[test]
fn index_seek_traces_start_then_matching_yields() {
    let store = MemStore::new();
    let key = PropKeyId(1);
    let stored = store.insert_node([], [(key, PropValue::Int(7))]);
    let pool = pool_over(&store);
    let txn = full_txn(&store);
    let added = txn.create_node();
    txn.set_node_property(added, key, PropValue::Int(7));
    let tracer = Arc::new(RecordingTracer::new());

    let mut cursor = pool.allocate_node_index_cursor();
    cursor.seek(
        key,
        IndexQuery::Exact(PropValue::Int(7)),
        as_txn(&txn),
        as_tracer(&tracer),
    );
    while cursor.next() {}

    assert_eq!(
        tracer.take_events(),
        vec![
            TraceEvent::IndexSeek,
            TraceEvent::Node(added),
            TraceEvent::Node(stored),
        ]
    );
}

#[test]
fn relationship_scan_traces_yields_without_start_event() {
    let store = MemStore::new();
    let a = store.insert_node([], []);
    let b = store.insert_node([], []);
    let stored = store.insert_relationship(RelTypeId(1), a, b, []);
    let pool = pool_over(&store);
    let txn = full_txn(&store);
    let added = txn.create_relationship(RelTypeId(1), a, b);
    let tracer = Arc::new(RecordingTracer::new());

    let mut cursor = pool.allocate_relationship_scan_cursor();
    cursor.scan(as_txn(&txn), as_tracer(&tracer));
    while cursor.next() {}

    assert_eq!(
        tracer.take_events(),
        vec![
            TraceEvent::Relationship(added),
            TraceEvent::Relationship(stored),
        ]
    );
}

#[test]
fn traversal_traces_one_event_per_visible_relationship() {
    let store = MemStore::new();
    let origin = store.insert_node([], []);
    let other = store.insert_node([], []);
    let kept = store.insert_relationship(RelTypeId(1), origin, other, []);
    let dropped = store.insert_relationship(RelTypeId(1), other, origin, []);
    let pool = pool_over(&store);
    let txn = full_txn(&store);
    txn.delete_relationship(dropped);
    let tracer = Arc::new(RecordingTracer::new());

    let mut nodes = pool.allocate_node_cursor();
    nodes.single(origin, as_txn(&txn), as_tracer(&tracer));
    assert!(nodes.next());
    tracer.take_events();

    let mut rels = pool.allocate_relationship_traversal_cursor();
    nodes.all_relationships(&mut rels);
    while rels.next() {}

    assert_eq!(
        tracer.take_events(),
        vec![TraceEvent::Relationship(kept)],
        "filtered relationship must not trace"
    );
}

#[test]
fn property_reads_trace_effective_keys_only() {
    let store = MemStore::new();
    let node = store.insert_node(
        [],
        [
            (PropKeyId(1), PropValue::Int(1)),
            (PropKeyId(2), PropValue::Int(2)),
        ],
    );
    let pool = pool_over(&store);
    let txn = full_txn(&store);
    txn.remove_node_property(node, PropKeyId(1));
    txn.set_node_property(node, PropKeyId(2), PropValue::Int(20));
    txn.set_node_property(node, PropKeyId(3), PropValue::Int(3));
    let tracer = Arc::new(RecordingTracer::new());

    let mut nodes = pool.allocate_node_cursor();
    nodes.single(node, as_txn(&txn), as_tracer(&tracer));
    assert!(nodes.next());
    tracer.take_events();

    let mut props = pool.allocate_property_cursor();
    nodes.properties(&mut props);
    while props.next() {}

    assert_eq!(
        tracer.take_events(),
        vec![
            TraceEvent::Property(PropKeyId(2)),
            TraceEvent::Property(PropKeyId(3)),
        ],
        "removed key traces nothing"
    );
}

#[test]
fn group_reads_trace_one_event_per_group() {
    let store = MemStore::new();
    let origin = store.insert_node([], []);
    let other = store.insert_node([], []);
    store.insert_relationship(RelTypeId(1), origin, other, []);
    let pool = pool_over(&store);
    let txn = full_txn(&store);
    txn.create_relationship(RelTypeId(4), origin, origin);
    let tracer = Arc::new(RecordingTracer::new());

    let mut nodes = pool.allocate_node_cursor();
    nodes.single(origin, as_txn(&txn), as_tracer(&tracer));
    assert!(nodes.next());
    tracer.take_events();

    let mut groups = pool.allocate_relationship_group_cursor();
    nodes.relationships(&mut groups);
    while groups.next() {}

    assert_eq!(
        tracer.take_events(),
        vec![
            TraceEvent::RelationshipGroup(RelTypeId(1)),
            TraceEvent::RelationshipGroup(RelTypeId(4)),
        ]
    );
}

#[test]
fn filtered_nodes_trace_nothing() {
    let store = MemStore::new();
    let visible = store.insert_node([LabelId(1)], []);
    store.insert_node([LabelId(7)], []);
    let pool = pool_over(&store);
    let (nodes, rels) = store.id_base();
    let txn = Arc::new(KernelTransaction::with_id_base(
        Arc::new(LabelRestricted::deny([LabelId(7)])),
        nodes,
        rels,
    ));
    let tracer = Arc::new(RecordingTracer::new());

    let mut cursor = pool.allocate_node_cursor();
    cursor.scan(as_txn(&txn), as_tracer(&tracer));
    while cursor.next() {}

    assert_eq!(
        tracer.take_events(),
        vec![TraceEvent::AllNodesScan, TraceEvent::Node(visible)]
    );
}
