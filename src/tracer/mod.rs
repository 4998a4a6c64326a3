//! Structured read tracing.
//!
//! A tracer attached to a cursor observes exactly one initiation event per
//! scan/seek and one yield event per entity, property or group actually
//! returned. Entities filtered by deletion or access control are never
//! observed, and nothing fires after the terminal exhausted call.

use parking_lot::Mutex;

use crate::types::{LabelId, NodeId, PropKeyId, RelId, RelTypeId};

/// Ordered callbacks for observed read operations.
pub trait ReadTracer: Send + Sync {
    /// An all-nodes scan was initiated.
    fn on_all_nodes_scan(&self);
    /// A label scan was initiated.
    fn on_label_scan(&self, label: LabelId);
    /// An index seek was initiated.
    fn on_index_seek(&self);
    /// A node was yielded.
    fn on_node(&self, node: NodeId);
    /// A relationship was yielded.
    fn on_relationship(&self, rel: RelId);
    /// A property was yielded.
    fn on_property(&self, key: PropKeyId);
    /// A relationship group was yielded.
    fn on_relationship_group(&self, rel_type: RelTypeId);
}

/// One observed operation. Ordering is significant.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TraceEvent {
    /// All-nodes scan initiated.
    AllNodesScan,
    /// Label scan initiated.
    LabelScan(LabelId),
    /// Index seek initiated.
    IndexSeek,
    /// Node yielded.
    Node(NodeId),
    /// Relationship yielded.
    Relationship(RelId),
    /// Property yielded.
    Property(PropKeyId),
    /// Relationship group yielded.
    RelationshipGroup(RelTypeId),
}

/// Tracer that records events in order, for tests and diagnostics.
#[derive(Default)]
pub struct RecordingTracer {
    events: Mutex<Vec<TraceEvent>>,
}

impl RecordingTracer {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns every event recorded since the last take.
    pub fn take_events(&self) -> Vec<TraceEvent> {
        std::mem::take(&mut self.events.lock())
    }

    fn push(&self, event: TraceEvent) {
        self.events.lock().push(event);
    }
}

impl ReadTracer for RecordingTracer {
    fn on_all_nodes_scan(&self) {
        self.push(TraceEvent::AllNodesScan);
    }

    fn on_label_scan(&self, label: LabelId) {
        self.push(TraceEvent::LabelScan(label));
    }

    fn on_index_seek(&self) {
        self.push(TraceEvent::IndexSeek);
    }

    fn on_node(&self, node: NodeId) {
        self.push(TraceEvent::Node(node));
    }

    fn on_relationship(&self, rel: RelId) {
        self.push(TraceEvent::Relationship(rel));
    }

    fn on_property(&self, key: PropKeyId) {
        self.push(TraceEvent::Property(key));
    }

    fn on_relationship_group(&self, rel_type: RelTypeId) {
        self.push(TraceEvent::RelationshipGroup(rel_type));
    }
}
