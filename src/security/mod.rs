//! Per-transaction read access control.
//!
//! Access rejection is filtering, never an error: entities a policy hides
//! are silently absent from scans, and attribute cursors opened against a
//! hidden entity close with zero results rather than partial output.

use rustc_hash::FxHashSet;

use crate::types::LabelId;

/// Read-access policy queried per label set. Never mutates entity state.
pub trait AccessMode: Send + Sync {
    /// Whether every label is readable, letting scans skip per-entity
    /// label checks.
    fn allows_read_all_labels(&self) -> bool;

    /// Whether an entity carrying exactly `labels` is readable.
    fn allows_read_labels(&self, labels: &[LabelId]) -> bool;
}

/// Policy that can read everything.
pub struct FullAccess;

impl AccessMode for FullAccess {
    fn allows_read_all_labels(&self) -> bool {
        true
    }

    fn allows_read_labels(&self, _labels: &[LabelId]) -> bool {
        true
    }
}

/// Deny-list policy: an entity is hidden when any of its labels is denied.
pub struct LabelRestricted {
    denied: FxHashSet<u32>,
}

impl LabelRestricted {
    /// Creates a policy denying the given labels.
    pub fn deny(labels: impl IntoIterator<Item = LabelId>) -> Self {
        Self {
            denied: labels.into_iter().map(|label| label.0).collect(),
        }
    }
}

impl AccessMode for LabelRestricted {
    fn allows_read_all_labels(&self) -> bool {
        self.denied.is_empty()
    }

    fn allows_read_labels(&self, labels: &[LabelId]) -> bool {
        !labels.iter().any(|label| self.denied.contains(&label.0))
    }
}
