//! Identifier, reference and value types shared across the kernel.

use std::io;

use smallvec::SmallVec;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, UmbraError>;

/// Error type for the read/storage core.
#[derive(Debug, Error)]
pub enum UmbraError {
    /// Underlying I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    /// A page write-back failed; carries the affected file and page.
    #[error("flush failed for file {file:?} page {page}: {source}")]
    Flush {
        /// File whose flush pass was aborted.
        file: FileId,
        /// File-local page index that failed to write.
        page: u64,
        /// Underlying failure.
        #[source]
        source: Box<UmbraError>,
    },
    /// Invalid request (unmapped file, unallocated page, exhausted pool).
    #[error("invalid operation: {0}")]
    Invalid(&'static str),
    /// On-disk or in-memory state failed an integrity check.
    #[error("corruption detected: {0}")]
    Corruption(&'static str),
}

/// Identifier of a file mapped into the page cache.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct FileId(pub u32);

/// Node identifier.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

/// Relationship identifier.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct RelId(pub u64);

/// Label token.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct LabelId(pub u32);

/// Property key token.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct PropKeyId(pub u32);

/// Relationship type token.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct RelTypeId(pub u32);

/// Label set of one entity. Small inline capacity covers typical nodes.
pub type LabelSet = SmallVec<[LabelId; 8]>;

/// Property value.
#[derive(Clone, Debug, PartialEq)]
pub enum PropValue {
    /// Boolean value.
    Bool(bool),
    /// Signed integer value.
    Int(i64),
    /// Floating point value.
    Real(f64),
    /// String value.
    Text(String),
}

/// Reference to an entity's property chain, or `None` for entities that
/// exist only in transaction state.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct PropRef(pub u64);

impl PropRef {
    /// Reference of an entity with no stored properties.
    pub const NONE: PropRef = PropRef(u64::MAX);

    /// Whether this reference points at nothing.
    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

/// Tag bit marking a reference as originating from a dense node. Consumers
/// select their traversal strategy from the bit without a second lookup.
const DENSE_BIT: u64 = 1 << 63;

/// Reference to a node's relationship chain.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct RelRef(pub u64);

impl RelRef {
    /// Reference of a node with no stored relationships.
    pub const NONE: RelRef = RelRef(u64::MAX);

    /// Whether this reference points at nothing, ignoring tag bits.
    pub fn is_none(self) -> bool {
        self.without_flags() == Self::NONE.without_flags()
    }

    /// Tags this reference as belonging to a dense node.
    pub fn encode_dense(self) -> RelRef {
        RelRef(self.0 | DENSE_BIT)
    }

    /// Whether the dense tag bit is set.
    pub fn is_dense(self) -> bool {
        self.0 & DENSE_BIT != 0
    }

    /// The reference with all tag bits cleared.
    pub fn without_flags(self) -> RelRef {
        RelRef(self.0 & !DENSE_BIT)
    }
}

/// Reference to a node's relationship-group chain.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct GroupRef(pub u64);

impl GroupRef {
    /// Reference of a node with no relationship groups.
    pub const NONE: GroupRef = GroupRef(u64::MAX);

    /// Whether this reference points at nothing, ignoring tag bits.
    pub fn is_none(self) -> bool {
        self.without_flags() == Self::NONE.without_flags()
    }

    /// Tags this reference as belonging to a dense node.
    pub fn encode_dense(self) -> GroupRef {
        GroupRef(self.0 | DENSE_BIT)
    }

    /// Whether the dense tag bit is set.
    pub fn is_dense(self) -> bool {
        self.0 & DENSE_BIT != 0
    }

    /// The reference with all tag bits cleared.
    pub fn without_flags(self) -> GroupRef {
        GroupRef(self.0 & !DENSE_BIT)
    }
}
