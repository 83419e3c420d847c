//! Identifier newtypes and the crate-wide error type.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a node. Allocated densely in creation order and never reused.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct NodeId(pub u64);

/// Identifier of an edge. Allocated densely in creation order and never reused.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct EdgeId(pub u64);

/// Identifier of a node label in the schema registry.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct LabelId(pub u32);

/// Identifier of an edge type in the schema registry.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct TypeId(pub u32);

/// Identifier of a property type in the schema registry.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct PropId(pub u32);

/// Hash naming a commit. Random 64-bit value rendered as 16 hex digits.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct CommitHash(pub u64);

/// Identifier of an open change (editing session).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct ChangeId(pub u64);

/// Kind of graph entity an identifier refers to.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
pub enum EntityKind {
    /// A node.
    Node,
    /// An edge.
    Edge,
}

/// Value type carried by a property type.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
pub enum ValueType {
    /// 64-bit signed integer.
    Int64,
    /// 64-bit float.
    Double,
    /// Boolean.
    Bool,
    /// UTF-8 string.
    String,
}

impl NodeId {
    /// Returns the identifier immediately after this one.
    pub const fn next(self) -> Self {
        NodeId(self.0 + 1)
    }
}

impl EdgeId {
    /// Returns the identifier immediately after this one.
    pub const fn next(self) -> Self {
        EdgeId(self.0 + 1)
    }
}

impl CommitHash {
    /// Draws a fresh random commit hash.
    pub fn random() -> Self {
        CommitHash(rand::random::<u64>())
    }

    /// Parses a hash from its 16-digit hexadecimal form.
    pub fn from_hex(text: &str) -> Result<Self> {
        let mut buf = [0u8; 8];
        hex::decode_to_slice(text, &mut buf)
            .map_err(|_| PenumbraError::Invalid("commit hash must be 16 hex digits"))?;
        Ok(CommitHash(u64::from_be_bytes(buf)))
    }

    /// Renders the hash as 16 lowercase hex digits.
    pub fn to_hex(self) -> String {
        hex::encode(self.0.to_be_bytes())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for PropId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for CommitHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Display for ChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Node => f.write_str("node"),
            EntityKind::Edge => f.write_str("edge"),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Int64 => f.write_str("int64"),
            ValueType::Double => f.write_str("double"),
            ValueType::Bool => f.write_str("bool"),
            ValueType::String => f.write_str("string"),
        }
    }
}

impl From<u32> for LabelId {
    fn from(value: u32) -> Self {
        LabelId(value)
    }
}

impl From<u32> for TypeId {
    fn from(value: u32) -> Self {
        TypeId(value)
    }
}

impl From<u32> for PropId {
    fn from(value: u32) -> Self {
        PropId(value)
    }
}

/// Errors surfaced by the versioning and storage core.
#[derive(thiserror::Error, Debug)]
pub enum PenumbraError {
    /// No graph is registered under the name.
    #[error("graph not found: {0}")]
    GraphNotFound(String),
    /// A graph with the name already exists.
    #[error("graph already exists: {0}")]
    GraphExists(String),
    /// No open change carries the identifier.
    #[error("change not found: {0}")]
    ChangeNotFound(ChangeId),
    /// The change was already submitted or deleted.
    #[error("change {0} is closed")]
    ChangeClosed(ChangeId),
    /// No commit carries the hash.
    #[error("commit not found: {0}")]
    CommitNotFound(CommitHash),
    /// A concurrent commit on main deleted an entity the change depends on.
    #[error("conflict: {kind} {id} was deleted by commit {commit}")]
    Conflict {
        /// Kind of the offending entity.
        kind: EntityKind,
        /// Raw identifier of the offending entity.
        id: u64,
        /// Main commit that deleted the entity.
        commit: CommitHash,
    },
    /// A datapart builder carried inconsistent metadata.
    #[error("failed to build datapart: {0}")]
    BuildDataPartFailed(String),
    /// The commit builder already produced its commit.
    #[error("commit builder already built")]
    AlreadyBuilt,
    /// A bounded resource is exhausted.
    #[error("{resource} capacity exceeded (limit {limit})")]
    CapacityExceeded {
        /// Name of the exhausted resource.
        resource: &'static str,
        /// Configured limit.
        limit: usize,
    },
    /// The entity is already tombstoned.
    #[error("{kind} {id} already deleted")]
    AlreadyDeleted {
        /// Kind of the entity.
        kind: EntityKind,
        /// Raw identifier of the entity.
        id: u64,
    },
    /// The entity was never allocated or is not visible from the snapshot.
    #[error("{kind} {id} does not exist")]
    UnknownEntity {
        /// Kind of the entity.
        kind: EntityKind,
        /// Raw identifier of the entity.
        id: u64,
    },
    /// A property was used with a value type other than its registered one.
    #[error("property {prop} expects {expected}, got {found}")]
    PropertyTypeMismatch {
        /// Property whose type mismatched.
        prop: PropId,
        /// Registered value type.
        expected: ValueType,
        /// Value type supplied by the caller.
        found: ValueType,
    },
    /// Invalid argument or call sequence.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
    /// IO failure from a collaborator.
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization failure from a collaborator.
    #[error("serialization: {0}")]
    Serialization(String),
    /// Configuration could not be parsed.
    #[error("config: {0}")]
    Config(String),
}

impl PenumbraError {
    pub(crate) fn unknown_node(id: NodeId) -> Self {
        PenumbraError::UnknownEntity {
            kind: EntityKind::Node,
            id: id.0,
        }
    }

    pub(crate) fn unknown_edge(id: EdgeId) -> Self {
        PenumbraError::UnknownEntity {
            kind: EntityKind::Edge,
            id: id.0,
        }
    }

    /// Returns `true` for rebase conflicts, which callers may retry.
    pub fn is_conflict(&self) -> bool {
        matches!(self, PenumbraError::Conflict { .. })
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, PenumbraError>;
