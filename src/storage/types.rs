use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::types::{EdgeId, LabelId, NodeId, PropId, TypeId, ValueType};

/// Property value. Strings share their backing storage through `Arc<str>`.
#[derive(Clone, Debug, PartialEq)]
pub enum PropValue {
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit floating point number.
    Double(f64),
    /// Boolean value.
    Bool(bool),
    /// Shared string.
    String(Arc<str>),
}

impl PropValue {
    /// Builds a string value.
    pub fn string(value: &str) -> Self {
        PropValue::String(Arc::from(value))
    }

    /// Returns the value type matching this variant.
    pub fn value_type(&self) -> ValueType {
        match self {
            PropValue::Int64(_) => ValueType::Int64,
            PropValue::Double(_) => ValueType::Double,
            PropValue::Bool(_) => ValueType::Bool,
            PropValue::String(_) => ValueType::String,
        }
    }

    /// Returns the string payload, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer payload, if any.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropValue::Int64(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Int64(v) => write!(f, "{v}"),
            PropValue::Double(v) => write!(f, "{v}"),
            PropValue::Bool(v) => write!(f, "{v}"),
            PropValue::String(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for PropValue {
    fn from(value: i64) -> Self {
        PropValue::Int64(value)
    }
}

impl From<f64> for PropValue {
    fn from(value: f64) -> Self {
        PropValue::Double(value)
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        PropValue::Bool(value)
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        PropValue::string(value)
    }
}

/// Sorted, de-duplicated set of labels attached to a node.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct LabelSet {
    labels: SmallVec<[LabelId; 4]>,
}

impl LabelSet {
    /// Creates an empty label set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a label set from any label slice.
    pub fn from_labels(labels: &[LabelId]) -> Self {
        labels.iter().copied().collect()
    }

    /// Adds a label, keeping the set sorted.
    pub fn insert(&mut self, label: LabelId) {
        if let Err(pos) = self.labels.binary_search(&label) {
            self.labels.insert(pos, label);
        }
    }

    /// Returns `true` when the set carries `label`.
    pub fn contains(&self, label: LabelId) -> bool {
        self.labels.binary_search(&label).is_ok()
    }

    /// Number of labels in the set.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Returns `true` for the empty set.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Iterates labels in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = LabelId> + '_ {
        self.labels.iter().copied()
    }

    /// Labels as a sorted slice.
    pub fn as_slice(&self) -> &[LabelId] {
        &self.labels
    }
}

impl FromIterator<LabelId> for LabelSet {
    fn from_iter<I: IntoIterator<Item = LabelId>>(iter: I) -> Self {
        let mut labels: SmallVec<[LabelId; 4]> = iter.into_iter().collect();
        labels.sort_unstable();
        labels.dedup();
        Self { labels }
    }
}

/// Edge record stored in a datapart.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EdgeRecord {
    /// Edge identifier.
    pub id: EdgeId,
    /// Source node.
    pub src: NodeId,
    /// Destination node.
    pub dst: NodeId,
    /// Edge type.
    pub ty: TypeId,
}

impl EdgeRecord {
    /// Returns the endpoint opposite to `node`, if the edge touches it.
    pub fn other(&self, node: NodeId) -> Option<NodeId> {
        if self.src == node {
            Some(self.dst)
        } else if self.dst == node {
            Some(self.src)
        } else {
            None
        }
    }
}

/// Complete node data as seen from one snapshot.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeData {
    /// Node identifier.
    pub id: NodeId,
    /// Node labels.
    pub labels: LabelSet,
    /// Node properties ordered by property ID.
    pub props: Vec<(PropId, PropValue)>,
}

/// Complete edge data as seen from one snapshot.
#[derive(Clone, Debug, PartialEq)]
pub struct EdgeData {
    /// Edge record.
    pub record: EdgeRecord,
    /// Edge properties ordered by property ID.
    pub props: Vec<(PropId, PropValue)>,
}
