//! Deleted-ID sets scoped to one snapshot.

use std::collections::BTreeSet;
use std::hash::Hash;

use rustc_hash::FxHashSet;

use crate::storage::datapart::IdShift;
use crate::types::{EdgeId, EntityKind, NodeId, PenumbraError, Result};

/// IDs logically deleted as of one commit.
///
/// Entities are never physically removed from their part; an ID is visible
/// when some part owns it and it is absent from here.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Tombstones {
    nodes: BTreeSet<NodeId>,
    edges: BTreeSet<EdgeId>,
}

impl Tombstones {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tombstones every ID in `ids`. Fails without changing anything when one
    /// is already deleted or repeated.
    pub fn add_deleted_nodes(&mut self, ids: &[NodeId]) -> Result<()> {
        check_fresh(&self.nodes, ids, EntityKind::Node, |id| id.0)?;
        self.nodes.extend(ids.iter().copied());
        Ok(())
    }

    /// Tombstones every ID in `ids`. Fails without changing anything when one
    /// is already deleted or repeated.
    pub fn add_deleted_edges(&mut self, ids: &[EdgeId]) -> Result<()> {
        check_fresh(&self.edges, ids, EntityKind::Edge, |id| id.0)?;
        self.edges.extend(ids.iter().copied());
        Ok(())
    }

    /// Returns `true` when the node is deleted.
    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains(&id)
    }

    /// Returns `true` when the edge is deleted.
    pub fn contains_edge(&self, id: EdgeId) -> bool {
        self.edges.contains(&id)
    }

    /// Number of deleted nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of deleted edges.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Returns `true` when nothing is deleted.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    /// Deleted nodes in ascending order.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().copied()
    }

    /// Deleted edges in ascending order.
    pub fn edges(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.edges.iter().copied()
    }

    /// Adds every ID of `other`, ignoring overlaps.
    pub fn union_with(&mut self, other: &Tombstones) {
        self.nodes.extend(other.nodes.iter().copied());
        self.edges.extend(other.edges.iter().copied());
    }

    /// Returns a copy with every ID moved through `shift`.
    pub fn shifted(&self, shift: &IdShift) -> Tombstones {
        Tombstones {
            nodes: self.nodes.iter().map(|id| shift.node(*id)).collect(),
            edges: self.edges.iter().map(|id| shift.edge(*id)).collect(),
        }
    }
}

fn check_fresh<T: Copy + Ord + Hash>(
    deleted: &BTreeSet<T>,
    ids: &[T],
    kind: EntityKind,
    raw: impl Fn(T) -> u64,
) -> Result<()> {
    let mut seen = FxHashSet::default();
    for id in ids {
        if deleted.contains(id) || !seen.insert(*id) {
            return Err(PenumbraError::AlreadyDeleted { kind, id: raw(*id) });
        }
    }
    Ok(())
}
