//! Immutable columnar shards of graph data.
//!
//! A [`DataPart`] owns a contiguous node range and a contiguous edge range.
//! Edges and property values may also target entities owned by earlier
//! parts; such writes are patches and always live in the later part.

mod builder;
mod index;

use std::collections::BTreeMap;

pub use builder::DataPartBuilder;
pub use index::StringIndex;

use index::AdjacencyIndex;

use crate::storage::props::PropertyStore;
use crate::storage::types::{EdgeRecord, LabelSet, PropValue};
use crate::types::{EdgeId, LabelId, NodeId, PropId};

/// Monotone ID remapping applied when a change is rebased.
///
/// IDs at or above the floor move up by the delta; IDs below it belong to
/// the shared base history and stay put.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdShift {
    /// Lowest node ID that moves.
    pub node_floor: NodeId,
    /// Distance every moved node ID travels.
    pub node_delta: u64,
    /// Lowest edge ID that moves.
    pub edge_floor: EdgeId,
    /// Distance every moved edge ID travels.
    pub edge_delta: u64,
}

impl IdShift {
    /// Shift that leaves every ID unchanged.
    pub const fn identity() -> Self {
        Self {
            node_floor: NodeId(0),
            node_delta: 0,
            edge_floor: EdgeId(0),
            edge_delta: 0,
        }
    }

    /// Returns `true` when no ID moves.
    pub fn is_identity(&self) -> bool {
        self.node_delta == 0 && self.edge_delta == 0
    }

    /// Maps a node ID.
    pub fn node(&self, id: NodeId) -> NodeId {
        if id >= self.node_floor {
            NodeId(id.0 + self.node_delta)
        } else {
            id
        }
    }

    /// Maps an edge ID.
    pub fn edge(&self, id: EdgeId) -> EdgeId {
        if id >= self.edge_floor {
            EdgeId(id.0 + self.edge_delta)
        } else {
            id
        }
    }

    pub(crate) fn edge_record(&self, record: &EdgeRecord) -> EdgeRecord {
        EdgeRecord {
            id: self.edge(record.id),
            src: self.node(record.src),
            dst: self.node(record.dst),
            ty: record.ty,
        }
    }
}

/// Number of edges a part attaches to a node owned by an earlier part.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PatchCounts {
    /// Edges leaving the external node.
    pub outgoing: u32,
    /// Edges entering the external node.
    pub incoming: u32,
}

/// Immutable shard of nodes, edges, properties and their indexes.
#[derive(Clone, Debug)]
pub struct DataPart {
    first_node_id: NodeId,
    labelsets: Vec<LabelSet>,
    first_edge_id: EdgeId,
    edges: Vec<EdgeRecord>,
    out_index: AdjacencyIndex,
    in_index: AdjacencyIndex,
    node_props: PropertyStore,
    edge_props: PropertyStore,
    label_index: BTreeMap<LabelId, Vec<NodeId>>,
    node_strings: StringIndex,
    edge_strings: StringIndex,
    patches: BTreeMap<NodeId, PatchCounts>,
}

impl DataPart {
    /// First node ID owned by the part.
    pub fn first_node_id(&self) -> NodeId {
        self.first_node_id
    }

    /// One past the last node ID owned by the part.
    pub fn node_end(&self) -> NodeId {
        NodeId(self.first_node_id.0 + self.labelsets.len() as u64)
    }

    /// Number of nodes owned by the part.
    pub fn node_count(&self) -> usize {
        self.labelsets.len()
    }

    /// First edge ID owned by the part.
    pub fn first_edge_id(&self) -> EdgeId {
        self.first_edge_id
    }

    /// One past the last edge ID owned by the part.
    pub fn edge_end(&self) -> EdgeId {
        EdgeId(self.first_edge_id.0 + self.edges.len() as u64)
    }

    /// Number of edges owned by the part.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Returns `true` when `id` falls inside the part's node range.
    pub fn owns_node(&self, id: NodeId) -> bool {
        id >= self.first_node_id && id < self.node_end()
    }

    /// Returns `true` when `id` falls inside the part's edge range.
    pub fn owns_edge(&self, id: EdgeId) -> bool {
        id >= self.first_edge_id && id < self.edge_end()
    }

    /// Labels of an owned node.
    pub fn labelset(&self, id: NodeId) -> Option<&LabelSet> {
        let offset = id.0.checked_sub(self.first_node_id.0)?;
        self.labelsets.get(usize::try_from(offset).ok()?)
    }

    /// Record of an owned edge.
    pub fn edge(&self, id: EdgeId) -> Option<&EdgeRecord> {
        let offset = id.0.checked_sub(self.first_edge_id.0)?;
        self.edges.get(usize::try_from(offset).ok()?)
    }

    /// Owned nodes with their labels, in ID order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &LabelSet)> + '_ {
        let first = self.first_node_id.0;
        self.labelsets
            .iter()
            .enumerate()
            .map(move |(offset, labels)| (NodeId(first + offset as u64), labels))
    }

    /// Owned edges in ID order.
    pub fn edges(&self) -> &[EdgeRecord] {
        &self.edges
    }

    /// Edges of this part leaving `node`, ordered by edge ID.
    pub fn out_edges(&self, node: NodeId) -> impl Iterator<Item = &EdgeRecord> + '_ {
        self.out_index.range(&self.edges, |e| e.src, node)
    }

    /// Edges of this part entering `node`, ordered by edge ID.
    pub fn in_edges(&self, node: NodeId) -> impl Iterator<Item = &EdgeRecord> + '_ {
        self.in_index.range(&self.edges, |e| e.dst, node)
    }

    /// Value this part stores for a node property.
    pub fn node_property(&self, node: NodeId, prop: PropId) -> Option<PropValue> {
        self.node_props.get(prop, node.0)
    }

    /// Every node property value this part stores for `node`.
    pub fn node_properties(&self, node: NodeId) -> Vec<(PropId, PropValue)> {
        self.node_props.entity_props(node.0)
    }

    /// Value this part stores for an edge property.
    pub fn edge_property(&self, edge: EdgeId, prop: PropId) -> Option<PropValue> {
        self.edge_props.get(prop, edge.0)
    }

    /// Every edge property value this part stores for `edge`.
    pub fn edge_properties(&self, edge: EdgeId) -> Vec<(PropId, PropValue)> {
        self.edge_props.entity_props(edge.0)
    }

    /// Frozen node property columns.
    pub fn node_props(&self) -> &PropertyStore {
        &self.node_props
    }

    /// Frozen edge property columns.
    pub fn edge_props(&self) -> &PropertyStore {
        &self.edge_props
    }

    /// Owned nodes carrying `label`, in ID order.
    pub fn nodes_with_label(&self, label: LabelId) -> &[NodeId] {
        self.label_index
            .get(&label)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Nodes whose string property value in this part starts with `prefix`.
    pub fn find_nodes_by_prefix<'a>(
        &'a self,
        prop: PropId,
        prefix: &'a str,
    ) -> impl Iterator<Item = (NodeId, &'a str)> + 'a {
        self.node_strings
            .find_prefix(prop, prefix)
            .map(|(id, value)| (NodeId(id), value))
    }

    /// Edges whose string property value in this part starts with `prefix`.
    pub fn find_edges_by_prefix<'a>(
        &'a self,
        prop: PropId,
        prefix: &'a str,
    ) -> impl Iterator<Item = (EdgeId, &'a str)> + 'a {
        self.edge_strings
            .find_prefix(prop, prefix)
            .map(|(id, value)| (EdgeId(id), value))
    }

    /// Nodes owned by earlier parts that this part attaches edges to.
    pub fn patched_nodes(&self) -> impl Iterator<Item = (NodeId, PatchCounts)> + '_ {
        self.patches.iter().map(|(id, counts)| (*id, *counts))
    }

    /// Returns a copy of the part with every ID moved through `shift`.
    pub fn shifted(&self, shift: &IdShift) -> DataPart {
        if shift.is_identity() {
            return self.clone();
        }
        let node = |id: u64| shift.node(NodeId(id)).0;
        let edge = |id: u64| shift.edge(EdgeId(id)).0;
        DataPart {
            first_node_id: shift.node(self.first_node_id),
            labelsets: self.labelsets.clone(),
            first_edge_id: shift.edge(self.first_edge_id),
            edges: self.edges.iter().map(|e| shift.edge_record(e)).collect(),
            // The shift is monotone, so sorted positions stay valid.
            out_index: self.out_index.clone(),
            in_index: self.in_index.clone(),
            node_props: self.node_props.remap(node),
            edge_props: self.edge_props.remap(edge),
            label_index: self
                .label_index
                .iter()
                .map(|(label, ids)| (*label, ids.iter().map(|id| shift.node(*id)).collect()))
                .collect(),
            node_strings: self.node_strings.remap(node),
            edge_strings: self.edge_strings.remap(edge),
            patches: self
                .patches
                .iter()
                .map(|(id, counts)| (shift.node(*id), *counts))
                .collect(),
        }
    }
}
