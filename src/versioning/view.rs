//! Read projections over committed or staged graph state.

use std::collections::BTreeMap;

use crate::primitives::arena::StrongHandle;
use crate::storage::catalog::SchemaRegistry;
use crate::storage::datapart::DataPart;
use crate::storage::tombstones::Tombstones;
use crate::storage::types::{EdgeData, EdgeRecord, LabelSet, NodeData, PropValue};
use crate::types::{CommitHash, EdgeId, LabelId, NodeId, PropId};

/// Borrowed view of one graph state: parts, tombstones and watermarks.
///
/// Views are cheap to copy and never outlive the commit or builder they
/// were taken from.
#[derive(Clone, Copy)]
pub struct GraphView<'a> {
    hash: CommitHash,
    parts: &'a [StrongHandle<DataPart>],
    tombstones: &'a Tombstones,
    schema: &'a SchemaRegistry,
    next_node_id: NodeId,
    next_edge_id: EdgeId,
    journal: &'a [CommitHash],
    commit_start: usize,
}

impl<'a> GraphView<'a> {
    /// Creates a view over `parts`, which must be sorted by ID range.
    pub fn new(
        hash: CommitHash,
        parts: &'a [StrongHandle<DataPart>],
        tombstones: &'a Tombstones,
        schema: &'a SchemaRegistry,
        next_node_id: NodeId,
        next_edge_id: EdgeId,
    ) -> Self {
        Self {
            hash,
            parts,
            tombstones,
            schema,
            next_node_id,
            next_edge_id,
            journal: &[],
            commit_start: 0,
        }
    }

    /// Attaches the commit journal and the index of the commit's own parts.
    pub fn with_history(mut self, journal: &'a [CommitHash], commit_start: usize) -> Self {
        self.journal = journal;
        self.commit_start = commit_start.min(self.parts.len());
        self
    }

    /// Hash of the commit the view belongs to.
    pub fn hash(&self) -> CommitHash {
        self.hash
    }

    /// Every visible part.
    pub fn parts(&self) -> &'a [StrongHandle<DataPart>] {
        self.parts
    }

    /// Parts created by the viewed commit itself.
    pub fn commit_parts(&self) -> &'a [StrongHandle<DataPart>] {
        &self.parts[self.commit_start..]
    }

    /// Commit hashes from the root to the viewed commit.
    pub fn journal(&self) -> &'a [CommitHash] {
        self.journal
    }

    /// Deleted IDs.
    pub fn tombstones(&self) -> &'a Tombstones {
        self.tombstones
    }

    /// Schema registry of the graph.
    pub fn schema(&self) -> &'a SchemaRegistry {
        self.schema
    }

    /// One past the highest allocated node ID.
    pub fn next_node_id(&self) -> NodeId {
        self.next_node_id
    }

    /// One past the highest allocated edge ID.
    pub fn next_edge_id(&self) -> EdgeId {
        self.next_edge_id
    }

    /// Reader over the view.
    pub fn reader(&self) -> GraphReader<'a> {
        GraphReader { view: *self }
    }
}

#[derive(Clone, Copy)]
enum Direction {
    Out,
    In,
}

/// Visibility-aware queries over a [`GraphView`].
#[derive(Clone, Copy)]
pub struct GraphReader<'a> {
    view: GraphView<'a>,
}

impl<'a> GraphReader<'a> {
    fn node_owner(&self, id: NodeId) -> Option<usize> {
        let parts = self.view.parts;
        let idx = parts.partition_point(|part| part.node_end() <= id);
        parts.get(idx).filter(|part| part.owns_node(id)).map(|_| idx)
    }

    fn edge_owner(&self, id: EdgeId) -> Option<usize> {
        let parts = self.view.parts;
        let idx = parts.partition_point(|part| part.edge_end() <= id);
        parts.get(idx).filter(|part| part.owns_edge(id)).map(|_| idx)
    }

    /// Parts that may hold data for an entity owned by part `owner`.
    fn from_owner(&self, owner: usize) -> &'a [StrongHandle<DataPart>] {
        let parts = self.view.parts;
        &parts[owner..]
    }

    /// Returns `true` when the node is allocated and not deleted.
    pub fn node_exists(&self, id: NodeId) -> bool {
        !self.view.tombstones.contains_node(id) && self.node_owner(id).is_some()
    }

    /// Returns `true` when the edge is allocated and not deleted.
    pub fn edge_exists(&self, id: EdgeId) -> bool {
        !self.view.tombstones.contains_edge(id) && self.edge_owner(id).is_some()
    }

    /// Number of visible nodes.
    pub fn node_count(&self) -> usize {
        let total: usize = self.view.parts.iter().map(|part| part.node_count()).sum();
        total.saturating_sub(self.view.tombstones.node_count())
    }

    /// Number of visible edges.
    pub fn edge_count(&self) -> usize {
        let total: usize = self.view.parts.iter().map(|part| part.edge_count()).sum();
        total.saturating_sub(self.view.tombstones.edge_count())
    }

    /// Labels of a visible node.
    pub fn labelset(&self, id: NodeId) -> Option<&'a LabelSet> {
        if self.view.tombstones.contains_node(id) {
            return None;
        }
        let parts = self.view.parts;
        parts[self.node_owner(id)?].labelset(id)
    }

    /// Record of a visible edge.
    pub fn edge(&self, id: EdgeId) -> Option<&'a EdgeRecord> {
        if self.view.tombstones.contains_edge(id) {
            return None;
        }
        let parts = self.view.parts;
        parts[self.edge_owner(id)?].edge(id)
    }

    /// Visible edges leaving a visible node, ordered by edge ID.
    pub fn out_edges(&self, node: NodeId) -> Vec<EdgeRecord> {
        if !self.node_exists(node) {
            return Vec::new();
        }
        self.adjacent(node, Direction::Out)
    }

    /// Visible edges entering a visible node, ordered by edge ID.
    pub fn in_edges(&self, node: NodeId) -> Vec<EdgeRecord> {
        if !self.node_exists(node) {
            return Vec::new();
        }
        self.adjacent(node, Direction::In)
    }

    /// Visible edges touching `node` in either direction, ascending and
    /// without duplicates. Works for deleted nodes too.
    pub fn incident_edges(&self, node: NodeId) -> Vec<EdgeId> {
        let mut ids: Vec<EdgeId> = self
            .adjacent(node, Direction::Out)
            .into_iter()
            .chain(self.adjacent(node, Direction::In))
            .map(|edge| edge.id)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    fn adjacent(&self, node: NodeId, direction: Direction) -> Vec<EdgeRecord> {
        let Some(owner) = self.node_owner(node) else {
            return Vec::new();
        };
        let tombstones = self.view.tombstones;
        let visible = |edge: &&EdgeRecord| !tombstones.contains_edge(edge.id);
        let mut edges = Vec::new();
        for part in self.from_owner(owner) {
            match direction {
                Direction::Out => edges.extend(part.out_edges(node).filter(visible).copied()),
                Direction::In => edges.extend(part.in_edges(node).filter(visible).copied()),
            }
        }
        edges
    }

    /// Current value of a node property. Later parts override earlier ones.
    pub fn node_property(&self, node: NodeId, prop: PropId) -> Option<PropValue> {
        if self.view.tombstones.contains_node(node) {
            return None;
        }
        let owner = self.node_owner(node)?;
        self.from_owner(owner)
            .iter()
            .rev()
            .find_map(|part| part.node_property(node, prop))
    }

    /// Current values of every property set on a node.
    pub fn node_properties(&self, node: NodeId) -> Vec<(PropId, PropValue)> {
        if self.view.tombstones.contains_node(node) {
            return Vec::new();
        }
        let Some(owner) = self.node_owner(node) else {
            return Vec::new();
        };
        let mut merged = BTreeMap::new();
        for part in self.from_owner(owner) {
            merged.extend(part.node_properties(node));
        }
        merged.into_iter().collect()
    }

    /// Current value of an edge property.
    pub fn edge_property(&self, edge: EdgeId, prop: PropId) -> Option<PropValue> {
        if self.view.tombstones.contains_edge(edge) {
            return None;
        }
        let owner = self.edge_owner(edge)?;
        self.from_owner(owner)
            .iter()
            .rev()
            .find_map(|part| part.edge_property(edge, prop))
    }

    /// Current values of every property set on an edge.
    pub fn edge_properties(&self, edge: EdgeId) -> Vec<(PropId, PropValue)> {
        if self.view.tombstones.contains_edge(edge) {
            return Vec::new();
        }
        let Some(owner) = self.edge_owner(edge) else {
            return Vec::new();
        };
        let mut merged = BTreeMap::new();
        for part in self.from_owner(owner) {
            merged.extend(part.edge_properties(edge));
        }
        merged.into_iter().collect()
    }

    /// Visible node IDs in ascending order.
    pub fn scan_nodes(&self) -> impl Iterator<Item = NodeId> + 'a {
        let tombstones = self.view.tombstones;
        self.view
            .parts
            .iter()
            .flat_map(|part| part.nodes().map(|(id, _)| id))
            .filter(move |id| !tombstones.contains_node(*id))
    }

    /// Visible edges in ascending ID order.
    pub fn scan_edges(&self) -> impl Iterator<Item = &'a EdgeRecord> + 'a {
        let tombstones = self.view.tombstones;
        self.view
            .parts
            .iter()
            .flat_map(|part| part.edges().iter())
            .filter(move |edge| !tombstones.contains_edge(edge.id))
    }

    /// Visible nodes carrying `label`, ascending.
    pub fn nodes_with_label(&self, label: LabelId) -> Vec<NodeId> {
        let tombstones = self.view.tombstones;
        self.view
            .parts
            .iter()
            .flat_map(|part| part.nodes_with_label(label).iter().copied())
            .filter(|id| !tombstones.contains_node(*id))
            .collect()
    }

    /// Visible nodes whose current string value of `prop` starts with
    /// `prefix`, ascending.
    pub fn find_nodes_by_prefix(&self, prop: PropId, prefix: &str) -> Vec<NodeId> {
        let mut hits: Vec<NodeId> = self
            .view
            .parts
            .iter()
            .flat_map(|part| part.find_nodes_by_prefix(prop, prefix).map(|(id, _)| id))
            .collect();
        hits.sort_unstable();
        hits.dedup();
        // A later part may have overwritten the value that matched.
        hits.retain(|id| {
            self.node_property(*id, prop)
                .is_some_and(|value| value.as_str().is_some_and(|s| s.starts_with(prefix)))
        });
        hits
    }

    /// Visible edges whose current string value of `prop` starts with
    /// `prefix`, ascending.
    pub fn find_edges_by_prefix(&self, prop: PropId, prefix: &str) -> Vec<EdgeId> {
        let mut hits: Vec<EdgeId> = self
            .view
            .parts
            .iter()
            .flat_map(|part| part.find_edges_by_prefix(prop, prefix).map(|(id, _)| id))
            .collect();
        hits.sort_unstable();
        hits.dedup();
        hits.retain(|id| {
            self.edge_property(*id, prop)
                .is_some_and(|value| value.as_str().is_some_and(|s| s.starts_with(prefix)))
        });
        hits
    }

    /// Labels and properties of a visible node.
    pub fn node_data(&self, id: NodeId) -> Option<NodeData> {
        let labels = self.labelset(id)?.clone();
        Some(NodeData {
            id,
            labels,
            props: self.node_properties(id),
        })
    }

    /// Record and properties of a visible edge.
    pub fn edge_data(&self, id: EdgeId) -> Option<EdgeData> {
        let record = *self.edge(id)?;
        Some(EdgeData {
            record,
            props: self.edge_properties(id),
        })
    }
}
