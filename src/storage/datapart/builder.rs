use std::collections::BTreeMap;

use tracing::debug;

use crate::primitives::jobs::JobSystem;
use crate::storage::props::{ColumnValue, PropertyStore};
use crate::storage::types::{EdgeRecord, LabelSet, PropValue};
use crate::types::{EdgeId, LabelId, NodeId, PenumbraError, PropId, Result, TypeId};
use crate::versioning::GraphView;

use super::index::{AdjacencyIndex, StringIndex};
use super::{DataPart, IdShift, PatchCounts};

/// Accumulates nodes, edges and properties for one future [`DataPart`].
///
/// IDs are handed out sequentially from the watermarks the builder was
/// created at. Nothing is validated against committed history until
/// [`DataPartBuilder::build`].
#[derive(Clone, Debug)]
pub struct DataPartBuilder {
    first_node_id: NodeId,
    labelsets: Vec<LabelSet>,
    first_edge_id: EdgeId,
    edges: Vec<EdgeRecord>,
    node_props: PropertyStore,
    edge_props: PropertyStore,
    patches: BTreeMap<NodeId, PatchCounts>,
}

impl DataPartBuilder {
    /// Creates an empty builder allocating from the given watermarks.
    pub fn new(first_node_id: NodeId, first_edge_id: EdgeId) -> Self {
        Self {
            first_node_id,
            labelsets: Vec::new(),
            first_edge_id,
            edges: Vec::new(),
            node_props: PropertyStore::new(),
            edge_props: PropertyStore::new(),
            patches: BTreeMap::new(),
        }
    }

    /// First node ID the builder allocates.
    pub fn first_node_id(&self) -> NodeId {
        self.first_node_id
    }

    /// First edge ID the builder allocates.
    pub fn first_edge_id(&self) -> EdgeId {
        self.first_edge_id
    }

    /// Node ID the next [`add_node`](Self::add_node) call returns.
    pub fn next_node_id(&self) -> NodeId {
        NodeId(self.first_node_id.0 + self.labelsets.len() as u64)
    }

    /// Edge ID the next [`add_edge`](Self::add_edge) call returns.
    pub fn next_edge_id(&self) -> EdgeId {
        EdgeId(self.first_edge_id.0 + self.edges.len() as u64)
    }

    /// Number of nodes added so far.
    pub fn node_count(&self) -> usize {
        self.labelsets.len()
    }

    /// Number of edges added so far.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Returns `true` when the builder holds no data at all.
    pub fn is_empty(&self) -> bool {
        self.labelsets.is_empty()
            && self.edges.is_empty()
            && self.node_props.is_empty()
            && self.edge_props.is_empty()
    }

    /// Allocates a node carrying `labels`.
    pub fn add_node(&mut self, labels: LabelSet) -> NodeId {
        let id = self.next_node_id();
        self.labelsets.push(labels);
        id
    }

    /// Allocates an edge. Endpoints below the builder's range are recorded
    /// as patches against earlier parts.
    pub fn add_edge(&mut self, ty: TypeId, src: NodeId, dst: NodeId) -> Result<EdgeRecord> {
        let next = self.next_node_id();
        for endpoint in [src, dst] {
            if endpoint >= next {
                return Err(PenumbraError::unknown_node(endpoint));
            }
        }
        let record = EdgeRecord {
            id: self.next_edge_id(),
            src,
            dst,
            ty,
        };
        if src < self.first_node_id {
            self.patches.entry(src).or_default().outgoing += 1;
        }
        if dst < self.first_node_id {
            self.patches.entry(dst).or_default().incoming += 1;
        }
        self.edges.push(record);
        Ok(record)
    }

    /// Appends a typed node property value.
    pub fn add_node_property<T: ColumnValue>(
        &mut self,
        node: NodeId,
        prop: PropId,
        value: T,
    ) -> Result<()> {
        if node >= self.next_node_id() {
            return Err(PenumbraError::unknown_node(node));
        }
        self.node_props.push(prop, node.0, value)
    }

    /// Appends a typed edge property value.
    pub fn add_edge_property<T: ColumnValue>(
        &mut self,
        edge: EdgeId,
        prop: PropId,
        value: T,
    ) -> Result<()> {
        if edge >= self.next_edge_id() {
            return Err(PenumbraError::unknown_edge(edge));
        }
        self.edge_props.push(prop, edge.0, value)
    }

    /// Appends a dynamically typed node property value.
    pub fn set_node_property(
        &mut self,
        node: NodeId,
        prop: PropId,
        value: PropValue,
    ) -> Result<()> {
        if node >= self.next_node_id() {
            return Err(PenumbraError::unknown_node(node));
        }
        self.node_props.push_value(prop, node.0, value)
    }

    /// Appends a dynamically typed edge property value.
    pub fn set_edge_property(
        &mut self,
        edge: EdgeId,
        prop: PropId,
        value: PropValue,
    ) -> Result<()> {
        if edge >= self.next_edge_id() {
            return Err(PenumbraError::unknown_edge(edge));
        }
        self.edge_props.push_value(prop, edge.0, value)
    }

    /// External nodes this builder attaches edges to.
    pub fn patched_nodes(&self) -> impl Iterator<Item = (NodeId, PatchCounts)> + '_ {
        self.patches.iter().map(|(id, counts)| (*id, *counts))
    }

    /// Edges added so far, in ID order.
    pub fn edges(&self) -> &[EdgeRecord] {
        &self.edges
    }

    /// External nodes receiving property writes from this builder.
    pub fn external_property_nodes(&self) -> Vec<NodeId> {
        external_ids(&self.node_props, self.first_node_id.0)
            .into_iter()
            .map(NodeId)
            .collect()
    }

    /// External edges receiving property writes from this builder.
    pub fn external_property_edges(&self) -> Vec<EdgeId> {
        external_ids(&self.edge_props, self.first_edge_id.0)
            .into_iter()
            .map(EdgeId)
            .collect()
    }

    /// Moves every ID held by the builder through `shift`.
    pub fn rebase(&mut self, shift: &IdShift) {
        if shift.is_identity() {
            return;
        }
        self.first_node_id = shift.node(self.first_node_id);
        self.first_edge_id = shift.edge(self.first_edge_id);
        for edge in &mut self.edges {
            *edge = shift.edge_record(edge);
        }
        self.node_props = self.node_props.remap(|id| shift.node(NodeId(id)).0);
        self.edge_props = self.edge_props.remap(|id| shift.edge(EdgeId(id)).0);
        self.patches = self
            .patches
            .iter()
            .map(|(id, counts)| (shift.node(*id), *counts))
            .collect();
    }

    pub(crate) fn extend_properties(
        &mut self,
        node_props: &PropertyStore,
        edge_props: &PropertyStore,
    ) -> Result<()> {
        self.node_props.extend_from(node_props)?;
        self.edge_props.extend_from(edge_props)
    }

    /// Validates the builder against `view` and freezes it into a part.
    ///
    /// External references must be visible in `view` or fall inside the
    /// range reserved by sibling builders of the same commit, i.e. between
    /// the view's watermark and this builder's first ID.
    pub fn build(&self, view: &GraphView<'_>, jobs: &JobSystem) -> Result<DataPart> {
        self.validate(view)?;

        let ((out_index, in_index), (node_props, edge_props)) = jobs.join(
            || {
                (
                    AdjacencyIndex::build(&self.edges, |e| e.src),
                    AdjacencyIndex::build(&self.edges, |e| e.dst),
                )
            },
            || (self.node_props.freeze(), self.edge_props.freeze()),
        );
        let (label_index, (node_strings, edge_strings)) = jobs.join(
            || self.label_index(),
            || (StringIndex::build(&node_props), StringIndex::build(&edge_props)),
        );

        debug!(
            first_node = self.first_node_id.0,
            nodes = self.labelsets.len(),
            first_edge = self.first_edge_id.0,
            edges = self.edges.len(),
            patches = self.patches.len(),
            "datapart.build"
        );
        Ok(DataPart {
            first_node_id: self.first_node_id,
            labelsets: self.labelsets.clone(),
            first_edge_id: self.first_edge_id,
            edges: self.edges.clone(),
            out_index,
            in_index,
            node_props,
            edge_props,
            label_index,
            node_strings,
            edge_strings,
            patches: self.patches.clone(),
        })
    }

    fn validate(&self, view: &GraphView<'_>) -> Result<()> {
        let reader = view.reader();
        let pending_nodes = view.next_node_id()..self.first_node_id;
        let pending_edges = view.next_edge_id()..self.first_edge_id;

        for node in self.patches.keys() {
            if !reader.node_exists(*node) && !pending_nodes.contains(node) {
                return Err(PenumbraError::BuildDataPartFailed(format!(
                    "edge endpoint {node} is not visible"
                )));
            }
        }
        for node in self.external_property_nodes() {
            if !reader.node_exists(node) && !pending_nodes.contains(&node) {
                return Err(PenumbraError::BuildDataPartFailed(format!(
                    "property write targets invisible node {node}"
                )));
            }
        }
        for edge in self.external_property_edges() {
            if !reader.edge_exists(edge) && !pending_edges.contains(&edge) {
                return Err(PenumbraError::BuildDataPartFailed(format!(
                    "property write targets invisible edge {edge}"
                )));
            }
        }

        let schema = view.schema();
        for (prop, container) in self.node_props.containers().chain(self.edge_props.containers()) {
            let registered = schema.property_type(prop).ok_or_else(|| {
                PenumbraError::BuildDataPartFailed(format!("property {prop} is not registered"))
            })?;
            if registered.value_type != container.value_type() {
                return Err(PenumbraError::BuildDataPartFailed(format!(
                    "property {prop} is registered as {} but holds {} values",
                    registered.value_type,
                    container.value_type()
                )));
            }
        }
        Ok(())
    }

    fn label_index(&self) -> BTreeMap<LabelId, Vec<NodeId>> {
        let mut index: BTreeMap<_, Vec<NodeId>> = BTreeMap::new();
        let first = self.first_node_id.0;
        for (offset, labels) in self.labelsets.iter().enumerate() {
            for label in labels.iter() {
                index.entry(label).or_default().push(NodeId(first + offset as u64));
            }
        }
        index
    }
}

fn external_ids(store: &PropertyStore, first: u64) -> Vec<u64> {
    let mut ids: Vec<u64> = store
        .containers()
        .flat_map(|(_, container)| container.ids().iter().copied())
        .filter(|id| *id < first)
        .collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}
