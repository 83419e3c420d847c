//! Change-local staging of creations, property writes and deletions.
//!
//! Entities created through the buffer carry temporary IDs until the buffer
//! is flushed into one datapart builder. Every pre-existing entity the buffer
//! touches is appended to a journal in operation order, which rebase uses to
//! detect conflicts deterministically.

use crate::storage::datapart::{DataPartBuilder, IdShift};
use crate::storage::types::{LabelSet, PropValue};
use crate::types::{EdgeId, EntityKind, NodeId, PenumbraError, PropId, Result, TypeId};

/// Temporary ID of a node created through a write buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PendingNodeId(u32);

/// Temporary ID of an edge created through a write buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PendingEdgeId(u32);

/// A node addressed either by its real ID or by a temporary one.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NodeRef {
    /// Node visible in the builder's view.
    Existing(NodeId),
    /// Node created earlier in the same write buffer.
    Pending(PendingNodeId),
}

/// An edge addressed either by its real ID or by a temporary one.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EdgeRef {
    /// Edge visible in the builder's view.
    Existing(EdgeId),
    /// Edge created earlier in the same write buffer.
    Pending(PendingEdgeId),
}

impl From<NodeId> for NodeRef {
    fn from(id: NodeId) -> Self {
        NodeRef::Existing(id)
    }
}

impl From<PendingNodeId> for NodeRef {
    fn from(id: PendingNodeId) -> Self {
        NodeRef::Pending(id)
    }
}

impl From<EdgeId> for EdgeRef {
    fn from(id: EdgeId) -> Self {
        EdgeRef::Existing(id)
    }
}

impl From<PendingEdgeId> for EdgeRef {
    fn from(id: PendingEdgeId) -> Self {
        EdgeRef::Pending(id)
    }
}

/// A pre-existing entity referenced by staged work.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum EntityRef {
    /// A node.
    Node(NodeId),
    /// An edge.
    Edge(EdgeId),
}

impl EntityRef {
    /// Kind of the referenced entity.
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityRef::Node(_) => EntityKind::Node,
            EntityRef::Edge(_) => EntityKind::Edge,
        }
    }

    /// Raw ID of the referenced entity.
    pub fn raw(&self) -> u64 {
        match self {
            EntityRef::Node(id) => id.0,
            EntityRef::Edge(id) => id.0,
        }
    }

    pub(crate) fn shifted(&self, shift: &IdShift) -> EntityRef {
        match self {
            EntityRef::Node(id) => EntityRef::Node(shift.node(*id)),
            EntityRef::Edge(id) => EntityRef::Edge(shift.edge(*id)),
        }
    }
}

#[derive(Clone, Debug)]
struct PendingNode {
    labels: LabelSet,
    props: Vec<(PropId, PropValue)>,
}

#[derive(Clone, Debug)]
struct PendingEdge {
    ty: TypeId,
    src: NodeRef,
    dst: NodeRef,
    props: Vec<(PropId, PropValue)>,
}

/// Real IDs assigned to a buffer's temporary IDs by a flush.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FlushMap {
    nodes: Vec<NodeId>,
    edges: Vec<EdgeId>,
}

impl FlushMap {
    /// Real ID of a pending node.
    pub fn node(&self, id: PendingNodeId) -> Option<NodeId> {
        self.nodes.get(id.0 as usize).copied()
    }

    /// Real ID of a pending edge.
    pub fn edge(&self, id: PendingEdgeId) -> Option<EdgeId> {
        self.edges.get(id.0 as usize).copied()
    }
}

/// Staged edits awaiting a flush.
#[derive(Clone, Debug, Default)]
pub struct WriteBuffer {
    nodes: Vec<PendingNode>,
    edges: Vec<PendingEdge>,
    node_writes: Vec<(NodeId, PropId, PropValue)>,
    edge_writes: Vec<(EdgeId, PropId, PropValue)>,
    deleted_nodes: Vec<NodeId>,
    deleted_edges: Vec<EdgeId>,
    journal: Vec<EntityRef>,
}

impl WriteBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
            && self.edges.is_empty()
            && self.node_writes.is_empty()
            && self.edge_writes.is_empty()
            && self.deleted_nodes.is_empty()
            && self.deleted_edges.is_empty()
    }

    /// Number of staged node creations.
    pub fn pending_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Number of staged edge creations.
    pub fn pending_edges(&self) -> usize {
        self.edges.len()
    }

    /// Pre-existing entities referenced so far, in operation order.
    pub fn journal(&self) -> &[EntityRef] {
        &self.journal
    }

    /// Nodes staged for deletion.
    pub fn deleted_nodes(&self) -> &[NodeId] {
        &self.deleted_nodes
    }

    /// Edges staged for deletion.
    pub fn deleted_edges(&self) -> &[EdgeId] {
        &self.deleted_edges
    }

    /// Stages a node creation.
    pub fn create_node(
        &mut self,
        labels: LabelSet,
        props: Vec<(PropId, PropValue)>,
    ) -> Result<PendingNodeId> {
        let id = u32::try_from(self.nodes.len())
            .map_err(|_| PenumbraError::Invalid("too many pending nodes"))?;
        self.nodes.push(PendingNode { labels, props });
        Ok(PendingNodeId(id))
    }

    /// Stages an edge creation. Existing endpoints are journaled.
    pub fn create_edge(
        &mut self,
        ty: TypeId,
        src: NodeRef,
        dst: NodeRef,
        props: Vec<(PropId, PropValue)>,
    ) -> Result<PendingEdgeId> {
        self.check_node_ref(src)?;
        self.check_node_ref(dst)?;
        let id = u32::try_from(self.edges.len())
            .map_err(|_| PenumbraError::Invalid("too many pending edges"))?;
        for endpoint in [src, dst] {
            if let NodeRef::Existing(node) = endpoint {
                self.journal.push(EntityRef::Node(node));
            }
        }
        self.edges.push(PendingEdge { ty, src, dst, props });
        Ok(PendingEdgeId(id))
    }

    /// Stages a node property write.
    pub fn set_node_property(
        &mut self,
        node: NodeRef,
        prop: PropId,
        value: PropValue,
    ) -> Result<()> {
        match node {
            NodeRef::Pending(pending) => {
                let entry = self
                    .nodes
                    .get_mut(pending.0 as usize)
                    .ok_or(PenumbraError::Invalid("unknown pending node"))?;
                entry.props.push((prop, value));
            }
            NodeRef::Existing(id) => {
                self.journal.push(EntityRef::Node(id));
                self.node_writes.push((id, prop, value));
            }
        }
        Ok(())
    }

    /// Stages an edge property write.
    pub fn set_edge_property(
        &mut self,
        edge: EdgeRef,
        prop: PropId,
        value: PropValue,
    ) -> Result<()> {
        match edge {
            EdgeRef::Pending(pending) => {
                let entry = self
                    .edges
                    .get_mut(pending.0 as usize)
                    .ok_or(PenumbraError::Invalid("unknown pending edge"))?;
                entry.props.push((prop, value));
            }
            EdgeRef::Existing(id) => {
                self.journal.push(EntityRef::Edge(id));
                self.edge_writes.push((id, prop, value));
            }
        }
        Ok(())
    }

    /// Stages a node deletion.
    pub fn delete_node(&mut self, id: NodeId) -> Result<()> {
        if self.deleted_nodes.contains(&id) {
            return Err(PenumbraError::AlreadyDeleted {
                kind: EntityKind::Node,
                id: id.0,
            });
        }
        self.journal.push(EntityRef::Node(id));
        self.deleted_nodes.push(id);
        Ok(())
    }

    /// Stages an edge deletion.
    pub fn delete_edge(&mut self, id: EdgeId) -> Result<()> {
        if self.deleted_edges.contains(&id) {
            return Err(PenumbraError::AlreadyDeleted {
                kind: EntityKind::Edge,
                id: id.0,
            });
        }
        self.journal.push(EntityRef::Edge(id));
        self.deleted_edges.push(id);
        Ok(())
    }

    fn check_node_ref(&self, node: NodeRef) -> Result<()> {
        match node {
            NodeRef::Pending(pending) if pending.0 as usize >= self.nodes.len() => {
                Err(PenumbraError::Invalid("unknown pending node"))
            }
            _ => Ok(()),
        }
    }

    /// Writes creations and property writes into `builder`, mapping every
    /// temporary ID to the real ID the builder allocates.
    pub fn flush_into(&self, builder: &mut DataPartBuilder) -> Result<FlushMap> {
        let mut map = FlushMap::default();
        for node in &self.nodes {
            map.nodes.push(builder.add_node(node.labels.clone()));
        }
        let resolve = |node: NodeRef, map: &FlushMap| match node {
            NodeRef::Existing(id) => Ok(id),
            NodeRef::Pending(pending) => map
                .node(pending)
                .ok_or(PenumbraError::Invalid("unknown pending node")),
        };
        for edge in &self.edges {
            let src = resolve(edge.src, &map)?;
            let dst = resolve(edge.dst, &map)?;
            map.edges.push(builder.add_edge(edge.ty, src, dst)?.id);
        }
        for (node, pending) in map.nodes.iter().zip(&self.nodes) {
            for (prop, value) in &pending.props {
                builder.set_node_property(*node, *prop, value.clone())?;
            }
        }
        for (edge, pending) in map.edges.iter().zip(&self.edges) {
            for (prop, value) in &pending.props {
                builder.set_edge_property(*edge, *prop, value.clone())?;
            }
        }
        for (node, prop, value) in &self.node_writes {
            builder.set_node_property(*node, *prop, value.clone())?;
        }
        for (edge, prop, value) in &self.edge_writes {
            builder.set_edge_property(*edge, *prop, value.clone())?;
        }
        Ok(map)
    }

    /// Moves every real ID held by the buffer through `shift`.
    pub fn rebase(&mut self, shift: &IdShift) {
        if shift.is_identity() {
            return;
        }
        let node = |r: &mut NodeRef| {
            if let NodeRef::Existing(id) = r {
                *id = shift.node(*id);
            }
        };
        for edge in &mut self.edges {
            node(&mut edge.src);
            node(&mut edge.dst);
        }
        for (id, _, _) in &mut self.node_writes {
            *id = shift.node(*id);
        }
        for (id, _, _) in &mut self.edge_writes {
            *id = shift.edge(*id);
        }
        for id in &mut self.deleted_nodes {
            *id = shift.node(*id);
        }
        for id in &mut self.deleted_edges {
            *id = shift.edge(*id);
        }
        for entry in &mut self.journal {
            *entry = entry.shifted(shift);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flush_maps_temporary_ids() {
        let mut buffer = WriteBuffer::new();
        let a = buffer.create_node(LabelSet::new(), vec![]).unwrap();
        let b = buffer
            .create_node(LabelSet::new(), vec![(PropId(0), PropValue::Int64(1))])
            .unwrap();
        let e = buffer
            .create_edge(TypeId(0), a.into(), NodeRef::Existing(NodeId(2)), vec![])
            .unwrap();
        buffer
            .set_node_property(b.into(), PropId(0), PropValue::Int64(2))
            .unwrap();
        assert_eq!(buffer.journal(), &[EntityRef::Node(NodeId(2))]);

        let mut builder = DataPartBuilder::new(NodeId(5), EdgeId(3));
        let map = buffer.flush_into(&mut builder).unwrap();
        assert_eq!(map.node(a), Some(NodeId(5)));
        assert_eq!(map.node(b), Some(NodeId(6)));
        assert_eq!(map.edge(e), Some(EdgeId(3)));
        assert_eq!(builder.edges()[0].dst, NodeId(2));
        assert_eq!(builder.patched_nodes().count(), 1);
    }

    #[test]
    fn deleting_twice_is_rejected() {
        let mut buffer = WriteBuffer::new();
        buffer.delete_edge(EdgeId(1)).unwrap();
        assert!(matches!(
            buffer.delete_edge(EdgeId(1)),
            Err(PenumbraError::AlreadyDeleted { .. })
        ));
        assert!(!buffer.is_empty());
    }

    #[test]
    fn unknown_pending_reference_is_rejected() {
        let mut buffer = WriteBuffer::new();
        let ghost = PendingNodeId(3);
        assert!(buffer
            .create_edge(TypeId(0), ghost.into(), ghost.into(), vec![])
            .is_err());
        assert!(buffer
            .set_node_property(ghost.into(), PropId(0), PropValue::Bool(true))
            .is_err());
    }

    #[test]
    fn rebase_shifts_existing_refs() {
        let mut buffer = WriteBuffer::new();
        buffer.delete_node(NodeId(1)).unwrap();
        buffer.delete_node(NodeId(7)).unwrap();
        buffer.rebase(&IdShift {
            node_floor: NodeId(5),
            node_delta: 3,
            edge_floor: EdgeId(0),
            edge_delta: 0,
        });
        assert_eq!(buffer.deleted_nodes(), &[NodeId(1), NodeId(10)]);
        assert_eq!(buffer.journal()[1], EntityRef::Node(NodeId(10)));
    }
}
