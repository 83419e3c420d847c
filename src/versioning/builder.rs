use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use crate::primitives::arena::StrongHandle;
use crate::primitives::jobs::JobSystem;
use crate::storage::datapart::{DataPart, DataPartBuilder};
use crate::storage::tombstones::Tombstones;
use crate::storage::types::{LabelSet, PropValue};
use crate::types::{CommitHash, EdgeId, EntityKind, NodeId, PenumbraError, PropId, Result, TypeId};

use super::commit::{Commit, CommitData, CommitHistory, GraphContext};
use super::view::GraphView;
use super::write_buffer::{EdgeRef, EntityRef, NodeRef, PendingEdgeId, PendingNodeId, WriteBuffer};

/// Lifecycle of a [`CommitBuilder`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BuilderState {
    /// Nothing staged yet.
    Empty,
    /// Holds staged edits or built parts.
    Staging,
    /// Produced its commit; terminal.
    Built,
}

/// Staging area that turns edits into exactly one [`Commit`].
///
/// A builder stacks on a base commit. Its part list starts as the base's
/// closure and grows as pending [`DataPartBuilder`]s are built; deletions
/// are applied to a private copy of the base's tombstones.
#[derive(Clone)]
pub struct CommitBuilder {
    pub(super) hash: CommitHash,
    pub(super) base: Commit,
    pub(super) ctx: GraphContext,
    pub(super) parts: Vec<StrongHandle<DataPart>>,
    pub(super) own_start: usize,
    pub(super) tombstones: Tombstones,
    pub(super) deleted: Tombstones,
    pub(super) pending: Vec<DataPartBuilder>,
    pub(super) write_buffer: WriteBuffer,
    pub(super) journal: Vec<EntityRef>,
    pub(super) next_node_id: NodeId,
    pub(super) next_edge_id: EdgeId,
    pub(super) built: Option<Commit>,
}

impl CommitBuilder {
    pub(crate) fn new(base: Commit, ctx: GraphContext) -> Self {
        let data = base.data();
        Self {
            hash: CommitHash::random(),
            parts: data.history().all_dataparts().to_vec(),
            own_start: data.history().all_dataparts().len(),
            tombstones: data.tombstones().clone(),
            deleted: Tombstones::new(),
            pending: Vec::new(),
            write_buffer: WriteBuffer::new(),
            journal: Vec::new(),
            next_node_id: data.next_node_id(),
            next_edge_id: data.next_edge_id(),
            built: None,
            base,
            ctx,
        }
    }

    /// Hash the finished commit will carry.
    pub fn hash(&self) -> CommitHash {
        self.hash
    }

    /// Commit this builder stacks on.
    pub fn base(&self) -> &Commit {
        &self.base
    }

    /// Current lifecycle state.
    pub fn state(&self) -> BuilderState {
        if self.built.is_some() {
            BuilderState::Built
        } else if self.pending.is_empty()
            && self.write_buffer.is_empty()
            && self.parts.len() == self.own_start
            && self.deleted.is_empty()
        {
            BuilderState::Empty
        } else {
            BuilderState::Staging
        }
    }

    /// The finished commit, once built.
    pub fn commit(&self) -> Option<&Commit> {
        self.built.as_ref()
    }

    /// Staged write buffer.
    pub fn write_buffer(&self) -> &WriteBuffer {
        &self.write_buffer
    }

    /// Parts this builder created so far.
    pub fn own_parts(&self) -> &[StrongHandle<DataPart>] {
        &self.parts[self.own_start..]
    }

    /// IDs this builder deleted so far.
    pub fn deleted(&self) -> &Tombstones {
        &self.deleted
    }

    /// Number of pending datapart builders.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Pre-existing entities referenced by this builder: built and deleted
    /// references first, then each pending builder in order, then the live
    /// write buffer.
    pub fn journal(&self) -> impl Iterator<Item = EntityRef> + '_ {
        self.journal
            .iter()
            .copied()
            .chain(self.pending.iter().flat_map(external_refs))
            .chain(self.write_buffer.journal().iter().copied())
    }

    /// Read-only projection of the built part of the staged state.
    pub fn view_graph(&self) -> GraphView<'_> {
        let journal = match &self.built {
            Some(commit) => commit.data().history().journal(),
            None => self.base.data().history().journal(),
        };
        GraphView::new(
            self.hash,
            &self.parts,
            &self.tombstones,
            &self.ctx.schema,
            self.next_node_id,
            self.next_edge_id,
        )
        .with_history(journal, self.own_start)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.built.is_some() {
            Err(PenumbraError::AlreadyBuilt)
        } else {
            Ok(())
        }
    }

    /// Watermarks including every pending builder's reservation.
    fn reserved(&self) -> (NodeId, EdgeId) {
        self.pending
            .last()
            .map(|b| (b.next_node_id(), b.next_edge_id()))
            .unwrap_or((self.next_node_id, self.next_edge_id))
    }

    /// Seals the current pending builder and opens a new one at the
    /// reserved watermark.
    pub fn new_builder(&mut self) -> Result<&mut DataPartBuilder> {
        self.ensure_open()?;
        let (node, edge) = self.reserved();
        self.pending.push(DataPartBuilder::new(node, edge));
        self.pending
            .last_mut()
            .ok_or(PenumbraError::Invalid("pending builder vanished"))
    }

    /// The open pending builder, created on first use.
    pub fn current_builder(&mut self) -> Result<&mut DataPartBuilder> {
        self.ensure_open()?;
        if self.pending.is_empty() {
            return self.new_builder();
        }
        self.pending
            .last_mut()
            .ok_or(PenumbraError::Invalid("pending builder vanished"))
    }

    fn check_property(&self, prop: PropId, value: &PropValue) -> Result<()> {
        let registered = self
            .ctx
            .schema
            .property_type(prop)
            .ok_or(PenumbraError::Invalid("property is not registered"))?;
        if registered.value_type != value.value_type() {
            return Err(PenumbraError::PropertyTypeMismatch {
                prop,
                expected: registered.value_type,
                found: value.value_type(),
            });
        }
        Ok(())
    }

    /// Node reachable by staged work: committed and visible, or reserved by
    /// a pending builder.
    fn check_node(&self, id: NodeId) -> Result<()> {
        if self.view_graph().reader().node_exists(id) {
            return Ok(());
        }
        let (reserved, _) = self.reserved();
        if id >= self.next_node_id && id < reserved {
            return Ok(());
        }
        if self.tombstones.contains_node(id) {
            return Err(PenumbraError::AlreadyDeleted {
                kind: EntityKind::Node,
                id: id.0,
            });
        }
        Err(PenumbraError::unknown_node(id))
    }

    fn check_edge(&self, id: EdgeId) -> Result<()> {
        if self.view_graph().reader().edge_exists(id) {
            return Ok(());
        }
        let (_, reserved) = self.reserved();
        if id >= self.next_edge_id && id < reserved {
            return Ok(());
        }
        if self.tombstones.contains_edge(id) {
            return Err(PenumbraError::AlreadyDeleted {
                kind: EntityKind::Edge,
                id: id.0,
            });
        }
        Err(PenumbraError::unknown_edge(id))
    }

    fn check_node_ref(&self, node: NodeRef) -> Result<()> {
        match node {
            NodeRef::Existing(id) => self.check_node(id),
            NodeRef::Pending(_) => Ok(()),
        }
    }

    /// Stages a node creation.
    pub fn create_node(
        &mut self,
        labels: LabelSet,
        props: Vec<(PropId, PropValue)>,
    ) -> Result<PendingNodeId> {
        self.ensure_open()?;
        for (prop, value) in &props {
            self.check_property(*prop, value)?;
        }
        self.write_buffer.create_node(labels, props)
    }

    /// Stages an edge creation between existing or pending nodes.
    pub fn create_edge(
        &mut self,
        ty: TypeId,
        src: NodeRef,
        dst: NodeRef,
        props: Vec<(PropId, PropValue)>,
    ) -> Result<PendingEdgeId> {
        self.ensure_open()?;
        self.check_node_ref(src)?;
        self.check_node_ref(dst)?;
        for (prop, value) in &props {
            self.check_property(*prop, value)?;
        }
        self.write_buffer.create_edge(ty, src, dst, props)
    }

    /// Stages a node property write.
    pub fn set_node_property(
        &mut self,
        node: NodeRef,
        prop: PropId,
        value: PropValue,
    ) -> Result<()> {
        self.ensure_open()?;
        self.check_node_ref(node)?;
        self.check_property(prop, &value)?;
        self.write_buffer.set_node_property(node, prop, value)
    }

    /// Stages an edge property write.
    pub fn set_edge_property(
        &mut self,
        edge: EdgeRef,
        prop: PropId,
        value: PropValue,
    ) -> Result<()> {
        self.ensure_open()?;
        if let EdgeRef::Existing(id) = edge {
            self.check_edge(id)?;
        }
        self.check_property(prop, &value)?;
        self.write_buffer.set_edge_property(edge, prop, value)
    }

    /// Stages a node deletion; incident edges are deleted on flush.
    pub fn delete_node(&mut self, id: NodeId) -> Result<()> {
        self.ensure_open()?;
        self.check_node(id)?;
        self.write_buffer.delete_node(id)
    }

    /// Stages an edge deletion.
    pub fn delete_edge(&mut self, id: EdgeId) -> Result<()> {
        self.ensure_open()?;
        self.check_edge(id)?;
        self.write_buffer.delete_edge(id)
    }

    /// Builds every pending datapart builder, in parallel, and appends the
    /// parts. Either every builder succeeds or nothing changes.
    pub fn build_all_pending(&mut self, jobs: &JobSystem) -> Result<usize> {
        self.ensure_open()?;
        self.pending.retain(|builder| !builder.is_empty());
        if self.pending.is_empty() {
            return Ok(0);
        }
        let view = self.view_graph();
        let work: Vec<_> = self
            .pending
            .iter()
            .map(|builder| move || builder.build(&view, jobs))
            .collect();
        let built = jobs.run_all(work).into_iter().collect::<Result<Vec<_>>>()?;

        let mut handles = Vec::with_capacity(built.len());
        for part in built {
            handles.push(self.ctx.parts.create(part)?);
        }

        let (node_mark, edge_mark) = self.reserved();
        let mut created_nodes = 0;
        let mut created_edges = 0;
        for builder in &self.pending {
            created_nodes += builder.node_count() as u64;
            created_edges += builder.edge_count() as u64;
            self.journal.extend(external_refs(builder));
        }
        let count = handles.len();
        for _ in 0..count {
            self.ctx.metrics.datapart_built();
        }
        self.ctx.metrics.nodes_created(created_nodes);
        self.ctx.metrics.edges_created(created_edges);
        self.parts.extend(handles);
        self.pending.clear();
        self.next_node_id = node_mark;
        self.next_edge_id = edge_mark;
        debug!(
            commit = %self.hash,
            parts = count,
            next_node = node_mark.0,
            next_edge = edge_mark.0,
            "versioning.build_all_pending"
        );
        Ok(count)
    }

    /// Turns the write buffer into one datapart, builds everything pending,
    /// then applies the staged deletions. Nothing changes on failure.
    pub fn flush_write_buffer(&mut self, jobs: &JobSystem) -> Result<()> {
        self.ensure_open()?;
        let checkpoint = self.clone();
        if let Err(err) = self.flush_inner(jobs) {
            *self = checkpoint;
            return Err(err);
        }
        Ok(())
    }

    fn flush_inner(&mut self, jobs: &JobSystem) -> Result<()> {
        let buffer = std::mem::take(&mut self.write_buffer);
        if !buffer.is_empty() {
            let (node, edge) = self.reserved();
            let mut part = DataPartBuilder::new(node, edge);
            buffer.flush_into(&mut part)?;
            self.pending.push(part);
        }
        self.build_all_pending(jobs)?;
        self.journal.extend_from_slice(buffer.journal());
        if !buffer.deleted_edges().is_empty() {
            self.tombstone(&[], buffer.deleted_edges())?;
        }
        if !buffer.deleted_nodes().is_empty() {
            self.tombstone(buffer.deleted_nodes(), &[])?;
        }
        Ok(())
    }

    /// Deletes nodes and their incident edges right away.
    pub fn delete_nodes(&mut self, ids: &[NodeId], jobs: &JobSystem) -> Result<()> {
        self.build_all_pending(jobs)?;
        for id in ids {
            self.check_node(*id)?;
        }
        self.tombstone(ids, &[])?;
        self.journal.extend(ids.iter().map(|id| EntityRef::Node(*id)));
        Ok(())
    }

    /// Deletes edges right away.
    pub fn delete_edges(&mut self, ids: &[EdgeId], jobs: &JobSystem) -> Result<()> {
        self.build_all_pending(jobs)?;
        for id in ids {
            self.check_edge(*id)?;
        }
        self.tombstone(&[], ids)?;
        self.journal.extend(ids.iter().map(|id| EntityRef::Edge(*id)));
        Ok(())
    }

    /// Tombstones `edges`, then `nodes` together with every edge still
    /// visible around them. Applies all or nothing.
    pub(super) fn tombstone(&mut self, nodes: &[NodeId], edges: &[EdgeId]) -> Result<()> {
        let mut tombstones = self.tombstones.clone();
        let mut deleted = self.deleted.clone();
        tombstones.add_deleted_edges(edges)?;
        deleted.add_deleted_edges(edges)?;

        let hanging = {
            let view = GraphView::new(
                self.hash,
                &self.parts,
                &tombstones,
                &self.ctx.schema,
                self.next_node_id,
                self.next_edge_id,
            );
            let reader = view.reader();
            nodes
                .iter()
                .flat_map(|node| reader.incident_edges(*node))
                .collect::<BTreeSet<EdgeId>>()
                .into_iter()
                .collect::<Vec<_>>()
        };
        tombstones.add_deleted_edges(&hanging)?;
        deleted.add_deleted_edges(&hanging)?;
        tombstones.add_deleted_nodes(nodes)?;
        deleted.add_deleted_nodes(nodes)?;

        self.ctx.metrics.nodes_deleted(nodes.len() as u64);
        self.ctx
            .metrics
            .edges_deleted((edges.len() + hanging.len()) as u64);
        if !hanging.is_empty() {
            debug!(
                commit = %self.hash,
                nodes = nodes.len(),
                hanging = hanging.len(),
                "versioning.delete.hanging_edges"
            );
        }
        self.tombstones = tombstones;
        self.deleted = deleted;
        Ok(())
    }

    /// Flushes everything and seals the builder into a commit.
    pub fn build(&mut self, jobs: &JobSystem) -> Result<Commit> {
        self.ensure_open()?;
        self.flush_write_buffer(jobs)?;
        let commit = self.seal()?;
        debug!(
            commit = %commit.hash(),
            parts = self.own_parts().len(),
            deleted_nodes = self.deleted.node_count(),
            deleted_edges = self.deleted.edge_count(),
            "versioning.commit.built"
        );
        Ok(commit)
    }

    /// Opens a builder stacked on this builder's finished commit.
    pub fn successor(&self) -> Result<CommitBuilder> {
        let commit = self
            .built
            .clone()
            .ok_or(PenumbraError::Invalid("builder has not been built"))?;
        Ok(CommitBuilder::new(commit, self.ctx.clone()))
    }

    /// Creates the commit data for the flushed state.
    pub(super) fn seal(&mut self) -> Result<Commit> {
        let mut history = CommitHistory::new_from_previous(self.base.data().history(), self.hash);
        for part in self.own_parts() {
            history.push_part(part.clone());
        }
        let data = CommitData::new(
            self.hash,
            history,
            self.tombstones.clone(),
            Arc::clone(&self.ctx.schema),
            &self.base,
            (self.next_node_id, self.next_edge_id),
        );
        let commit = Commit::new(self.ctx.commits.create(data)?);
        self.built = Some(commit.clone());
        Ok(commit)
    }
}

/// Entities below `builder`'s range that its edges or property writes touch.
fn external_refs(builder: &DataPartBuilder) -> Vec<EntityRef> {
    let mut refs: Vec<EntityRef> = builder
        .patched_nodes()
        .map(|(id, _)| EntityRef::Node(id))
        .collect();
    refs.extend(
        builder
            .external_property_nodes()
            .into_iter()
            .map(EntityRef::Node),
    );
    refs.extend(
        builder
            .external_property_edges()
            .into_iter()
            .map(EntityRef::Edge),
    );
    refs
}

impl std::fmt::Debug for CommitBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitBuilder")
            .field("hash", &self.hash)
            .field("base", &self.base.hash())
            .field("state", &self.state())
            .field("pending", &self.pending.len())
            .finish()
    }
}
