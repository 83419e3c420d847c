use crate::change::ChangeAccessor;
use crate::primitives::jobs::JobSystem;
use crate::storage::datapart::DataPartBuilder;
use crate::storage::types::{LabelSet, PropValue};
use crate::types::{ChangeId, CommitHash, EdgeId, NodeId, PropId, Result, TypeId};

use super::builder::CommitBuilder;
use super::commit::Commit;
use super::view::{GraphReader, GraphView};
use super::write_buffer::{EdgeRef, NodeRef, PendingEdgeId, PendingNodeId};

/// Read-only snapshot pinned to one commit.
///
/// The snapshot keeps its commit, and through it every part it can see,
/// alive; later commits never change what it reads.
#[derive(Clone, Debug)]
pub struct Transaction {
    commit: Commit,
}

/// Frozen snapshot of a finished commit.
pub type FrozenCommitTx = Transaction;

impl Transaction {
    /// Pins `commit`.
    pub fn new(commit: Commit) -> Self {
        Self { commit }
    }

    /// Pinned commit.
    pub fn commit(&self) -> &Commit {
        &self.commit
    }

    /// Hash of the pinned commit.
    pub fn hash(&self) -> CommitHash {
        self.commit.hash()
    }

    /// Read projection of the snapshot.
    pub fn view(&self) -> GraphView<'_> {
        self.commit.view()
    }

    /// Reader over the snapshot.
    pub fn read(&self) -> GraphReader<'_> {
        self.commit.reader()
    }
}

/// Read/write transaction bound to the tip builder of a change.
///
/// Holds the change's accessor, so no other writer can open the change
/// until the transaction is dropped or converted back.
pub struct WriteTransaction {
    accessor: ChangeAccessor,
}

impl WriteTransaction {
    pub(crate) fn new(accessor: ChangeAccessor) -> Self {
        Self { accessor }
    }

    /// Change the transaction writes to.
    pub fn change_id(&self) -> ChangeId {
        self.accessor.id()
    }

    /// Hash the tip commit will carry.
    pub fn hash(&self) -> CommitHash {
        self.accessor.tip().hash()
    }

    /// Read projection of the tip's built state. Staged write-buffer
    /// entries become visible once flushed.
    pub fn view(&self) -> GraphView<'_> {
        self.accessor.tip().view_graph()
    }

    /// Reader over the tip's built state.
    pub fn read(&self) -> GraphReader<'_> {
        self.view().reader()
    }

    /// Direct staging access to the tip builder.
    pub fn builder(&mut self) -> Result<&mut CommitBuilder> {
        self.accessor.tip_mut()
    }

    /// The tip's open datapart builder.
    pub fn datapart_builder(&mut self) -> Result<&mut DataPartBuilder> {
        self.accessor.tip_mut()?.current_builder()
    }

    /// Stages a node creation.
    pub fn create_node(
        &mut self,
        labels: LabelSet,
        props: Vec<(PropId, PropValue)>,
    ) -> Result<PendingNodeId> {
        self.accessor.tip_mut()?.create_node(labels, props)
    }

    /// Stages an edge creation.
    pub fn create_edge(
        &mut self,
        ty: TypeId,
        src: impl Into<NodeRef>,
        dst: impl Into<NodeRef>,
        props: Vec<(PropId, PropValue)>,
    ) -> Result<PendingEdgeId> {
        self.accessor
            .tip_mut()?
            .create_edge(ty, src.into(), dst.into(), props)
    }

    /// Stages a node property write.
    pub fn set_node_property(
        &mut self,
        node: impl Into<NodeRef>,
        prop: PropId,
        value: impl Into<PropValue>,
    ) -> Result<()> {
        self.accessor
            .tip_mut()?
            .set_node_property(node.into(), prop, value.into())
    }

    /// Stages an edge property write.
    pub fn set_edge_property(
        &mut self,
        edge: impl Into<EdgeRef>,
        prop: PropId,
        value: impl Into<PropValue>,
    ) -> Result<()> {
        self.accessor
            .tip_mut()?
            .set_edge_property(edge.into(), prop, value.into())
    }

    /// Stages a node deletion.
    pub fn delete_node(&mut self, id: NodeId) -> Result<()> {
        self.accessor.tip_mut()?.delete_node(id)
    }

    /// Stages an edge deletion.
    pub fn delete_edge(&mut self, id: EdgeId) -> Result<()> {
        self.accessor.tip_mut()?.delete_edge(id)
    }

    /// Flushes the write buffer so staged entities become readable.
    pub fn flush(&mut self, jobs: &JobSystem) -> Result<()> {
        self.accessor.tip_mut()?.flush_write_buffer(jobs)
    }

    /// Seals the tip into a commit and opens a fresh tip on top of it.
    pub fn commit(&mut self, jobs: &JobSystem) -> Result<Commit> {
        self.accessor.commit(jobs)
    }

    /// Releases the transaction, returning the held accessor.
    pub fn into_accessor(self) -> ChangeAccessor {
        self.accessor
    }
}

/// Transaction returned when opening a graph at a commit or a change.
pub enum OpenedTransaction {
    /// Frozen snapshot.
    Read(Transaction),
    /// Write access to a change's tip.
    Write(WriteTransaction),
}

impl OpenedTransaction {
    /// Returns the write transaction, if this is one.
    pub fn into_write(self) -> Option<WriteTransaction> {
        match self {
            OpenedTransaction::Write(tx) => Some(tx),
            OpenedTransaction::Read(_) => None,
        }
    }

    /// Returns the frozen snapshot, if this is one.
    pub fn into_read(self) -> Option<Transaction> {
        match self {
            OpenedTransaction::Read(tx) => Some(tx),
            OpenedTransaction::Write(_) => None,
        }
    }

    /// Hash of the commit the transaction reads or writes.
    pub fn hash(&self) -> CommitHash {
        match self {
            OpenedTransaction::Read(tx) => tx.hash(),
            OpenedTransaction::Write(tx) => tx.hash(),
        }
    }
}
