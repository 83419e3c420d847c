use std::sync::Arc;

use crate::primitives::arena::{ArcManager, StrongHandle, WeakHandle};
use crate::storage::catalog::SchemaRegistry;
use crate::storage::datapart::DataPart;
use crate::storage::metrics::StorageMetrics;
use crate::storage::tombstones::Tombstones;
use crate::types::{CommitHash, EdgeId, NodeId};

use super::view::{GraphReader, GraphView};

/// Cumulative index of the parts reachable from one commit.
///
/// The full part list is carried forward from the parent, so both the
/// commit's own parts and the whole closure are plain slices.
#[derive(Clone, Debug)]
pub struct CommitHistory {
    parts: Vec<StrongHandle<DataPart>>,
    commit_start: usize,
    journal: Vec<CommitHash>,
}

impl CommitHistory {
    /// History of a root commit: no parts, a one-entry journal.
    pub fn root(hash: CommitHash) -> Self {
        Self {
            parts: Vec::new(),
            commit_start: 0,
            journal: vec![hash],
        }
    }

    /// Starts the history of a child of `previous`.
    pub fn new_from_previous(previous: &CommitHistory, hash: CommitHash) -> Self {
        let mut journal = Vec::with_capacity(previous.journal.len() + 1);
        journal.extend_from_slice(&previous.journal);
        journal.push(hash);
        Self {
            parts: previous.parts.clone(),
            commit_start: previous.parts.len(),
            journal,
        }
    }

    /// History whose only part list is `parts`, all owned by this commit.
    pub(crate) fn replacing(
        previous: &CommitHistory,
        hash: CommitHash,
        parts: Vec<StrongHandle<DataPart>>,
    ) -> Self {
        let mut history = Self::new_from_previous(previous, hash);
        history.parts = parts;
        history.commit_start = 0;
        history
    }

    /// Appends a part created by this commit.
    pub fn push_part(&mut self, part: StrongHandle<DataPart>) {
        self.parts.push(part);
    }

    /// Parts created by this commit.
    pub fn commit_dataparts(&self) -> &[StrongHandle<DataPart>] {
        &self.parts[self.commit_start..]
    }

    /// Every part visible from this commit, in ID order.
    pub fn all_dataparts(&self) -> &[StrongHandle<DataPart>] {
        &self.parts
    }

    /// Index of the first part created by this commit.
    pub fn commit_start(&self) -> usize {
        self.commit_start
    }

    /// Commit hashes from the root to this commit.
    pub fn journal(&self) -> &[CommitHash] {
        &self.journal
    }
}

/// Immutable graph state at one commit.
pub struct CommitData {
    hash: CommitHash,
    history: CommitHistory,
    tombstones: Tombstones,
    schema: Arc<SchemaRegistry>,
    parent: Option<WeakHandle<CommitData>>,
    next_node_id: NodeId,
    next_edge_id: EdgeId,
}

impl CommitData {
    /// Root state of an empty graph.
    pub fn root(hash: CommitHash, schema: Arc<SchemaRegistry>) -> Self {
        Self {
            hash,
            history: CommitHistory::root(hash),
            tombstones: Tombstones::new(),
            schema,
            parent: None,
            next_node_id: NodeId(0),
            next_edge_id: EdgeId(0),
        }
    }

    pub(crate) fn new(
        hash: CommitHash,
        history: CommitHistory,
        tombstones: Tombstones,
        schema: Arc<SchemaRegistry>,
        parent: &Commit,
        watermarks: (NodeId, EdgeId),
    ) -> Self {
        Self {
            hash,
            history,
            tombstones,
            schema,
            parent: Some(parent.data.downgrade()),
            next_node_id: watermarks.0,
            next_edge_id: watermarks.1,
        }
    }

    /// Hash of the commit.
    pub fn hash(&self) -> CommitHash {
        self.hash
    }

    /// Part index of the commit.
    pub fn history(&self) -> &CommitHistory {
        &self.history
    }

    /// IDs deleted as of this commit.
    pub fn tombstones(&self) -> &Tombstones {
        &self.tombstones
    }

    /// Schema registry shared by the graph.
    pub fn schema(&self) -> &Arc<SchemaRegistry> {
        &self.schema
    }

    /// Parent state, while something else still keeps it alive.
    pub fn parent(&self) -> Option<StrongHandle<CommitData>> {
        self.parent.as_ref()?.upgrade()
    }

    /// Node ID the next created node receives.
    pub fn next_node_id(&self) -> NodeId {
        self.next_node_id
    }

    /// Edge ID the next created edge receives.
    pub fn next_edge_id(&self) -> EdgeId {
        self.next_edge_id
    }

    /// Read projection of the state.
    pub fn view(&self) -> GraphView<'_> {
        GraphView::new(
            self.hash,
            self.history.all_dataparts(),
            &self.tombstones,
            &self.schema,
            self.next_node_id,
            self.next_edge_id,
        )
        .with_history(self.history.journal(), self.history.commit_start())
    }
}

/// A commit: its hash and a strong handle to its state.
#[derive(Clone)]
pub struct Commit {
    hash: CommitHash,
    data: StrongHandle<CommitData>,
}

impl Commit {
    pub(crate) fn new(data: StrongHandle<CommitData>) -> Self {
        Self {
            hash: data.hash(),
            data,
        }
    }

    /// Hash of the commit.
    pub fn hash(&self) -> CommitHash {
        self.hash
    }

    /// State of the commit.
    pub fn data(&self) -> &CommitData {
        &self.data
    }

    pub(crate) fn handle(&self) -> &StrongHandle<CommitData> {
        &self.data
    }

    /// Read projection of the commit.
    pub fn view(&self) -> GraphView<'_> {
        self.data.view()
    }

    /// Reader over the commit.
    pub fn reader(&self) -> GraphReader<'_> {
        self.view().reader()
    }
}

impl std::fmt::Debug for Commit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Commit")
            .field("hash", &self.hash)
            .field("parts", &self.data.history.all_dataparts().len())
            .field("next_node_id", &self.data.next_node_id)
            .field("next_edge_id", &self.data.next_edge_id)
            .finish()
    }
}

/// Arenas and sinks shared by everything that creates parts or commits
/// for one graph.
#[derive(Clone)]
pub(crate) struct GraphContext {
    pub(crate) parts: ArcManager<DataPart>,
    pub(crate) commits: ArcManager<CommitData>,
    pub(crate) schema: Arc<SchemaRegistry>,
    pub(crate) metrics: Arc<dyn StorageMetrics>,
}
