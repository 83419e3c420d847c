use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

use crate::change::Change;
use crate::persistence::CommitPersistence;
use crate::primitives::arena::ArcManager;
use crate::primitives::jobs::JobSystem;
use crate::storage::catalog::SchemaRegistry;
use crate::storage::merge::DataPartMerger;
use crate::storage::metrics::{default_metrics, StorageMetrics};
use crate::storage::options::GraphOptions;
use crate::storage::tombstones::Tombstones;
use crate::types::{CommitHash, PenumbraError, Result};

use super::builder::{BuilderState, CommitBuilder};
use super::commit::{Commit, CommitData, CommitHistory, GraphContext};
use super::rebase::rebase_stack;
use super::transaction::Transaction;
use super::view::GraphView;

#[derive(Default)]
struct CommitLog {
    commits: Vec<Commit>,
    index: FxHashMap<CommitHash, usize>,
}

impl CommitLog {
    fn push(&mut self, commit: Commit) {
        self.index.insert(commit.hash(), self.commits.len());
        self.commits.push(commit);
    }
}

/// Owner of one graph's main line.
///
/// Readers load the head with a single atomic operation and never block.
/// Submits and merges are totally ordered by one mutex; the head is
/// published with one atomic store once all their work has finished.
pub struct VersionController {
    name: Arc<str>,
    ctx: GraphContext,
    head: ArcSwap<Commit>,
    log: RwLock<CommitLog>,
    write_lock: Mutex<()>,
    persistence: Option<Arc<dyn CommitPersistence>>,
}

impl VersionController {
    /// Creates a controller whose main line holds only an empty root commit.
    pub fn new(name: &str, schema: Arc<SchemaRegistry>, options: &GraphOptions) -> Result<Self> {
        options.validate()?;
        let ctx = GraphContext {
            parts: ArcManager::new("datapart", options.max_live_dataparts),
            commits: ArcManager::new("commit", options.max_live_commits),
            schema: Arc::clone(&schema),
            metrics: options.metrics.clone().unwrap_or_else(default_metrics),
        };
        let root = Commit::new(ctx.commits.create(CommitData::root(CommitHash::random(), schema))?);
        let mut log = CommitLog::default();
        log.push(root.clone());
        info!(graph = name, root = %root.hash(), "versioning.graph.created");
        Ok(Self {
            name: Arc::from(name),
            ctx,
            head: ArcSwap::from_pointee(root),
            log: RwLock::new(log),
            write_lock: Mutex::new(()),
            persistence: options.persistence.clone(),
        })
    }

    /// Name of the graph.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Schema registry of the graph.
    pub fn schema(&self) -> &Arc<SchemaRegistry> {
        &self.ctx.schema
    }

    /// Metrics sink of the graph.
    pub fn metrics(&self) -> &Arc<dyn StorageMetrics> {
        &self.ctx.metrics
    }

    /// Current head of main.
    pub fn head(&self) -> Commit {
        Commit::clone(&self.head.load())
    }

    /// Looks a main commit up by hash.
    pub fn commit(&self, hash: CommitHash) -> Result<Commit> {
        let log = self.log.read();
        log.index
            .get(&hash)
            .map(|idx| log.commits[*idx].clone())
            .ok_or(PenumbraError::CommitNotFound(hash))
    }

    /// Hashes of main, oldest first.
    pub fn commit_hashes(&self) -> Vec<CommitHash> {
        self.log.read().commits.iter().map(Commit::hash).collect()
    }

    /// Commits strictly after `from` up to and including `to`.
    pub fn commits_between(&self, from: CommitHash, to: CommitHash) -> Result<Vec<Commit>> {
        let log = self.log.read();
        let start = *log.index.get(&from).ok_or(PenumbraError::CommitNotFound(from))?;
        let end = *log.index.get(&to).ok_or(PenumbraError::CommitNotFound(to))?;
        if end < start {
            return Err(PenumbraError::Invalid("commit range runs backwards"));
        }
        Ok(log.commits[start + 1..=end].to_vec())
    }

    /// Number of live dataparts and commits held by the graph's arenas.
    pub fn live_objects(&self) -> (usize, usize) {
        (self.ctx.parts.live(), self.ctx.commits.live())
    }

    /// Frozen snapshot of the head, or of the main commit named by `hash`.
    pub fn open_transaction(&self, hash: Option<CommitHash>) -> Result<Transaction> {
        let commit = match hash {
            None => self.head(),
            Some(hash) => self.commit(hash)?,
        };
        Ok(Transaction::new(commit))
    }

    /// Creates a commit builder stacked on `base`.
    pub fn new_commit_builder(&self, base: Commit) -> CommitBuilder {
        CommitBuilder::new(base, self.ctx.clone())
    }

    /// Integrates every commit of `change` into main.
    ///
    /// When main advanced since the change branched, the change is rebased
    /// first. Pending builders are built in order, each new commit is handed
    /// to the persistence collaborator, then the head moves with one store.
    /// On failure neither main nor the change is modified.
    pub fn submit_change(&self, change: &mut Change, jobs: &JobSystem) -> Result<Vec<Commit>> {
        change.ensure_open()?;
        let _guard = self.write_lock.lock();
        let head = self.head();
        let base = change.base().clone();
        info!(
            graph = %self.name,
            change = %change.id(),
            base = %base.hash(),
            head = %head.hash(),
            "versioning.submit.begin"
        );

        let mut stack: Vec<CommitBuilder> = change.builders().cloned().collect();
        if stack
            .last()
            .is_some_and(|tip| tip.state() == BuilderState::Empty)
        {
            stack.pop();
        }

        if head.hash() != base.hash() {
            let intervening = self.commits_between(base.hash(), head.hash())?;
            stack = match rebase_stack(&stack, &base, &head, &intervening) {
                Ok(stack) => stack,
                Err(err) => {
                    if err.is_conflict() {
                        self.ctx.metrics.conflict();
                    }
                    return Err(err);
                }
            };
            self.ctx.metrics.rebase();
        }

        let mut commits = Vec::with_capacity(stack.len());
        for builder in &mut stack {
            let commit = match builder.commit() {
                Some(commit) => commit.clone(),
                None => builder.build(jobs)?,
            };
            commits.push(commit);
        }

        for commit in &commits {
            self.persist(&commit.view())?;
        }

        let new_head = commits.last().cloned();
        {
            let mut log = self.log.write();
            for commit in &commits {
                log.push(commit.clone());
            }
        }
        if let Some(commit) = &new_head {
            self.head.store(Arc::new(commit.clone()));
        }
        self.ctx.metrics.commits_submitted(commits.len() as u64);
        change.finish_submit(stack, new_head.unwrap_or(head));
        info!(
            graph = %self.name,
            change = %change.id(),
            commits = commits.len(),
            head = %self.head().hash(),
            "versioning.submit.completed"
        );
        Ok(commits)
    }

    /// Compacts every part visible from the head into one and publishes a
    /// commit holding only that part. Returns `None` when the head has at
    /// most one part.
    pub fn merge_dataparts(&self, jobs: &JobSystem) -> Result<Option<Commit>> {
        let _guard = self.write_lock.lock();
        let head = self.head();
        let data = head.data();
        let parts = data.history().all_dataparts();
        if parts.len() <= 1 {
            debug!(graph = %self.name, parts = parts.len(), "merge.skipped");
            return Ok(None);
        }

        let builder = DataPartMerger::merge(parts, jobs)?;
        let empty = Tombstones::new();
        let view = GraphView::new(
            head.hash(),
            &[],
            &empty,
            &self.ctx.schema,
            builder.first_node_id(),
            builder.first_edge_id(),
        );
        let part = self.ctx.parts.create(builder.build(&view, jobs)?)?;

        let hash = CommitHash::random();
        let history = CommitHistory::replacing(data.history(), hash, vec![part]);
        let merged = CommitData::new(
            hash,
            history,
            data.tombstones().clone(),
            Arc::clone(&self.ctx.schema),
            &head,
            (data.next_node_id(), data.next_edge_id()),
        );
        let commit = Commit::new(self.ctx.commits.create(merged)?);
        self.persist(&commit.view())?;
        self.log.write().push(commit.clone());
        self.head.store(Arc::new(commit.clone()));
        self.ctx.metrics.merge(parts.len() as u64);
        info!(
            graph = %self.name,
            merged_parts = parts.len(),
            commit = %commit.hash(),
            "merge.completed"
        );
        Ok(Some(commit))
    }

    fn persist(&self, view: &GraphView<'_>) -> Result<()> {
        let Some(persistence) = &self.persistence else {
            return Ok(());
        };
        persistence.persist(&self.name, view).map_err(|err| {
            warn!(
                graph = %self.name,
                commit = %view.hash(),
                error = %err,
                "versioning.persist.failed"
            );
            err
        })
    }
}
