//! Named graphs and the operation surface over them.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::info;

use crate::change::ChangeManager;
use crate::primitives::jobs::JobSystem;
use crate::storage::catalog::SchemaRegistry;
use crate::storage::options::{DatabaseOptions, GraphOptions};
use crate::types::{ChangeId, CommitHash, PenumbraError, Result};
use crate::versioning::{Commit, OpenedTransaction, VersionController};

/// One graph: its main line and the changes open against it.
pub struct Graph {
    name: String,
    controller: Arc<VersionController>,
    changes: ChangeManager,
}

impl Graph {
    /// Creates an empty graph.
    pub fn new(name: &str, options: &GraphOptions) -> Result<Self> {
        let controller = Arc::new(VersionController::new(
            name,
            Arc::new(SchemaRegistry::new()),
            options,
        )?);
        Ok(Self {
            name: name.to_owned(),
            changes: ChangeManager::new(Arc::clone(&controller)),
            controller,
        })
    }

    /// Name of the graph.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Main-line controller.
    pub fn controller(&self) -> &Arc<VersionController> {
        &self.controller
    }

    /// Registry of open changes.
    pub fn changes(&self) -> &ChangeManager {
        &self.changes
    }

    /// Schema registry shared by every commit of the graph.
    pub fn schema(&self) -> &Arc<SchemaRegistry> {
        self.controller.schema()
    }
}

/// Collection of named graphs sharing one job system.
pub struct Database {
    options: DatabaseOptions,
    jobs: JobSystem,
    graphs: RwLock<FxHashMap<String, Arc<Graph>>>,
}

impl Database {
    /// Creates a database with no graphs.
    pub fn new(options: DatabaseOptions) -> Result<Self> {
        let jobs = JobSystem::new(options.job_threads)?;
        info!(threads = jobs.threads(), "db.open");
        Ok(Self {
            options,
            jobs,
            graphs: RwLock::new(FxHashMap::default()),
        })
    }

    /// Job system used for builds and merges.
    pub fn jobs(&self) -> &JobSystem {
        &self.jobs
    }

    /// Creates a graph using the database's default graph options.
    pub fn create_graph(&self, name: &str) -> Result<Arc<Graph>> {
        let options = self.options.graph.clone();
        self.create_graph_with(name, options)
    }

    /// Creates a graph with explicit options.
    pub fn create_graph_with(&self, name: &str, options: GraphOptions) -> Result<Arc<Graph>> {
        if name.is_empty() {
            return Err(PenumbraError::Invalid("graph name must not be empty"));
        }
        let mut graphs = self.graphs.write();
        if graphs.contains_key(name) {
            return Err(PenumbraError::GraphExists(name.to_owned()));
        }
        let graph = Arc::new(Graph::new(name, &options)?);
        graphs.insert(name.to_owned(), Arc::clone(&graph));
        Ok(graph)
    }

    /// Looks a graph up by name.
    pub fn graph(&self, name: &str) -> Result<Arc<Graph>> {
        self.graphs
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| PenumbraError::GraphNotFound(name.to_owned()))
    }

    /// Names of all graphs, sorted.
    pub fn list_graphs(&self) -> Vec<String> {
        let mut names: Vec<String> = self.graphs.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Opens a transaction on `graph`.
    ///
    /// Without a change this is a frozen snapshot of `hash` (the head when
    /// `None`). With a change it resolves against that change's commits.
    pub fn open_transaction(
        &self,
        graph: &str,
        hash: Option<CommitHash>,
        change: Option<ChangeId>,
    ) -> Result<OpenedTransaction> {
        let graph = self.graph(graph)?;
        match change {
            Some(id) => graph.changes.open_transaction(id, hash),
            None => Ok(OpenedTransaction::Read(
                graph.controller.open_transaction(hash)?,
            )),
        }
    }

    /// Opens a change on `graph` branching from its head.
    pub fn new_change(&self, graph: &str) -> Result<ChangeId> {
        let graph = self.graph(graph)?;
        let accessor = graph.changes.create_change(None)?;
        Ok(accessor.id())
    }

    /// Submits a change of `graph` to main.
    pub fn submit_change(&self, graph: &str, change: ChangeId) -> Result<Vec<Commit>> {
        let graph = self.graph(graph)?;
        let accessor = graph.changes.acquire(change)?;
        graph.changes.submit(accessor, &self.jobs)
    }

    /// Discards a change of `graph`.
    pub fn delete_change(&self, graph: &str, change: ChangeId) -> Result<()> {
        let graph = self.graph(graph)?;
        let accessor = graph.changes.acquire(change)?;
        graph.changes.delete(accessor)
    }

    /// Open changes of `graph`, ascending.
    pub fn list_changes(&self, graph: &str) -> Result<Vec<ChangeId>> {
        Ok(self.graph(graph)?.changes.list_changes())
    }

    /// Compacts the head of `graph` into a single datapart.
    pub fn merge_data_parts(&self, graph: &str) -> Result<Option<Commit>> {
        self.graph(graph)?.controller.merge_dataparts(&self.jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Database {
        Database::new(DatabaseOptions::new().job_threads(1)).expect("db")
    }

    #[test]
    fn graphs_are_keyed_by_name() {
        let db = db();
        db.create_graph("b").expect("b");
        db.create_graph("a").expect("a");
        assert!(matches!(
            db.create_graph("a"),
            Err(PenumbraError::GraphExists(_))
        ));
        assert_eq!(db.list_graphs(), vec!["a".to_owned(), "b".to_owned()]);
        assert!(matches!(
            db.graph("missing"),
            Err(PenumbraError::GraphNotFound(_))
        ));
    }

    #[test]
    fn change_lifecycle_through_database() {
        let db = db();
        db.create_graph("g").expect("graph");
        let id = db.new_change("g").expect("change");
        assert_eq!(db.list_changes("g").expect("list"), vec![id]);
        db.delete_change("g", id).expect("delete");
        assert!(db.list_changes("g").expect("list").is_empty());
    }

    #[test]
    fn empty_change_submit_keeps_head() {
        let db = db();
        let graph = db.create_graph("g").expect("graph");
        let head = graph.controller().head().hash();
        let id = db.new_change("g").expect("change");
        let commits = db.submit_change("g", id).expect("submit");
        assert!(commits.is_empty());
        assert_eq!(graph.controller().head().hash(), head);
        assert!(db.merge_data_parts("g").expect("merge").is_none());
    }
}
