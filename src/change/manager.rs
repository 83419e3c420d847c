use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

use crate::primitives::jobs::JobSystem;
use crate::types::{ChangeId, CommitHash, PenumbraError, Result};
use crate::versioning::{
    Commit, OpenedTransaction, Transaction, VersionController, WriteTransaction,
};

use super::accessor::ChangeAccessor;
use super::change::{Change, ChangeState};

/// Registry of the open changes of one graph.
///
/// The map lock only guards membership; each change carries its own mutex,
/// so writers on different changes never contend.
pub struct ChangeManager {
    controller: Arc<VersionController>,
    changes: RwLock<FxHashMap<ChangeId, Arc<Mutex<Change>>>>,
    next_id: AtomicU64,
}

impl ChangeManager {
    /// Creates an empty manager for the graph owned by `controller`.
    pub fn new(controller: Arc<VersionController>) -> Self {
        Self {
            controller,
            changes: RwLock::new(FxHashMap::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Controller of the graph.
    pub fn controller(&self) -> &Arc<VersionController> {
        &self.controller
    }

    /// Opens a change branching from `base`, or from the head when `None`.
    ///
    /// The change is returned already acquired.
    pub fn create_change(&self, base: Option<CommitHash>) -> Result<ChangeAccessor> {
        let base = match base {
            None => self.controller.head(),
            Some(hash) => self.controller.commit(hash)?,
        };
        let id = ChangeId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let tip = self.controller.new_commit_builder(base.clone());
        let entry = Arc::new(Mutex::new(Change::new(id, base.clone(), tip)));
        let guard = entry.lock_arc();
        self.changes.write().insert(id, entry);
        info!(
            graph = %self.controller.name(),
            change = %id,
            base = %base.hash(),
            "change.create"
        );
        Ok(ChangeAccessor::new(guard))
    }

    fn entry(&self, id: ChangeId) -> Result<Arc<Mutex<Change>>> {
        self.changes
            .read()
            .get(&id)
            .cloned()
            .ok_or(PenumbraError::ChangeNotFound(id))
    }

    /// Acquires exclusive access to a change, blocking while another writer
    /// holds it.
    pub fn acquire(&self, id: ChangeId) -> Result<ChangeAccessor> {
        let entry = self.entry(id)?;
        let guard = entry.lock_arc();
        // The change may have been submitted or deleted while we waited.
        guard.ensure_open()?;
        debug!(change = %id, "change.acquire");
        Ok(ChangeAccessor::new(guard))
    }

    /// Acquires a change without blocking; `None` while another writer holds
    /// it.
    pub fn try_acquire(&self, id: ChangeId) -> Result<Option<ChangeAccessor>> {
        let entry = self.entry(id)?;
        let Some(guard) = entry.try_lock_arc() else {
            debug!(change = %id, "change.acquire.busy");
            return Ok(None);
        };
        guard.ensure_open()?;
        Ok(Some(ChangeAccessor::new(guard)))
    }

    /// Opens a transaction on a change.
    ///
    /// `None` or the tip's hash yields a write transaction holding the
    /// change. The hash of a finished commit of the change, or of its base,
    /// yields a frozen snapshot and releases the change.
    pub fn open_transaction(
        &self,
        id: ChangeId,
        hash: Option<CommitHash>,
    ) -> Result<OpenedTransaction> {
        let accessor = self.acquire(id)?;
        let Some(hash) = hash else {
            return Ok(OpenedTransaction::Write(WriteTransaction::new(accessor)));
        };
        if accessor.tip().hash() == hash {
            return Ok(OpenedTransaction::Write(WriteTransaction::new(accessor)));
        }
        let commit: Commit = if accessor.base().hash() == hash {
            accessor.base().clone()
        } else {
            accessor
                .builder(hash)
                .and_then(|builder| builder.commit())
                .cloned()
                .ok_or(PenumbraError::CommitNotFound(hash))?
        };
        Ok(OpenedTransaction::Read(Transaction::new(commit)))
    }

    /// Submits the held change to main.
    ///
    /// The change leaves the registry while the controller integrates it. On
    /// success it is marked submitted; on failure it is put back unchanged so
    /// the caller can retry or delete it.
    pub fn submit(&self, mut accessor: ChangeAccessor, jobs: &JobSystem) -> Result<Vec<Commit>> {
        let id = accessor.id();
        accessor.ensure_open()?;
        let entry = self
            .changes
            .write()
            .remove(&id)
            .ok_or(PenumbraError::ChangeNotFound(id))?;
        match self.controller.submit_change(&mut accessor, jobs) {
            Ok(commits) => {
                accessor.set_state(ChangeState::Submitted);
                info!(change = %id, commits = commits.len(), "change.submitted");
                Ok(commits)
            }
            Err(err) => {
                self.changes.write().insert(id, entry);
                warn!(change = %id, error = %err, "change.submit.failed");
                Err(err)
            }
        }
    }

    /// Discards the held change.
    pub fn delete(&self, mut accessor: ChangeAccessor) -> Result<()> {
        let id = accessor.id();
        accessor.ensure_open()?;
        self.changes.write().remove(&id);
        accessor.set_state(ChangeState::Deleted);
        info!(change = %id, "change.deleted");
        Ok(())
    }

    /// IDs of the registered changes, ascending.
    pub fn list_changes(&self) -> Vec<ChangeId> {
        let mut ids: Vec<ChangeId> = self.changes.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}
