use tracing::debug;

use crate::primitives::jobs::JobSystem;
use crate::types::{ChangeId, CommitHash, PenumbraError, Result};
use crate::versioning::{Commit, CommitBuilder};

/// Lifecycle of a [`Change`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ChangeState {
    /// Accepting edits.
    Open,
    /// Integrated into main; terminal.
    Submitted,
    /// Discarded; terminal.
    Deleted,
}

/// A branch: a base commit plus a stack of commit builders.
///
/// Every builder below the tip has been built; the tip receives all edits.
pub struct Change {
    id: ChangeId,
    base: Commit,
    sealed: Vec<CommitBuilder>,
    tip: CommitBuilder,
    state: ChangeState,
}

impl Change {
    pub(crate) fn new(id: ChangeId, base: Commit, tip: CommitBuilder) -> Self {
        Self {
            id,
            base,
            sealed: Vec::new(),
            tip,
            state: ChangeState::Open,
        }
    }

    /// Identifier of the change.
    pub fn id(&self) -> ChangeId {
        self.id
    }

    /// Main commit the change branched from (or was last rebased onto).
    pub fn base(&self) -> &Commit {
        &self.base
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ChangeState {
        self.state
    }

    /// Builders in stacking order; the last one is the tip.
    pub fn builders(&self) -> impl Iterator<Item = &CommitBuilder> + '_ {
        self.sealed.iter().chain(std::iter::once(&self.tip))
    }

    /// Number of builders in the stack, tip included.
    pub fn stack_len(&self) -> usize {
        self.sealed.len() + 1
    }

    /// Commits the change has finished so far.
    pub fn commits(&self) -> impl Iterator<Item = &Commit> + '_ {
        self.builders().filter_map(CommitBuilder::commit)
    }

    /// The tip builder.
    pub fn tip(&self) -> &CommitBuilder {
        &self.tip
    }

    /// Mutable access to the tip builder of an open change.
    pub fn tip_mut(&mut self) -> Result<&mut CommitBuilder> {
        self.ensure_open()?;
        Ok(&mut self.tip)
    }

    /// Builder whose commit carries `hash`, if any.
    pub fn builder(&self, hash: CommitHash) -> Option<&CommitBuilder> {
        self.builders().find(|builder| builder.hash() == hash)
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        match self.state {
            ChangeState::Open => Ok(()),
            _ => Err(PenumbraError::ChangeClosed(self.id)),
        }
    }

    /// Seals the tip into a commit and stacks a fresh tip on top of it.
    pub fn commit(&mut self, jobs: &JobSystem) -> Result<Commit> {
        let tip = self.tip_mut()?;
        let commit = tip.build(jobs)?;
        let next = tip.successor()?;
        let built = std::mem::replace(&mut self.tip, next);
        self.sealed.push(built);
        debug!(
            change = %self.id,
            commit = %commit.hash(),
            stack = self.stack_len(),
            "change.commit"
        );
        Ok(commit)
    }

    pub(crate) fn finish_submit(&mut self, mut builders: Vec<CommitBuilder>, base: Commit) {
        if let Some(tip) = builders.pop() {
            self.sealed = builders;
            self.tip = tip;
        }
        self.base = base;
    }

    pub(crate) fn set_state(&mut self, state: ChangeState) {
        self.state = state;
    }
}
