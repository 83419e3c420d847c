//! Commit history, staging, and the per-graph main line.

mod builder;
mod commit;
mod controller;
mod rebase;
mod transaction;
mod view;
mod write_buffer;

pub use builder::{BuilderState, CommitBuilder};
pub use commit::{Commit, CommitData, CommitHistory};
pub use controller::VersionController;
pub use rebase::{check_conflicts, id_shift, rebase_stack};
pub use transaction::{FrozenCommitTx, OpenedTransaction, Transaction, WriteTransaction};
pub use view::{GraphReader, GraphView};
pub use write_buffer::{
    EdgeRef, EntityRef, FlushMap, NodeRef, PendingEdgeId, PendingNodeId, WriteBuffer,
};
