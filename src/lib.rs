//! Penumbra: the versioning and storage core of a branching graph database.
//!
//! Graph state lives in immutable columnar dataparts. Commits stack parts
//! and cumulative tombstones on top of their parent; changes are private
//! branches of commit builders that are rebased onto main when submitted.
//!
//! ```no_run
//! use penumbra::{Database, DatabaseOptions, LabelSet};
//!
//! # fn main() -> penumbra::Result<()> {
//! let db = Database::new(DatabaseOptions::new())?;
//! let graph = db.create_graph("social")?;
//! let person = graph.schema().get_or_create_label("Person")?;
//!
//! let mut change = graph.changes().create_change(None)?;
//! change.tip_mut()?.create_node(LabelSet::from_labels(&[person]), Vec::new())?;
//! graph.changes().submit(change, db.jobs())?;
//!
//! let snapshot = graph.controller().open_transaction(None)?;
//! assert_eq!(snapshot.read().node_count(), 1);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod change;
pub mod db;
pub mod logging;
pub mod persistence;
pub mod primitives;
pub mod storage;
pub mod types;
pub mod versioning;

pub use change::{Change, ChangeAccessor, ChangeManager, ChangeState};
pub use db::{Database, Graph};
pub use logging::init_logging;
pub use persistence::{CommitPersistence, CommitRecord, JsonJournal};
pub use primitives::arena::{ArcManager, StrongHandle, WeakHandle};
pub use primitives::jobs::JobSystem;
pub use storage::{
    DataPart, DataPartBuilder, DataPartMerger, DatabaseOptions, GraphOptions, LabelSet, PropValue,
    SchemaRegistry, Tombstones,
};
pub use types::{
    ChangeId, CommitHash, EdgeId, EntityKind, LabelId, NodeId, PenumbraError, PropId, Result,
    TypeId, ValueType,
};
pub use versioning::{
    Commit, CommitBuilder, CommitData, CommitHistory, GraphReader, GraphView, OpenedTransaction,
    Transaction, VersionController, WriteTransaction,
};
