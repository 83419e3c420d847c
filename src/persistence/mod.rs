//! Persistence collaborator invoked for every commit appended to main.
//!
//! The core never reads back what a collaborator writes; persistence is
//! strictly an outbound projection of [`GraphView`].

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::storage::datapart::DataPart;
use crate::storage::props::PropertyStore;
use crate::storage::types::PropValue;
use crate::types::{CommitHash, EdgeId, LabelId, NodeId, PenumbraError, PropId, Result, TypeId};
use crate::versioning::GraphView;

/// Receives each new main commit before the head moves to it.
///
/// An error aborts the submit or merge that produced the commit.
pub trait CommitPersistence: Send + Sync {
    /// Persists the commit described by `view` for graph `graph`.
    fn persist(&self, graph: &str, view: &GraphView<'_>) -> Result<()>;
}

/// Serialized form of one commit written by [`JsonJournal`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitRecord {
    /// Hash of the commit.
    pub hash: String,
    /// Hashes of the main commits this one stacks on, oldest first.
    pub journal: Vec<String>,
    /// Next node identifier after the commit.
    pub next_node_id: u64,
    /// Next edge identifier after the commit.
    pub next_edge_id: u64,
    /// Dataparts introduced by the commit.
    pub parts: Vec<PartRecord>,
    /// Every node tombstoned up to the commit.
    pub deleted_nodes: Vec<NodeId>,
    /// Every edge tombstoned up to the commit.
    pub deleted_edges: Vec<EdgeId>,
}

/// Serialized datapart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartRecord {
    /// First node identifier owned by the part.
    pub first_node_id: u64,
    /// First edge identifier owned by the part.
    pub first_edge_id: u64,
    /// Label sets of the owned nodes, in ID order.
    pub labels: Vec<Vec<LabelId>>,
    /// Owned edges, in ID order.
    pub edges: Vec<EdgeRecordJson>,
    /// Node property values.
    pub node_props: Vec<PropRecord>,
    /// Edge property values.
    pub edge_props: Vec<PropRecord>,
}

/// Serialized edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRecordJson {
    /// Edge identifier.
    pub id: EdgeId,
    /// Source node.
    pub src: NodeId,
    /// Destination node.
    pub dst: NodeId,
    /// Edge type.
    pub ty: TypeId,
}

/// One property value of one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropRecord {
    /// Property identifier.
    pub prop: PropId,
    /// Raw entity identifier.
    pub entity: u64,
    /// JSON rendering of the value.
    pub value: Value,
}

fn prop_json(value: &PropValue) -> Value {
    match value {
        PropValue::Int64(v) => Value::from(*v),
        PropValue::Double(v) => Value::from(*v),
        PropValue::Bool(v) => Value::from(*v),
        PropValue::String(v) => Value::from(v.as_ref()),
    }
}

fn prop_records(store: &PropertyStore) -> Vec<PropRecord> {
    store
        .containers()
        .flat_map(|(prop, container)| {
            container.entries().map(move |(entity, value)| PropRecord {
                prop,
                entity,
                value: prop_json(&value),
            })
        })
        .collect()
}

impl PartRecord {
    fn from_part(part: &DataPart) -> Self {
        Self {
            first_node_id: part.first_node_id().0,
            first_edge_id: part.first_edge_id().0,
            labels: part.nodes().map(|(_, labels)| labels.as_slice().to_vec()).collect(),
            edges: part
                .edges()
                .iter()
                .map(|edge| EdgeRecordJson {
                    id: edge.id,
                    src: edge.src,
                    dst: edge.dst,
                    ty: edge.ty,
                })
                .collect(),
            node_props: prop_records(part.node_props()),
            edge_props: prop_records(part.edge_props()),
        }
    }
}

impl CommitRecord {
    /// Captures the commit described by `view`.
    pub fn from_view(view: &GraphView<'_>) -> Self {
        Self {
            hash: view.hash().to_hex(),
            journal: view.journal().iter().map(|hash| hash.to_hex()).collect(),
            next_node_id: view.next_node_id().0,
            next_edge_id: view.next_edge_id().0,
            parts: view
                .commit_parts()
                .iter()
                .map(|part| PartRecord::from_part(part))
                .collect(),
            deleted_nodes: view.tombstones().nodes().collect(),
            deleted_edges: view.tombstones().edges().collect(),
        }
    }
}

/// Writes one `commit.json` per commit under `<root>/<graph>/<hash>/`.
#[derive(Debug, Clone)]
pub struct JsonJournal {
    root: PathBuf,
}

impl JsonJournal {
    /// Journals into `root`, which is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the journal.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn commit_path(&self, graph: &str, hash: CommitHash) -> PathBuf {
        self.root.join(graph).join(hash.to_hex()).join("commit.json")
    }

    /// Reads back the record written for `hash`.
    pub fn load_record(&self, graph: &str, hash: CommitHash) -> Result<CommitRecord> {
        let bytes = fs::read(self.commit_path(graph, hash))?;
        serde_json::from_slice(&bytes).map_err(|err| PenumbraError::Serialization(err.to_string()))
    }
}

impl CommitPersistence for JsonJournal {
    fn persist(&self, graph: &str, view: &GraphView<'_>) -> Result<()> {
        let record = CommitRecord::from_view(view);
        let path = self.commit_path(graph, view.hash());
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let bytes = serde_json::to_vec_pretty(&record)
            .map_err(|err| PenumbraError::Serialization(err.to_string()))?;
        let tmp = path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        debug!(
            graph,
            commit = %view.hash(),
            parts = record.parts.len(),
            bytes = bytes.len(),
            "persistence.commit.written"
        );
        Ok(())
    }
}
