#![allow(missing_docs)]

use std::sync::Arc;

use penumbra::{
    versioning::NodeRef, CommitPersistence, Database, DatabaseOptions, GraphOptions, GraphView,
    JsonJournal, LabelSet, NodeId, PenumbraError, PropValue, Result, ValueType,
};
use serde_json::Value;
use tempfile::tempdir;

#[test]
fn journal_records_every_main_commit() -> Result<()> {
    let dir = tempdir()?;
    let journal = Arc::new(JsonJournal::new(dir.path()));
    let db = Database::new(DatabaseOptions::new())?;
    let graph = db.create_graph_with("people", GraphOptions::new().persistence(journal.clone()))?;
    let name = graph
        .schema()
        .get_or_create_property("name", ValueType::String)?;
    let person = graph.schema().get_or_create_label("Person")?;
    let knows = graph.schema().get_or_create_edge_type("KNOWS")?;

    let mut change = graph.changes().create_change(None)?;
    {
        let tip = change.tip_mut()?;
        let a = tip.create_node(
            LabelSet::from_labels(&[person]),
            vec![(name.id, PropValue::string("ada"))],
        )?;
        let b = tip.create_node(LabelSet::from_labels(&[person]), Vec::new())?;
        tip.create_edge(knows, a.into(), b.into(), Vec::new())?;
    }
    let first = graph.changes().submit(change, db.jobs())?[0].hash();

    let mut change = graph.changes().create_change(None)?;
    change.tip_mut()?.delete_node(NodeId(1))?;
    let second = graph.changes().submit(change, db.jobs())?[0].hash();

    let record = journal.load_record("people", first)?;
    assert_eq!(record.hash, first.to_hex());
    assert_eq!(record.next_node_id, 2);
    assert_eq!(record.parts.len(), 1);
    let part = &record.parts[0];
    assert_eq!(part.labels, vec![vec![person], vec![person]]);
    assert_eq!(part.edges.len(), 1);
    assert_eq!(part.node_props.len(), 1);
    assert_eq!(part.node_props[0].value, Value::from("ada"));
    assert!(record.deleted_nodes.is_empty());

    let record = journal.load_record("people", second)?;
    assert!(record.parts.is_empty());
    assert_eq!(record.deleted_nodes, vec![NodeId(1)]);
    assert_eq!(record.deleted_edges.len(), 1);
    let tail = &record.journal[record.journal.len() - 2..];
    assert_eq!(tail, &[first.to_hex(), second.to_hex()]);

    let path = dir
        .path()
        .join("people")
        .join(second.to_hex())
        .join("commit.json");
    assert!(path.exists());
    Ok(())
}

struct FailingPersistence;

impl CommitPersistence for FailingPersistence {
    fn persist(&self, _graph: &str, _view: &GraphView<'_>) -> Result<()> {
        Err(PenumbraError::Serialization("disk full".into()))
    }
}

#[test]
fn persistence_failure_aborts_submit() -> Result<()> {
    let db = Database::new(DatabaseOptions::new())?;
    let graph =
        db.create_graph_with("g", GraphOptions::new().persistence(Arc::new(FailingPersistence)))?;
    let head = graph.controller().head().hash();

    let mut change = graph.changes().create_change(None)?;
    change.tip_mut()?.create_node(LabelSet::new(), Vec::new())?;
    let id = change.id();
    let err = graph.changes().submit(change, db.jobs()).expect_err("persist fails");
    assert!(matches!(err, PenumbraError::Serialization(_)));
    assert_eq!(graph.controller().head().hash(), head);
    assert_eq!(graph.changes().list_changes(), vec![id]);
    Ok(())
}

#[test]
fn options_load_from_toml() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("penumbra.toml");
    std::fs::write(
        &path,
        "job_threads = 2\n\n[graph]\nmax_live_dataparts = 8\nmax_live_commits = 32\n",
    )?;
    let options = DatabaseOptions::load(&path)?;
    assert_eq!(options.job_threads, 2);
    assert_eq!(options.graph.max_live_dataparts, 8);
    assert_eq!(options.graph.max_live_commits, 32);

    let db = Database::new(options)?;
    assert_eq!(db.jobs().threads(), 2);

    assert!(matches!(
        DatabaseOptions::from_toml_str("durability = \"none\"\n"),
        Err(PenumbraError::Config(_))
    ));
    Ok(())
}

#[test]
fn datapart_capacity_is_enforced() -> Result<()> {
    let db = Database::new(DatabaseOptions::new())?;
    let graph = db.create_graph_with("g", GraphOptions::new().max_live_dataparts(2))?;

    for _ in 0..2 {
        let mut change = graph.changes().create_change(None)?;
        change.tip_mut()?.create_node(LabelSet::new(), Vec::new())?;
        graph.changes().submit(change, db.jobs())?;
    }

    let mut change = graph.changes().create_change(None)?;
    change.tip_mut()?.create_node(LabelSet::new(), Vec::new())?;
    change.tip_mut()?.set_node_property(
        NodeRef::Existing(NodeId(0)),
        graph
            .schema()
            .get_or_create_property("n", ValueType::Int64)?
            .id,
        PropValue::Int64(1),
    )?;
    let err = change.tip_mut()?.flush_write_buffer(db.jobs()).expect_err("full");
    assert!(matches!(
        err,
        PenumbraError::CapacityExceeded { resource: "datapart", limit: 2 }
    ));
    // The failed flush kept the staged work.
    assert_eq!(change.tip().write_buffer().pending_nodes(), 1);
    assert_eq!(graph.controller().live_objects().0, 2);
    Ok(())
}

#[test]
fn logging_rejects_malformed_filters() {
    assert!(matches!(
        penumbra::init_logging("penumbra=notalevel"),
        Err(PenumbraError::Config(_))
    ));
}
