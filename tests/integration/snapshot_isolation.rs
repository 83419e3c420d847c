#![allow(missing_docs)]

use penumbra::{
    CommitHash, Database, DatabaseOptions, LabelSet, NodeId, OpenedTransaction, PenumbraError,
    PropValue, Result, ValueType,
};

#[test]
fn old_snapshot_never_sees_later_commits() -> Result<()> {
    let db = Database::new(DatabaseOptions::new())?;
    let graph = db.create_graph("g")?;
    let age = graph
        .schema()
        .get_or_create_property("age", ValueType::Int64)?;

    let mut seed = graph.changes().create_change(None)?;
    seed.tip_mut()?
        .create_node(LabelSet::new(), vec![(age.id, PropValue::Int64(30))])?;
    seed.tip_mut()?.create_node(LabelSet::new(), Vec::new())?;
    graph.changes().submit(seed, db.jobs())?;

    let before = graph.controller().open_transaction(None)?;
    let before_hash = before.hash();

    let mut edit = graph.changes().create_change(None)?;
    edit.tip_mut()?
        .set_node_property(NodeId(0).into(), age.id, PropValue::Int64(31))?;
    edit.tip_mut()?.delete_node(NodeId(1))?;
    edit.tip_mut()?.create_node(LabelSet::new(), Vec::new())?;
    graph.changes().submit(edit, db.jobs())?;
    db.merge_data_parts("g")?;

    let reader = before.read();
    assert_eq!(reader.node_count(), 2);
    assert!(reader.node_exists(NodeId(1)));
    assert!(!reader.node_exists(NodeId(2)));
    assert_eq!(reader.node_property(NodeId(0), age.id), Some(PropValue::Int64(30)));

    let now = graph.controller().open_transaction(None)?;
    let reader = now.read();
    assert_eq!(reader.node_count(), 2);
    assert!(!reader.node_exists(NodeId(1)));
    assert!(reader.node_exists(NodeId(2)));
    assert_eq!(reader.node_property(NodeId(0), age.id), Some(PropValue::Int64(31)));

    let reopened = db.open_transaction("g", Some(before_hash), None)?;
    let reopened = reopened.into_read().expect("frozen snapshot");
    assert_eq!(reopened.read().node_count(), 2);
    assert!(reopened.read().node_exists(NodeId(1)));
    Ok(())
}

#[test]
fn unsubmitted_work_is_private_to_its_change() -> Result<()> {
    let db = Database::new(DatabaseOptions::new())?;
    let graph = db.create_graph("g")?;
    let id = db.new_change("g")?;

    let OpenedTransaction::Write(mut tx) = db.open_transaction("g", None, Some(id))? else {
        panic!("tip opens for writing");
    };
    tx.create_node(LabelSet::new(), Vec::new())?;
    assert_eq!(tx.read().node_count(), 0, "staged writes need a flush");
    tx.flush(db.jobs())?;
    assert_eq!(tx.read().node_count(), 1);
    tx.create_edge(
        graph.schema().get_or_create_edge_type("SELF")?,
        NodeId(0),
        NodeId(0),
        Vec::new(),
    )?;
    let committed = tx.commit(db.jobs())?;
    drop(tx);

    assert_eq!(graph.controller().open_transaction(None)?.read().node_count(), 0);
    assert_eq!(committed.reader().node_count(), 1);
    assert_eq!(committed.reader().edge_count(), 1);

    db.submit_change("g", id)?;
    let reader_tx = db.open_transaction("g", None, None)?;
    let reader_tx = reader_tx.into_read().expect("frozen snapshot");
    assert_eq!(reader_tx.read().node_count(), 1);
    assert_eq!(reader_tx.read().edge_count(), 1);
    Ok(())
}

#[test]
fn unknown_hash_is_reported() -> Result<()> {
    let db = Database::new(DatabaseOptions::new())?;
    db.create_graph("g")?;
    let missing = CommitHash(0x1234);
    assert!(matches!(
        db.open_transaction("g", Some(missing), None),
        Err(PenumbraError::CommitNotFound(hash)) if hash == missing
    ));
    Ok(())
}
