#![allow(missing_docs)]

use std::sync::Arc;

use penumbra::{
    versioning::NodeRef, CommitHash, Database, DatabaseOptions, EntityKind, Graph, LabelSet,
    NodeId, PenumbraError, PropValue, Result, ValueType,
};

fn setup() -> Result<(Database, Arc<Graph>)> {
    let db = Database::new(DatabaseOptions::new())?;
    let graph = db.create_graph("g")?;
    Ok((db, graph))
}

/// Submits a change creating `count` nodes with `label` and returns their IDs.
fn seed_nodes(db: &Database, graph: &Graph, label: &str, count: usize) -> Result<Vec<NodeId>> {
    let label = graph.schema().get_or_create_label(label)?;
    let mut change = graph.changes().create_change(None)?;
    for _ in 0..count {
        change
            .tip_mut()?
            .create_node(LabelSet::from_labels(&[label]), Vec::new())?;
    }
    let before = graph.controller().head().data().next_node_id().0;
    graph.changes().submit(change, db.jobs())?;
    Ok((before..before + count as u64).map(NodeId).collect())
}

#[test]
fn concurrent_creations_are_shifted_past_main() -> Result<()> {
    let (db, graph) = setup()?;
    let base_count = graph.controller().open_transaction(None)?.read().node_count();
    let label_a = graph.schema().get_or_create_label("A")?;
    let label_b = graph.schema().get_or_create_label("B")?;

    let mut a = graph.changes().create_change(None)?;
    let mut b = graph.changes().create_change(None)?;
    a.tip_mut()?
        .create_node(LabelSet::from_labels(&[label_a]), Vec::new())?;
    b.tip_mut()?
        .create_node(LabelSet::from_labels(&[label_b]), Vec::new())?;
    let a_tip = a.tip().hash();

    graph.changes().submit(b, db.jobs())?;
    let commits = graph.changes().submit(a, db.jobs())?;
    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0].hash(), a_tip, "submitted commit keeps its hash");

    let snapshot = graph.controller().open_transaction(None)?;
    let reader = snapshot.read();
    assert_eq!(reader.node_count(), base_count + 2);
    let first = reader.labelset(NodeId(0)).expect("B's node");
    let second = reader.labelset(NodeId(1)).expect("A's node, shifted");
    assert!(first.contains(label_b));
    assert!(second.contains(label_a));
    assert_eq!(snapshot.commit().data().next_node_id(), NodeId(2));
    Ok(())
}

#[test]
fn rebase_fails_on_entity_deleted_by_main() -> Result<()> {
    let (db, graph) = setup()?;
    let nodes = seed_nodes(&db, &graph, "Person", 1)?;
    let target = nodes[0];
    let name = graph
        .schema()
        .get_or_create_property("name", ValueType::String)?;

    let mut writer = graph.changes().create_change(None)?;
    writer.tip_mut()?.set_node_property(
        NodeRef::Existing(target),
        name.id,
        PropValue::string("ada"),
    )?;
    let writer_id = writer.id();

    let mut deleter = graph.changes().create_change(None)?;
    deleter.tip_mut()?.delete_node(target)?;
    let deleted_by = graph.changes().submit(deleter, db.jobs())?[0].hash();
    let head = graph.controller().head().hash();

    let err = graph
        .changes()
        .submit(writer, db.jobs())
        .expect_err("conflict");
    match err {
        PenumbraError::Conflict { kind, id, commit } => {
            assert_eq!(kind, EntityKind::Node);
            assert_eq!(id, target.0);
            assert_eq!(commit, deleted_by);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(graph.controller().head().hash(), head, "main untouched");

    // The change is back in the registry, still on its old base.
    assert_eq!(graph.changes().list_changes(), vec![writer_id]);
    let writer = graph.changes().acquire(writer_id)?;
    assert_ne!(writer.base().hash(), head);
    graph.changes().delete(writer)?;
    Ok(())
}

/// Deletes `target` through a separate change and returns the deleting commit.
fn delete_on_main(db: &Database, graph: &Graph, target: NodeId) -> Result<CommitHash> {
    let mut deleter = graph.changes().create_change(None)?;
    deleter.tip_mut()?.delete_node(target)?;
    Ok(graph.changes().submit(deleter, db.jobs())?[0].hash())
}

fn assert_node_conflict(err: PenumbraError, target: NodeId, deleted_by: CommitHash) {
    match err {
        PenumbraError::Conflict { kind, id, commit } => {
            assert_eq!(kind, EntityKind::Node);
            assert_eq!(id, target.0);
            assert_eq!(commit, deleted_by);
        }
        other => panic!("expected a conflict, got: {other}"),
    }
}

#[test]
fn unbuilt_datapart_edge_to_deleted_node_conflicts() -> Result<()> {
    let (db, graph) = setup()?;
    let target = seed_nodes(&db, &graph, "Person", 1)?[0];
    let knows = graph.schema().get_or_create_edge_type("KNOWS")?;

    let mut writer = graph.changes().create_change(None)?;
    {
        let part = writer.tip_mut()?.current_builder()?;
        let fresh = part.add_node(LabelSet::new());
        part.add_edge(knows, fresh, target)?;
    }
    let writer_id = writer.id();

    let deleted_by = delete_on_main(&db, &graph, target)?;
    let err = graph
        .changes()
        .submit(writer, db.jobs())
        .expect_err("conflict");
    assert_node_conflict(err, target, deleted_by);
    assert_eq!(graph.changes().list_changes(), vec![writer_id]);

    // The rejected change still holds its unbuilt part.
    let writer = graph.changes().acquire(writer_id)?;
    assert_eq!(writer.tip().pending_count(), 1);
    Ok(())
}

#[test]
fn unbuilt_datapart_property_on_deleted_node_conflicts() -> Result<()> {
    let (db, graph) = setup()?;
    let target = seed_nodes(&db, &graph, "Person", 1)?[0];
    let age = graph.schema().get_or_create_property("age", ValueType::Int64)?;

    let mut writer = graph.changes().create_change(None)?;
    writer
        .tip_mut()?
        .current_builder()?
        .add_node_property(target, age.id, 3i64)?;

    let deleted_by = delete_on_main(&db, &graph, target)?;
    let err = graph
        .changes()
        .submit(writer, db.jobs())
        .expect_err("conflict");
    assert_node_conflict(err, target, deleted_by);
    Ok(())
}

#[test]
fn clean_rebase_preserves_counts_and_edges() -> Result<()> {
    let (db, graph) = setup()?;
    let nodes = seed_nodes(&db, &graph, "Seed", 2)?;
    let knows = graph.schema().get_or_create_edge_type("KNOWS")?;
    let new_label = graph.schema().get_or_create_label("New")?;

    let mut a = graph.changes().create_change(None)?;
    {
        let tip = a.tip_mut()?;
        let mut last = None;
        for _ in 0..3 {
            last = Some(tip.create_node(LabelSet::from_labels(&[new_label]), Vec::new())?);
        }
        let friend = last.expect("created");
        tip.create_edge(knows, NodeRef::Existing(nodes[1]), friend.into(), Vec::new())?;
    }

    let mut b = graph.changes().create_change(None)?;
    {
        let tip = b.tip_mut()?;
        tip.create_node(LabelSet::new(), Vec::new())?;
        tip.create_node(LabelSet::new(), Vec::new())?;
        tip.delete_node(nodes[0])?;
    }
    graph.changes().submit(b, db.jobs())?;
    graph.changes().submit(a, db.jobs())?;

    let snapshot = graph.controller().open_transaction(None)?;
    let reader = snapshot.read();
    assert_eq!(reader.node_count(), 2 + 3 + 2 - 1);
    assert!(!reader.node_exists(nodes[0]));

    let out = reader.out_edges(nodes[1]);
    assert_eq!(out.len(), 1);
    // Seeds 0..2, B's nodes 2..4, A's nodes shifted to 4..7.
    assert_eq!(out[0].dst, NodeId(6));
    let labels = reader.labelset(out[0].dst).expect("destination visible");
    assert!(labels.contains(new_label));
    assert_eq!(reader.in_edges(NodeId(6)).len(), 1);
    Ok(())
}

#[test]
fn stacked_commits_are_restacked_in_order() -> Result<()> {
    let (db, graph) = setup()?;
    let mut a = graph.changes().create_change(None)?;
    a.tip_mut()?.create_node(LabelSet::new(), Vec::new())?;
    let first = a.commit(db.jobs())?;
    a.tip_mut()?.create_node(LabelSet::new(), Vec::new())?;
    let second = a.commit(db.jobs())?;
    assert_eq!(second.data().parent().map(|p| p.hash()), Some(first.hash()));

    seed_nodes(&db, &graph, "Main", 4)?;
    let commits = graph.changes().submit(a, db.jobs())?;
    let hashes: Vec<_> = commits.iter().map(|c| c.hash()).collect();
    assert_eq!(hashes, vec![first.hash(), second.hash()]);

    let head = graph.controller().head();
    assert_eq!(head.hash(), second.hash());
    assert_eq!(head.reader().node_count(), 6);
    assert_eq!(head.data().next_node_id(), NodeId(6));
    // The rebased first commit sees main's nodes and only its own addition.
    assert_eq!(commits[0].reader().node_count(), 5);

    let log = graph.controller().commit_hashes();
    assert_eq!(&log[log.len() - 2..], &hashes[..]);
    Ok(())
}

#[test]
fn submitted_change_is_closed() -> Result<()> {
    let (db, graph) = setup()?;
    let mut change = graph.changes().create_change(None)?;
    change.tip_mut()?.create_node(LabelSet::new(), Vec::new())?;
    let id = change.id();
    graph.changes().submit(change, db.jobs())?;
    assert!(matches!(
        db.submit_change("g", id),
        Err(PenumbraError::ChangeNotFound(_))
    ));
    Ok(())
}
