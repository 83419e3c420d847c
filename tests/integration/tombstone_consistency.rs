#![allow(missing_docs)]

use penumbra::{
    versioning::NodeRef, Database, DatabaseOptions, EdgeId, EntityKind, LabelSet, NodeId,
    PenumbraError, Result,
};

/// Main holds a triangle 0 -> 1 -> 2 -> 0.
fn triangle(db: &Database) -> Result<std::sync::Arc<penumbra::Graph>> {
    let graph = db.create_graph("g")?;
    let ty = graph.schema().get_or_create_edge_type("NEXT")?;
    let mut change = graph.changes().create_change(None)?;
    let tip = change.tip_mut()?;
    let a = tip.create_node(LabelSet::new(), Vec::new())?;
    let b = tip.create_node(LabelSet::new(), Vec::new())?;
    let c = tip.create_node(LabelSet::new(), Vec::new())?;
    tip.create_edge(ty, a.into(), b.into(), Vec::new())?;
    tip.create_edge(ty, b.into(), c.into(), Vec::new())?;
    tip.create_edge(ty, c.into(), a.into(), Vec::new())?;
    graph.changes().submit(change, db.jobs())?;
    Ok(graph)
}

#[test]
fn deleting_a_node_removes_its_edges() -> Result<()> {
    let db = Database::new(DatabaseOptions::new())?;
    let graph = triangle(&db)?;

    let mut change = graph.changes().create_change(None)?;
    change.tip_mut()?.delete_node(NodeId(1))?;
    graph.changes().submit(change, db.jobs())?;

    let head = graph.controller().head();
    let reader = head.reader();
    assert_eq!(reader.node_count(), 2);
    assert_eq!(reader.edge_count(), 1);
    assert!(!reader.edge_exists(EdgeId(0)));
    assert!(!reader.edge_exists(EdgeId(1)));
    assert!(reader.edge_exists(EdgeId(2)));
    assert!(reader.out_edges(NodeId(1)).is_empty());
    assert!(reader.in_edges(NodeId(2)).is_empty());
    let tombstones = head.data().tombstones();
    assert!(tombstones.contains_node(NodeId(1)));
    assert_eq!(tombstones.edge_count(), 2);
    Ok(())
}

#[test]
fn direct_deletes_apply_immediately() -> Result<()> {
    let db = Database::new(DatabaseOptions::new())?;
    let graph = triangle(&db)?;
    let mut change = graph.changes().create_change(None)?;
    let tip = change.tip_mut()?;
    tip.delete_edges(&[EdgeId(2)], db.jobs())?;
    tip.delete_nodes(&[NodeId(0)], db.jobs())?;
    let reader = tip.view_graph().reader();
    assert_eq!(reader.node_count(), 2);
    assert_eq!(reader.edge_count(), 1);
    assert_eq!(tip.deleted().edge_count(), 2);
    assert_eq!(tip.deleted().node_count(), 1);
    Ok(())
}

#[test]
fn double_delete_is_rejected() -> Result<()> {
    let db = Database::new(DatabaseOptions::new())?;
    let graph = triangle(&db)?;
    let mut change = graph.changes().create_change(None)?;
    let tip = change.tip_mut()?;
    tip.delete_nodes(&[NodeId(2)], db.jobs())?;
    assert!(matches!(
        tip.delete_node(NodeId(2)),
        Err(PenumbraError::AlreadyDeleted { kind: EntityKind::Node, id: 2 })
    ));
    assert!(matches!(
        tip.delete_edges(&[EdgeId(1)], db.jobs()),
        Err(PenumbraError::AlreadyDeleted { kind: EntityKind::Edge, id: 1 })
    ));
    assert!(matches!(
        tip.delete_node(NodeId(99)),
        Err(PenumbraError::UnknownEntity { kind: EntityKind::Node, id: 99 })
    ));
    // The failed calls left the builder untouched.
    assert_eq!(tip.view_graph().reader().node_count(), 2);
    Ok(())
}

#[test]
fn rebase_removes_edges_main_attached_to_deleted_nodes() -> Result<()> {
    let db = Database::new(DatabaseOptions::new())?;
    let graph = triangle(&db)?;
    let ty = graph.schema().get_or_create_edge_type("LATE")?;

    let mut deleter = graph.changes().create_change(None)?;
    deleter.tip_mut()?.delete_node(NodeId(0))?;
    let sealed = deleter.commit(db.jobs())?;
    assert_eq!(sealed.data().tombstones().edge_count(), 2);

    let mut attacher = graph.changes().create_change(None)?;
    {
        let tip = attacher.tip_mut()?;
        let fresh = tip.create_node(LabelSet::new(), Vec::new())?;
        tip.create_edge(ty, fresh.into(), NodeRef::Existing(NodeId(0)), Vec::new())?;
    }
    graph.changes().submit(attacher, db.jobs())?;
    assert_eq!(graph.controller().head().reader().in_edges(NodeId(0)).len(), 2);

    graph.changes().submit(deleter, db.jobs())?;
    let head = graph.controller().head();
    let reader = head.reader();
    assert!(!reader.node_exists(NodeId(0)));
    assert!(reader.node_exists(NodeId(3)));
    assert!(reader.incident_edges(NodeId(0)).is_empty());
    assert!(reader.out_edges(NodeId(3)).is_empty());
    // Only 1 -> 2 survives.
    assert_eq!(reader.edge_count(), 1);
    assert!(reader.edge_exists(EdgeId(1)));
    Ok(())
}
