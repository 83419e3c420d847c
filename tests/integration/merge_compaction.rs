#![allow(missing_docs)]

use std::sync::Arc;

use penumbra::{
    storage::{CounterMetrics, NodeData},
    versioning::NodeRef,
    Database, DatabaseOptions, EdgeId, Graph, GraphOptions, GraphReader, LabelSet, NodeId, PropId,
    PropValue, Result, ValueType,
};

fn node_dump(reader: &GraphReader<'_>) -> Vec<NodeData> {
    reader
        .scan_nodes()
        .map(|id| reader.node_data(id).expect("scanned node"))
        .collect()
}

type EdgeDump = (EdgeId, NodeId, NodeId, Vec<(PropId, PropValue)>);

fn edge_dump(reader: &GraphReader<'_>) -> Vec<EdgeDump> {
    reader
        .scan_edges()
        .map(|edge| (edge.id, edge.src, edge.dst, reader.edge_properties(edge.id)))
        .collect()
}

/// Three main commits: people, a friendship graph between them, and edits.
fn populate(db: &Database, graph: &Graph) -> Result<()> {
    let person = graph.schema().get_or_create_label("Person")?;
    let name = graph
        .schema()
        .get_or_create_property("name", ValueType::String)?;
    let since = graph
        .schema()
        .get_or_create_property("since", ValueType::Int64)?;
    let knows = graph.schema().get_or_create_edge_type("KNOWS")?;

    let mut change = graph.changes().create_change(None)?;
    for who in ["ada", "alan", "grace", "barbara"] {
        change.tip_mut()?.create_node(
            LabelSet::from_labels(&[person]),
            vec![(name.id, PropValue::string(who))],
        )?;
    }
    graph.changes().submit(change, db.jobs())?;

    let mut change = graph.changes().create_change(None)?;
    for (src, dst) in [(0, 1), (1, 2), (2, 3), (3, 0)] {
        change.tip_mut()?.create_edge(
            knows,
            NodeRef::Existing(NodeId(src)),
            NodeRef::Existing(NodeId(dst)),
            vec![(since.id, PropValue::Int64(1950 + src as i64))],
        )?;
    }
    graph.changes().submit(change, db.jobs())?;

    let mut change = graph.changes().create_change(None)?;
    change.tip_mut()?.set_node_property(
        NodeRef::Existing(NodeId(1)),
        name.id,
        PropValue::string("alan turing"),
    )?;
    change.tip_mut()?.delete_edge(EdgeId(2))?;
    change.tip_mut()?.create_node(LabelSet::new(), Vec::new())?;
    graph.changes().submit(change, db.jobs())?;
    Ok(())
}

#[test]
fn merge_preserves_visible_content() -> Result<()> {
    let db = Database::new(DatabaseOptions::new())?;
    let metrics = Arc::new(CounterMetrics::default());
    let graph = db.create_graph_with("g", GraphOptions::new().metrics(metrics.clone()))?;
    populate(&db, &graph)?;

    let before = graph.controller().head();
    assert_eq!(before.data().history().all_dataparts().len(), 3);
    let nodes = node_dump(&before.reader());
    let edges = edge_dump(&before.reader());

    let merged = db.merge_data_parts("g")?.expect("three parts merge");
    assert_eq!(merged.data().history().all_dataparts().len(), 1);
    assert_eq!(merged.data().history().commit_dataparts().len(), 1);
    assert_eq!(merged.data().tombstones(), before.data().tombstones());
    assert_eq!(merged.data().next_node_id(), before.data().next_node_id());
    assert_eq!(graph.controller().head().hash(), merged.hash());

    let reader = merged.reader();
    assert_eq!(node_dump(&reader), nodes);
    assert_eq!(edge_dump(&reader), edges);
    assert_eq!(reader.out_edges(NodeId(2)).len(), 0);
    assert_eq!(reader.in_edges(NodeId(0)).len(), 1);

    let name = graph.schema().property("name").expect("registered").id;
    assert_eq!(reader.find_nodes_by_prefix(name, "alan"), vec![NodeId(1)]);
    assert_eq!(reader.find_nodes_by_prefix(name, "a"), vec![NodeId(0), NodeId(1)]);

    assert_eq!(CounterMetrics::get(&metrics.merges), 1);
    assert_eq!(CounterMetrics::get(&metrics.merged_parts), 3);
    Ok(())
}

#[test]
fn merge_of_single_part_is_a_no_op() -> Result<()> {
    let db = Database::new(DatabaseOptions::new())?;
    let graph = db.create_graph("g")?;
    assert!(db.merge_data_parts("g")?.is_none());

    let mut change = graph.changes().create_change(None)?;
    change.tip_mut()?.create_node(LabelSet::new(), Vec::new())?;
    graph.changes().submit(change, db.jobs())?;
    let head = graph.controller().head().hash();
    assert!(db.merge_data_parts("g")?.is_none());
    assert_eq!(graph.controller().head().hash(), head);
    Ok(())
}

#[test]
fn changes_keep_working_across_a_merge() -> Result<()> {
    let db = Database::new(DatabaseOptions::new())?;
    let graph = db.create_graph("g")?;
    populate(&db, &graph)?;

    let mut pending = graph.changes().create_change(None)?;
    pending.tip_mut()?.create_edge(
        graph.schema().get_or_create_edge_type("LATE")?,
        NodeRef::Existing(NodeId(4)),
        NodeRef::Existing(NodeId(0)),
        Vec::new(),
    )?;
    db.merge_data_parts("g")?.expect("merged");

    graph.changes().submit(pending, db.jobs())?;
    let head = graph.controller().head();
    assert_eq!(head.data().history().all_dataparts().len(), 2);
    let reader = head.reader();
    assert_eq!(reader.in_edges(NodeId(0)).len(), 2);
    assert_eq!(reader.edge_count(), 4);
    Ok(())
}

#[test]
fn history_stays_pinned_after_merge() -> Result<()> {
    let db = Database::new(DatabaseOptions::new())?;
    let graph = db.create_graph("g")?;
    populate(&db, &graph)?;
    let snapshot = graph.controller().open_transaction(None)?;
    db.merge_data_parts("g")?.expect("merged");

    // The commit log still pins every historical commit and its parts.
    let (parts, _) = graph.controller().live_objects();
    assert_eq!(parts, 4);
    assert_eq!(snapshot.read().node_count(), 5);
    Ok(())
}
