#![allow(missing_docs)]

use proptest::prelude::*;

use penumbra::{Database, DatabaseOptions, LabelId, LabelSet, NodeId, Result};

struct Outcome {
    /// Head watermark after each submit.
    watermarks: Vec<u64>,
    /// Label of every visible node, in ID order.
    labels: Vec<(NodeId, LabelId)>,
    /// Label assigned to each change.
    change_labels: Vec<LabelId>,
    total: u64,
}

/// Opens one change per entry of `sizes`, all on the same base, then submits
/// them in `order`. Changes flagged in `split` seal half their nodes into an
/// earlier commit first.
fn run(sizes: &[usize], order: &[usize], split: &[bool]) -> Result<Outcome> {
    let db = Database::new(DatabaseOptions::new())?;
    let graph = db.create_graph("g")?;

    let mut changes = Vec::new();
    let mut change_labels = Vec::new();
    for (idx, size) in sizes.iter().enumerate() {
        let label = graph.schema().get_or_create_label(&format!("C{idx}"))?;
        let mut change = graph.changes().create_change(None)?;
        for n in 0..*size {
            if split[idx] && n == size / 2 {
                change.commit(db.jobs())?;
            }
            change
                .tip_mut()?
                .create_node(LabelSet::from_labels(&[label]), Vec::new())?;
        }
        changes.push(Some(change));
        change_labels.push(label);
    }

    let mut watermarks = Vec::new();
    for idx in order {
        if let Some(change) = changes[*idx].take() {
            graph.changes().submit(change, db.jobs())?;
        }
        watermarks.push(graph.controller().head().data().next_node_id().0);
    }

    let head = graph.controller().head();
    let reader = head.reader();
    let labels = reader
        .scan_nodes()
        .map(|id| {
            let label = reader
                .labelset(id)
                .and_then(|set| set.iter().next())
                .unwrap_or(LabelId(u32::MAX));
            (id, label)
        })
        .collect();
    Ok(Outcome {
        watermarks,
        labels,
        change_labels,
        total: sizes.iter().sum::<usize>() as u64,
    })
}

fn scenario() -> impl Strategy<Value = (Vec<usize>, Vec<usize>, Vec<bool>)> {
    (1usize..6).prop_flat_map(|n| {
        (
            prop::collection::vec(1usize..6, n),
            Just((0..n).collect::<Vec<_>>()).prop_shuffle(),
            prop::collection::vec(any::<bool>(), n),
        )
    })
}

proptest! {
    #[test]
    fn prop_ids_are_dense_and_never_reused((sizes, order, split) in scenario()) {
        let outcome = run(&sizes, &order, &split).expect("scenario runs");

        prop_assert!(outcome.watermarks.windows(2).all(|w| w[0] < w[1]));
        prop_assert_eq!(outcome.watermarks.last().copied(), Some(outcome.total));
        prop_assert_eq!(outcome.labels.len() as u64, outcome.total);
        for (expected, (id, _)) in outcome.labels.iter().enumerate() {
            prop_assert_eq!(id.0, expected as u64);
        }

        // Each change's nodes form one contiguous block, placed in submit order.
        let mut next = 0usize;
        for idx in &order {
            let label = outcome.change_labels[*idx];
            let block = &outcome.labels[next..next + sizes[*idx]];
            prop_assert!(block.iter().all(|(_, l)| *l == label));
            next += sizes[*idx];
        }
    }
}

#[test]
fn pending_nodes_flush_in_creation_order() -> Result<()> {
    let db = Database::new(DatabaseOptions::new())?;
    let graph = db.create_graph("g")?;
    let labels: Vec<LabelId> = (0..5)
        .map(|i| graph.schema().get_or_create_label(&format!("L{i}")))
        .collect::<Result<_>>()?;

    let mut change = graph.changes().create_change(None)?;
    for label in &labels {
        change
            .tip_mut()?
            .create_node(LabelSet::from_labels(&[*label]), Vec::new())?;
    }
    change.tip_mut()?.flush_write_buffer(db.jobs())?;
    let view = change.tip().view_graph();
    let reader = view.reader();
    for (i, label) in labels.iter().enumerate() {
        let set = reader.labelset(NodeId(i as u64)).expect("flushed node");
        assert!(set.contains(*label));
    }
    assert_eq!(view.next_node_id(), NodeId(5));
    Ok(())
}
