#![allow(missing_docs)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use penumbra::{Database, DatabaseOptions, LabelSet, NodeId, Result};

#[test]
fn only_one_writer_holds_a_change() -> Result<()> {
    let db = Database::new(DatabaseOptions::new())?;
    let graph = db.create_graph("g")?;
    let id = graph.changes().create_change(None)?.id();

    const THREADS: usize = 8;
    let barrier = Arc::new(Barrier::new(THREADS));
    let winners = Arc::new(AtomicUsize::new(0));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let graph = Arc::clone(&graph);
            let barrier = Arc::clone(&barrier);
            let winners = Arc::clone(&winners);
            thread::spawn(move || -> Result<()> {
                let held = graph.changes().try_acquire(id)?;
                barrier.wait();
                if held.is_some() {
                    winners.fetch_add(1, Ordering::SeqCst);
                }
                // Keep the accessor until every thread has tried.
                barrier.wait();
                drop(held);
                Ok(())
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("writer thread")?;
    }
    assert_eq!(winners.load(Ordering::SeqCst), 1);
    assert!(graph.changes().try_acquire(id)?.is_some());
    Ok(())
}

#[test]
fn blocked_writers_apply_in_turn() -> Result<()> {
    let db = Database::new(DatabaseOptions::new())?;
    let graph = db.create_graph("g")?;
    let id = graph.changes().create_change(None)?.id();

    const THREADS: usize = 4;
    const PER_THREAD: usize = 25;
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let graph = Arc::clone(&graph);
            thread::spawn(move || -> Result<()> {
                for _ in 0..PER_THREAD {
                    let mut change = graph.changes().acquire(id)?;
                    change.tip_mut()?.create_node(LabelSet::new(), Vec::new())?;
                }
                Ok(())
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("writer thread")?;
    }

    let change = graph.changes().acquire(id)?;
    assert_eq!(change.tip().write_buffer().pending_nodes(), THREADS * PER_THREAD);
    graph.changes().submit(change, db.jobs())?;
    let head = graph.controller().head();
    assert_eq!(head.reader().node_count(), THREADS * PER_THREAD);
    assert!(head.reader().node_exists(NodeId((THREADS * PER_THREAD - 1) as u64)));
    Ok(())
}

#[test]
fn submits_from_many_threads_are_serialized() -> Result<()> {
    let db = Arc::new(Database::new(DatabaseOptions::new().job_threads(2))?);
    let graph = db.create_graph("g")?;

    const THREADS: usize = 6;
    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let db = Arc::clone(&db);
            let graph = Arc::clone(&graph);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || -> Result<()> {
                let mut change = graph.changes().create_change(None)?;
                change.tip_mut()?.create_node(LabelSet::new(), Vec::new())?;
                change.tip_mut()?.create_node(LabelSet::new(), Vec::new())?;
                barrier.wait();
                graph.changes().submit(change, db.jobs())?;
                Ok(())
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("submit thread")?;
    }

    let head = graph.controller().head();
    let reader = head.reader();
    assert_eq!(reader.node_count(), THREADS * 2);
    assert_eq!(head.data().next_node_id(), NodeId((THREADS * 2) as u64));
    for id in 0..(THREADS * 2) as u64 {
        assert!(reader.node_exists(NodeId(id)), "node {id} visible");
    }
    // Root plus one commit per change.
    assert_eq!(graph.controller().commit_hashes().len(), THREADS + 1);
    Ok(())
}
