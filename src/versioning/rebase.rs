//! Rebasing a change's commit stack onto a newer head.
//!
//! A change branched at `base` while main advanced to `head`. Every
//! pre-existing entity a builder references is checked against the deletions
//! main made in between; the first hit aborts the rebase. Otherwise all IDs
//! the change allocated move up past the IDs main allocated, and every
//! builder is restacked on the new head. Built commits keep their hashes.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::storage::datapart::IdShift;
use crate::storage::tombstones::Tombstones;
use crate::types::{EdgeId, NodeId, PenumbraError, Result};

use super::builder::CommitBuilder;
use super::commit::Commit;
use super::write_buffer::EntityRef;

/// Shift moving change-local IDs past everything main allocated between
/// `base` and `head`.
pub fn id_shift(base: &Commit, head: &Commit) -> IdShift {
    let base = base.data();
    let head = head.data();
    IdShift {
        node_floor: base.next_node_id(),
        node_delta: head.next_node_id().0.saturating_sub(base.next_node_id().0),
        edge_floor: base.next_edge_id(),
        edge_delta: head.next_edge_id().0.saturating_sub(base.next_edge_id().0),
    }
}

fn deleted_in(tombstones: &Tombstones, entity: EntityRef) -> bool {
    match entity {
        EntityRef::Node(id) => tombstones.contains_node(id),
        EntityRef::Edge(id) => tombstones.contains_edge(id),
    }
}

/// Fails with the first journaled entity deleted by an intervening commit.
///
/// `intervening` lists the commits strictly after `base` up to and including
/// `head`, oldest first.
pub fn check_conflicts(
    stack: &[CommitBuilder],
    base: &Commit,
    head: &Commit,
    intervening: &[Commit],
) -> Result<()> {
    let shift = id_shift(base, head);
    let head_tombstones = head.data().tombstones();
    for builder in stack {
        for entity in builder.journal() {
            let pre_existing = match entity {
                EntityRef::Node(id) => id < shift.node_floor,
                EntityRef::Edge(id) => id < shift.edge_floor,
            };
            if !pre_existing || !deleted_in(head_tombstones, entity) {
                continue;
            }
            let commit = intervening
                .iter()
                .find(|commit| deleted_in(commit.data().tombstones(), entity))
                .map(Commit::hash)
                .unwrap_or_else(|| head.hash());
            warn!(
                change_commit = %builder.hash(),
                kind = %entity.kind(),
                id = entity.raw(),
                deleted_by = %commit,
                "versioning.rebase.conflict"
            );
            return Err(PenumbraError::Conflict {
                kind: entity.kind(),
                id: entity.raw(),
                commit,
            });
        }
    }
    Ok(())
}

/// Returns `stack` restacked on `head`. The input is left untouched, so a
/// failure anywhere leaves the change as it was.
pub fn rebase_stack(
    stack: &[CommitBuilder],
    base: &Commit,
    head: &Commit,
    intervening: &[Commit],
) -> Result<Vec<CommitBuilder>> {
    check_conflicts(stack, base, head, intervening)?;
    let shift = id_shift(base, head);
    let mut rebased = Vec::with_capacity(stack.len());
    let mut onto = head.clone();
    for builder in stack {
        let next = rebase_builder(builder, &onto, &shift)?;
        if let Some(commit) = next.commit() {
            onto = commit.clone();
        }
        rebased.push(next);
    }
    debug!(
        base = %base.hash(),
        head = %head.hash(),
        builders = rebased.len(),
        node_delta = shift.node_delta,
        edge_delta = shift.edge_delta,
        "versioning.rebase.completed"
    );
    Ok(rebased)
}

fn rebase_builder(
    builder: &CommitBuilder,
    onto: &Commit,
    shift: &IdShift,
) -> Result<CommitBuilder> {
    let mut out = builder.clone();
    let onto_parts = onto.data().history().all_dataparts();
    let mut parts = onto_parts.to_vec();
    for part in builder.own_parts() {
        if shift.is_identity() {
            parts.push(part.clone());
        } else {
            parts.push(builder.ctx.parts.create(part.shifted(shift))?);
        }
    }
    out.own_start = onto_parts.len();
    out.parts = parts;

    out.deleted = builder.deleted.shifted(shift);
    let mut tombstones = onto.data().tombstones().clone();
    tombstones.union_with(&out.deleted);
    out.tombstones = tombstones;

    for pending in &mut out.pending {
        pending.rebase(shift);
    }
    out.write_buffer.rebase(shift);
    out.journal = builder.journal.iter().map(|e| e.shifted(shift)).collect();
    out.next_node_id = shift.node(builder.next_node_id);
    out.next_edge_id = shift.edge(builder.next_edge_id);
    out.base = onto.clone();

    // Main may have attached new edges to base nodes this builder deletes.
    let base_nodes: Vec<NodeId> = out
        .deleted
        .nodes()
        .filter(|id| *id < shift.node_floor)
        .collect();
    if !base_nodes.is_empty() {
        let hanging: Vec<EdgeId> = {
            let reader = out.view_graph().reader();
            base_nodes
                .iter()
                .flat_map(|node| reader.incident_edges(*node))
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        };
        if !hanging.is_empty() {
            out.tombstones.add_deleted_edges(&hanging)?;
            out.deleted.add_deleted_edges(&hanging)?;
            builder.ctx.metrics.edges_deleted(hanging.len() as u64);
        }
    }

    if builder.built.is_some() {
        out.built = None;
        out.seal()?;
    }
    Ok(out)
}
