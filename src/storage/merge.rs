//! User-triggered compaction of many parts into one.

use tracing::debug;

use crate::primitives::arena::StrongHandle;
use crate::primitives::jobs::JobSystem;
use crate::storage::datapart::{DataPart, DataPartBuilder};
use crate::storage::props::PropertyStore;
use crate::types::{PenumbraError, Result};

/// Concatenates parts into a single builder.
pub struct DataPartMerger;

impl DataPartMerger {
    /// Appends labelsets, edges and property columns of `parts`, in order,
    /// into one builder covering their combined ranges.
    ///
    /// The parts must be contiguous. Property columns are concatenated in
    /// part order, so a later patch still wins once the builder is frozen.
    /// String values are shared with the source parts.
    pub fn merge(parts: &[StrongHandle<DataPart>], jobs: &JobSystem) -> Result<DataPartBuilder> {
        let Some(first) = parts.first() else {
            return Err(PenumbraError::Invalid("merge needs at least one datapart"));
        };
        let mut builder = DataPartBuilder::new(first.first_node_id(), first.first_edge_id());
        for part in parts {
            if part.first_node_id() != builder.next_node_id()
                || part.first_edge_id() != builder.next_edge_id()
            {
                return Err(PenumbraError::BuildDataPartFailed(format!(
                    "datapart at node {} / edge {} is not contiguous with its predecessor",
                    part.first_node_id(),
                    part.first_edge_id()
                )));
            }
            for (_, labels) in part.nodes() {
                builder.add_node(labels.clone());
            }
            for edge in part.edges() {
                builder.add_edge(edge.ty, edge.src, edge.dst)?;
            }
        }

        let (node_props, edge_props) = jobs.join(
            || concat(parts, DataPart::node_props),
            || concat(parts, DataPart::edge_props),
        );
        builder.extend_properties(&node_props?, &edge_props?)?;
        debug!(
            parts = parts.len(),
            nodes = builder.node_count(),
            edges = builder.edge_count(),
            "merge.builder_ready"
        );
        Ok(builder)
    }
}

fn concat(
    parts: &[StrongHandle<DataPart>],
    select: fn(&DataPart) -> &PropertyStore,
) -> Result<PropertyStore> {
    let mut merged = PropertyStore::new();
    for part in parts {
        merged.extend_from(select(part))?;
    }
    Ok(merged)
}
