//! Secondary indexes frozen into a datapart.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::storage::props::{PropertyContainer, PropertyStore};
use crate::storage::types::EdgeRecord;
use crate::types::{NodeId, PropId};

/// Edge positions sorted by one endpoint, then by edge ID.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct AdjacencyIndex {
    positions: Vec<usize>,
}

impl AdjacencyIndex {
    pub(crate) fn build(edges: &[EdgeRecord], key: fn(&EdgeRecord) -> NodeId) -> Self {
        let mut positions: Vec<usize> = (0..edges.len()).collect();
        // Edges are stored in ID order, so a stable sort keeps ties by ID.
        positions.sort_by_key(|&pos| key(&edges[pos]));
        Self { positions }
    }

    pub(crate) fn range<'a>(
        &'a self,
        edges: &'a [EdgeRecord],
        key: fn(&EdgeRecord) -> NodeId,
        node: NodeId,
    ) -> impl Iterator<Item = &'a EdgeRecord> + 'a {
        let start = self.positions.partition_point(|&pos| key(&edges[pos]) < node);
        self.positions[start..]
            .iter()
            .map(move |&pos| &edges[pos])
            .take_while(move |edge| key(edge) == node)
    }
}

/// Sorted `(value, entity)` pairs per string property, queried by prefix.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StringIndex {
    entries: BTreeMap<PropId, Vec<(Arc<str>, u64)>>,
}

impl StringIndex {
    /// Indexes every string column of a frozen store.
    pub fn build(store: &PropertyStore) -> Self {
        let mut entries = BTreeMap::new();
        for (prop, container) in store.containers() {
            let PropertyContainer::String(column) = container else {
                continue;
            };
            let mut pairs: Vec<(Arc<str>, u64)> = column
                .values()
                .iter()
                .cloned()
                .zip(column.ids().iter().copied())
                .collect();
            pairs.sort();
            entries.insert(prop, pairs);
        }
        Self { entries }
    }

    /// Entities whose value of `prop` starts with `prefix`, in value order.
    pub fn find_prefix<'a>(
        &'a self,
        prop: PropId,
        prefix: &'a str,
    ) -> impl Iterator<Item = (u64, &'a str)> + 'a {
        let pairs = self.entries.get(&prop).map(Vec::as_slice).unwrap_or(&[]);
        let start = pairs.partition_point(|(value, _)| value.as_ref() < prefix);
        pairs[start..]
            .iter()
            .take_while(move |(value, _)| value.starts_with(prefix))
            .map(|(value, id)| (*id, value.as_ref()))
    }

    /// Properties covered by the index.
    pub fn properties(&self) -> impl Iterator<Item = PropId> + '_ {
        self.entries.keys().copied()
    }

    pub(crate) fn remap(&self, map: impl Fn(u64) -> u64) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .map(|(prop, pairs)| {
                    let pairs = pairs
                        .iter()
                        .map(|(value, id)| (Arc::clone(value), map(*id)))
                        .collect();
                    (*prop, pairs)
                })
                .collect(),
        }
    }
}
