use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters reported by the versioning and storage core.
///
/// A graph reports through one sink shared by its version controller and
/// commit builders. Counts arrive in batches at the points where the work
/// becomes durable in a built part or a published commit.
pub trait StorageMetrics: Send + Sync {
    /// Records nodes allocated by a built datapart.
    fn nodes_created(&self, count: u64);

    /// Records nodes tombstoned by a commit builder.
    fn nodes_deleted(&self, count: u64);

    /// Records edges allocated by a built datapart.
    fn edges_created(&self, count: u64);

    /// Records edges tombstoned by a commit builder, hanging edges included.
    fn edges_deleted(&self, count: u64);

    /// Records one datapart frozen by a builder.
    fn datapart_built(&self);

    /// Records commits appended to main by one submit.
    fn commits_submitted(&self, count: u64);

    /// Records a change rebased onto a newer head.
    fn rebase(&self);

    /// Records a submit rejected by a rebase conflict.
    fn conflict(&self);

    /// Records a completed datapart merge.
    fn merge(&self, parts: u64);
}

/// A no-op implementation of [`StorageMetrics`].
#[derive(Default)]
pub struct NoopMetrics;

impl StorageMetrics for NoopMetrics {
    fn nodes_created(&self, _count: u64) {}
    fn nodes_deleted(&self, _count: u64) {}
    fn edges_created(&self, _count: u64) {}
    fn edges_deleted(&self, _count: u64) {}
    fn datapart_built(&self) {}
    fn commits_submitted(&self, _count: u64) {}
    fn rebase(&self) {}
    fn conflict(&self) {}
    fn merge(&self, _parts: u64) {}
}

/// A thread-safe counter-based implementation of [`StorageMetrics`].
#[derive(Default)]
pub struct CounterMetrics {
    /// Number of nodes created.
    pub nodes_created: AtomicU64,

    /// Number of nodes deleted.
    pub nodes_deleted: AtomicU64,

    /// Number of edges created.
    pub edges_created: AtomicU64,

    /// Number of edges deleted.
    pub edges_deleted: AtomicU64,

    /// Number of dataparts built.
    pub dataparts_built: AtomicU64,

    /// Number of commits appended to main.
    pub commits_submitted: AtomicU64,

    /// Number of rebases performed.
    pub rebases: AtomicU64,

    /// Number of submits rejected by a conflict.
    pub conflicts: AtomicU64,

    /// Number of merges performed.
    pub merges: AtomicU64,

    /// Number of dataparts consumed by merges.
    pub merged_parts: AtomicU64,
}

impl CounterMetrics {
    /// Reads one counter.
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

impl StorageMetrics for CounterMetrics {
    fn nodes_created(&self, count: u64) {
        self.nodes_created.fetch_add(count, Ordering::Relaxed);
    }

    fn nodes_deleted(&self, count: u64) {
        self.nodes_deleted.fetch_add(count, Ordering::Relaxed);
    }

    fn edges_created(&self, count: u64) {
        self.edges_created.fetch_add(count, Ordering::Relaxed);
    }

    fn edges_deleted(&self, count: u64) {
        self.edges_deleted.fetch_add(count, Ordering::Relaxed);
    }

    fn datapart_built(&self) {
        self.dataparts_built.fetch_add(1, Ordering::Relaxed);
    }

    fn commits_submitted(&self, count: u64) {
        self.commits_submitted.fetch_add(count, Ordering::Relaxed);
    }

    fn rebase(&self) {
        self.rebases.fetch_add(1, Ordering::Relaxed);
    }

    fn conflict(&self) {
        self.conflicts.fetch_add(1, Ordering::Relaxed);
    }

    fn merge(&self, parts: u64) {
        self.merges.fetch_add(1, Ordering::Relaxed);
        self.merged_parts.fetch_add(parts, Ordering::Relaxed);
    }
}

/// Returns the default metrics implementation wrapped in an [`Arc`].
///
/// The default implementation is [`NoopMetrics`], which discards everything.
pub fn default_metrics() -> Arc<dyn StorageMetrics> {
    Arc::new(NoopMetrics)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = CounterMetrics::default();
        metrics.nodes_created(3);
        metrics.nodes_created(2);
        metrics.merge(4);
        metrics.merge(2);
        assert_eq!(CounterMetrics::get(&metrics.nodes_created), 5);
        assert_eq!(CounterMetrics::get(&metrics.merges), 2);
        assert_eq!(CounterMetrics::get(&metrics.merged_parts), 6);
    }
}
