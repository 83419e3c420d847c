//! Columnar storage: dataparts, tombstones, schema and compaction.

pub mod catalog;
pub mod datapart;
pub mod merge;
pub mod metrics;
pub mod options;
pub mod props;
pub mod tombstones;
pub mod types;

pub use catalog::{PropertyType, SchemaMetricsSnapshot, SchemaRegistry};
pub use datapart::{DataPart, DataPartBuilder, IdShift, PatchCounts, StringIndex};
pub use merge::DataPartMerger;
pub use metrics::{default_metrics, CounterMetrics, NoopMetrics, StorageMetrics};
pub use options::{DatabaseOptions, GraphOptions};
pub use props::{ColumnValue, PropertyColumn, PropertyContainer, PropertyStore};
pub use tombstones::Tombstones;
pub use types::{EdgeData, EdgeRecord, LabelSet, NodeData, PropValue};
