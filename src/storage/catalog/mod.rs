#![forbid(unsafe_code)]

//! Schema registry shared by every commit of a graph.
//!
//! Labels, edge types and property types are interned once and never
//! removed, so a registry can be shared by snapshots of any age.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::types::{LabelId, PenumbraError, PropId, Result, TypeId, ValueType};

/// Property type: an interned property name bound to a value type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PropertyType {
    /// Property identifier.
    pub id: PropId,
    /// Value type stored for the property.
    pub value_type: ValueType,
}

#[derive(Default)]
struct NameTable {
    names: Vec<Arc<str>>,
    ids: FxHashMap<Arc<str>, u32>,
}

impl NameTable {
    fn lookup(&self, name: &str) -> Option<u32> {
        self.ids.get(name).copied()
    }

    fn intern(&mut self, name: &str) -> Result<u32> {
        if let Some(id) = self.lookup(name) {
            return Ok(id);
        }
        let id = u32::try_from(self.names.len())
            .map_err(|_| PenumbraError::Invalid("schema identifier overflow"))?;
        let name: Arc<str> = Arc::from(name);
        self.names.push(Arc::clone(&name));
        self.ids.insert(name, id);
        Ok(id)
    }

    fn name(&self, id: u32) -> Option<Arc<str>> {
        self.names.get(id as usize).cloned()
    }
}

#[derive(Default)]
struct Schema {
    labels: NameTable,
    edge_types: NameTable,
    props: NameTable,
    prop_types: Vec<ValueType>,
}

/// Intern counters for the registry.
#[derive(Default)]
struct SchemaMetrics {
    intern_calls: AtomicU64,
    intern_hits: AtomicU64,
    intern_misses: AtomicU64,
}

/// Point-in-time copy of the registry's intern counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SchemaMetricsSnapshot {
    /// Total `get_or_create_*` calls.
    pub intern_calls: u64,
    /// Calls that found an existing entry.
    pub intern_hits: u64,
    /// Calls that registered a new entry.
    pub intern_misses: u64,
}

impl SchemaMetricsSnapshot {
    /// Fraction of calls served by an existing entry.
    pub fn intern_hit_rate(&self) -> f64 {
        if self.intern_calls == 0 {
            return 0.0;
        }
        self.intern_hits as f64 / self.intern_calls as f64
    }
}

/// Label, edge-type and property-type registry with `get_or_create` semantics.
#[derive(Default)]
pub struct SchemaRegistry {
    inner: RwLock<Schema>,
    metrics: SchemaMetrics,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, hit: bool) {
        self.metrics.intern_calls.fetch_add(1, Ordering::Relaxed);
        let counter = if hit {
            &self.metrics.intern_hits
        } else {
            &self.metrics.intern_misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the label named `name`, registering it when missing.
    pub fn get_or_create_label(&self, name: &str) -> Result<LabelId> {
        if let Some(id) = self.inner.read().labels.lookup(name) {
            self.record(true);
            return Ok(LabelId(id));
        }
        let id = self.inner.write().labels.intern(name)?;
        self.record(false);
        trace!(label = name, id, "schema.label.created");
        Ok(LabelId(id))
    }

    /// Returns the edge type named `name`, registering it when missing.
    pub fn get_or_create_edge_type(&self, name: &str) -> Result<TypeId> {
        if let Some(id) = self.inner.read().edge_types.lookup(name) {
            self.record(true);
            return Ok(TypeId(id));
        }
        let id = self.inner.write().edge_types.intern(name)?;
        self.record(false);
        trace!(edge_type = name, id, "schema.edge_type.created");
        Ok(TypeId(id))
    }

    /// Returns the property named `name`, registering it with `value_type`
    /// when missing. An existing property with another type is rejected.
    pub fn get_or_create_property(
        &self,
        name: &str,
        value_type: ValueType,
    ) -> Result<PropertyType> {
        if let Some(existing) = self.property(name) {
            self.record(true);
            return check_type(existing, value_type);
        }
        let mut schema = self.inner.write();
        if let Some(id) = schema.props.lookup(name) {
            // Registered by a concurrent caller between the two locks.
            let existing = PropertyType {
                id: PropId(id),
                value_type: schema.prop_types[id as usize],
            };
            drop(schema);
            self.record(true);
            return check_type(existing, value_type);
        }
        let id = schema.props.intern(name)?;
        schema.prop_types.push(value_type);
        drop(schema);
        self.record(false);
        trace!(property = name, id, %value_type, "schema.property.created");
        Ok(PropertyType {
            id: PropId(id),
            value_type,
        })
    }

    /// Looks a label up by name.
    pub fn label(&self, name: &str) -> Option<LabelId> {
        self.inner.read().labels.lookup(name).map(LabelId)
    }

    /// Looks an edge type up by name.
    pub fn edge_type(&self, name: &str) -> Option<TypeId> {
        self.inner.read().edge_types.lookup(name).map(TypeId)
    }

    /// Looks a property type up by name.
    pub fn property(&self, name: &str) -> Option<PropertyType> {
        let schema = self.inner.read();
        let id = schema.props.lookup(name)?;
        Some(PropertyType {
            id: PropId(id),
            value_type: schema.prop_types[id as usize],
        })
    }

    /// Looks a property type up by identifier.
    pub fn property_type(&self, id: PropId) -> Option<PropertyType> {
        let schema = self.inner.read();
        let value_type = *schema.prop_types.get(id.0 as usize)?;
        Some(PropertyType { id, value_type })
    }

    /// Name of a label.
    pub fn label_name(&self, id: LabelId) -> Option<Arc<str>> {
        self.inner.read().labels.name(id.0)
    }

    /// Name of an edge type.
    pub fn edge_type_name(&self, id: TypeId) -> Option<Arc<str>> {
        self.inner.read().edge_types.name(id.0)
    }

    /// Name of a property.
    pub fn property_name(&self, id: PropId) -> Option<Arc<str>> {
        self.inner.read().props.name(id.0)
    }

    /// Counts of registered labels, edge types and properties.
    pub fn counts(&self) -> (usize, usize, usize) {
        let schema = self.inner.read();
        (
            schema.labels.names.len(),
            schema.edge_types.names.len(),
            schema.props.names.len(),
        )
    }

    /// Returns the current intern counters.
    pub fn metrics(&self) -> SchemaMetricsSnapshot {
        SchemaMetricsSnapshot {
            intern_calls: self.metrics.intern_calls.load(Ordering::Relaxed),
            intern_hits: self.metrics.intern_hits.load(Ordering::Relaxed),
            intern_misses: self.metrics.intern_misses.load(Ordering::Relaxed),
        }
    }
}

fn check_type(existing: PropertyType, requested: ValueType) -> Result<PropertyType> {
    if existing.value_type == requested {
        Ok(existing)
    } else {
        Err(PenumbraError::PropertyTypeMismatch {
            prop: existing.id,
            expected: existing.value_type,
            found: requested,
        })
    }
}
