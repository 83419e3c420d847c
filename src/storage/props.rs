//! Typed columnar property containers.
//!
//! Each property owns one column of `(entity id, value)` pairs. Builders
//! append in write order; [`PropertyStore::freeze`] sorts by entity and keeps
//! the last write for every entity.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::types::{PenumbraError, PropId, Result, ValueType};

use super::types::PropValue;

/// Column of values indexed by entity ID.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PropertyColumn<T> {
    ids: Vec<u64>,
    values: Vec<T>,
}

impl<T: Clone> PropertyColumn<T> {
    /// Creates an empty column.
    pub fn new() -> Self {
        Self {
            ids: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Appends a value for `id`.
    pub fn push(&mut self, id: u64, value: T) {
        self.ids.push(id);
        self.values.push(value);
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns `true` when the column holds nothing.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Entity IDs in storage order.
    pub fn ids(&self) -> &[u64] {
        &self.ids
    }

    /// Values in storage order.
    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// Looks a value up in a frozen (sorted) column.
    pub fn get(&self, id: u64) -> Option<&T> {
        let pos = self.ids.binary_search(&id).ok()?;
        self.values.get(pos)
    }

    /// Appends every value of `other` after the existing ones.
    pub fn extend_from(&mut self, other: &Self) {
        self.ids.extend_from_slice(&other.ids);
        self.values.extend_from_slice(&other.values);
    }

    fn freeze(&self) -> Self {
        let mut order: Vec<usize> = (0..self.ids.len()).collect();
        order.sort_by_key(|&idx| self.ids[idx]);
        let mut ids = Vec::with_capacity(order.len());
        let mut values: Vec<T> = Vec::with_capacity(order.len());
        for idx in order {
            let id = self.ids[idx];
            let value = self.values[idx].clone();
            match (ids.last(), values.last_mut()) {
                (Some(&last), Some(slot)) if last == id => *slot = value,
                _ => {
                    ids.push(id);
                    values.push(value);
                }
            }
        }
        Self { ids, values }
    }

    fn remap(&self, map: &impl Fn(u64) -> u64) -> Self {
        Self {
            ids: self.ids.iter().map(|&id| map(id)).collect(),
            values: self.values.clone(),
        }
    }
}

/// Value types that can be stored in a property column.
pub trait ColumnValue: Clone + Send + Sync + 'static {
    /// Value type of the column.
    const VALUE_TYPE: ValueType;

    /// Borrows the matching column out of a container.
    fn column(container: &PropertyContainer) -> Option<&PropertyColumn<Self>>;

    /// Mutably borrows the matching column out of a container.
    fn column_mut(container: &mut PropertyContainer) -> Option<&mut PropertyColumn<Self>>;

    /// Creates an empty container for this value type.
    fn empty_container() -> PropertyContainer;

    /// Converts a stored value into a dynamic value.
    fn into_value(self) -> PropValue;
}

macro_rules! column_value {
    ($ty:ty, $variant:ident) => {
        impl ColumnValue for $ty {
            const VALUE_TYPE: ValueType = ValueType::$variant;

            fn column(container: &PropertyContainer) -> Option<&PropertyColumn<Self>> {
                match container {
                    PropertyContainer::$variant(col) => Some(col),
                    _ => None,
                }
            }

            fn column_mut(container: &mut PropertyContainer) -> Option<&mut PropertyColumn<Self>> {
                match container {
                    PropertyContainer::$variant(col) => Some(col),
                    _ => None,
                }
            }

            fn empty_container() -> PropertyContainer {
                PropertyContainer::$variant(PropertyColumn::new())
            }

            fn into_value(self) -> PropValue {
                PropValue::$variant(self)
            }
        }
    };
}

column_value!(i64, Int64);
column_value!(f64, Double);
column_value!(bool, Bool);
column_value!(Arc<str>, String);

/// Column for one property, tagged by value type.
#[derive(Clone, Debug, PartialEq)]
pub enum PropertyContainer {
    /// Integer column.
    Int64(PropertyColumn<i64>),
    /// Float column.
    Double(PropertyColumn<f64>),
    /// Boolean column.
    Bool(PropertyColumn<bool>),
    /// String column.
    String(PropertyColumn<Arc<str>>),
}

impl PropertyContainer {
    /// Value type stored in the container.
    pub fn value_type(&self) -> ValueType {
        match self {
            PropertyContainer::Int64(_) => ValueType::Int64,
            PropertyContainer::Double(_) => ValueType::Double,
            PropertyContainer::Bool(_) => ValueType::Bool,
            PropertyContainer::String(_) => ValueType::String,
        }
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.ids().len()
    }

    /// Returns `true` when the container is empty.
    pub fn is_empty(&self) -> bool {
        self.ids().is_empty()
    }

    /// Entity IDs in storage order.
    pub fn ids(&self) -> &[u64] {
        match self {
            PropertyContainer::Int64(col) => col.ids(),
            PropertyContainer::Double(col) => col.ids(),
            PropertyContainer::Bool(col) => col.ids(),
            PropertyContainer::String(col) => col.ids(),
        }
    }

    /// Looks a value up in a frozen container.
    pub fn get(&self, id: u64) -> Option<PropValue> {
        match self {
            PropertyContainer::Int64(col) => col.get(id).map(|v| PropValue::Int64(*v)),
            PropertyContainer::Double(col) => col.get(id).map(|v| PropValue::Double(*v)),
            PropertyContainer::Bool(col) => col.get(id).map(|v| PropValue::Bool(*v)),
            PropertyContainer::String(col) => col.get(id).map(|v| PropValue::String(Arc::clone(v))),
        }
    }

    /// Iterates `(id, value)` pairs in storage order.
    pub fn entries(&self) -> Box<dyn Iterator<Item = (u64, PropValue)> + '_> {
        match self {
            PropertyContainer::Int64(col) => Box::new(
                col.ids()
                    .iter()
                    .zip(col.values())
                    .map(|(id, v)| (*id, PropValue::Int64(*v))),
            ),
            PropertyContainer::Double(col) => Box::new(
                col.ids()
                    .iter()
                    .zip(col.values())
                    .map(|(id, v)| (*id, PropValue::Double(*v))),
            ),
            PropertyContainer::Bool(col) => Box::new(
                col.ids()
                    .iter()
                    .zip(col.values())
                    .map(|(id, v)| (*id, PropValue::Bool(*v))),
            ),
            PropertyContainer::String(col) => Box::new(
                col.ids()
                    .iter()
                    .zip(col.values())
                    .map(|(id, v)| (*id, PropValue::String(Arc::clone(v)))),
            ),
        }
    }

    fn push_value(&mut self, prop: PropId, id: u64, value: PropValue) -> Result<()> {
        match (self, value) {
            (PropertyContainer::Int64(col), PropValue::Int64(v)) => col.push(id, v),
            (PropertyContainer::Double(col), PropValue::Double(v)) => col.push(id, v),
            (PropertyContainer::Bool(col), PropValue::Bool(v)) => col.push(id, v),
            (PropertyContainer::String(col), PropValue::String(v)) => col.push(id, v),
            (container, value) => {
                return Err(PenumbraError::PropertyTypeMismatch {
                    prop,
                    expected: container.value_type(),
                    found: value.value_type(),
                })
            }
        }
        Ok(())
    }

    fn extend_from(&mut self, prop: PropId, other: &PropertyContainer) -> Result<()> {
        match (self, other) {
            (PropertyContainer::Int64(dst), PropertyContainer::Int64(src)) => dst.extend_from(src),
            (PropertyContainer::Double(dst), PropertyContainer::Double(src)) => {
                dst.extend_from(src)
            }
            (PropertyContainer::Bool(dst), PropertyContainer::Bool(src)) => dst.extend_from(src),
            (PropertyContainer::String(dst), PropertyContainer::String(src)) => {
                dst.extend_from(src)
            }
            (dst, src) => {
                return Err(PenumbraError::PropertyTypeMismatch {
                    prop,
                    expected: dst.value_type(),
                    found: src.value_type(),
                })
            }
        }
        Ok(())
    }

    fn freeze(&self) -> Self {
        match self {
            PropertyContainer::Int64(col) => PropertyContainer::Int64(col.freeze()),
            PropertyContainer::Double(col) => PropertyContainer::Double(col.freeze()),
            PropertyContainer::Bool(col) => PropertyContainer::Bool(col.freeze()),
            PropertyContainer::String(col) => PropertyContainer::String(col.freeze()),
        }
    }

    fn remap(&self, map: &impl Fn(u64) -> u64) -> Self {
        match self {
            PropertyContainer::Int64(col) => PropertyContainer::Int64(col.remap(map)),
            PropertyContainer::Double(col) => PropertyContainer::Double(col.remap(map)),
            PropertyContainer::Bool(col) => PropertyContainer::Bool(col.remap(map)),
            PropertyContainer::String(col) => PropertyContainer::String(col.remap(map)),
        }
    }
}

/// All property columns of one entity kind inside a datapart.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PropertyStore {
    containers: BTreeMap<PropId, PropertyContainer>,
}

impl PropertyStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a typed value, registering the column on first use.
    pub fn push<T: ColumnValue>(&mut self, prop: PropId, id: u64, value: T) -> Result<()> {
        let container = self
            .containers
            .entry(prop)
            .or_insert_with(T::empty_container);
        let expected = container.value_type();
        let column = T::column_mut(container).ok_or(PenumbraError::PropertyTypeMismatch {
            prop,
            expected,
            found: T::VALUE_TYPE,
        })?;
        column.push(id, value);
        Ok(())
    }

    /// Appends a dynamically typed value.
    pub fn push_value(&mut self, prop: PropId, id: u64, value: PropValue) -> Result<()> {
        match self.containers.get_mut(&prop) {
            Some(container) => container.push_value(prop, id, value),
            None => {
                let mut container = empty_for(value.value_type());
                container.push_value(prop, id, value)?;
                self.containers.insert(prop, container);
                Ok(())
            }
        }
    }

    /// Looks a value up in a frozen store.
    pub fn get(&self, prop: PropId, id: u64) -> Option<PropValue> {
        self.containers.get(&prop)?.get(id)
    }

    /// Typed access to one frozen column.
    pub fn column<T: ColumnValue>(&self, prop: PropId) -> Option<&PropertyColumn<T>> {
        T::column(self.containers.get(&prop)?)
    }

    /// Every property value stored for `id`, ordered by property.
    pub fn entity_props(&self, id: u64) -> Vec<(PropId, PropValue)> {
        self.containers
            .iter()
            .filter_map(|(prop, container)| container.get(id).map(|value| (*prop, value)))
            .collect()
    }

    /// Iterates containers in property order.
    pub fn containers(&self) -> impl Iterator<Item = (PropId, &PropertyContainer)> {
        self.containers.iter().map(|(prop, c)| (*prop, c))
    }

    /// Number of registered columns.
    pub fn column_count(&self) -> usize {
        self.containers.len()
    }

    /// Total number of stored values.
    pub fn value_count(&self) -> usize {
        self.containers.values().map(PropertyContainer::len).sum()
    }

    /// Returns `true` when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.containers.values().all(PropertyContainer::is_empty)
    }

    /// Appends every column of `other` after the existing values.
    pub fn extend_from(&mut self, other: &PropertyStore) -> Result<()> {
        for (prop, container) in &other.containers {
            match self.containers.get_mut(prop) {
                Some(dst) => dst.extend_from(*prop, container)?,
                None => {
                    self.containers.insert(*prop, container.clone());
                }
            }
        }
        Ok(())
    }

    /// Sorts every column by entity, keeping the last write per entity.
    pub fn freeze(&self) -> PropertyStore {
        PropertyStore {
            containers: self
                .containers
                .iter()
                .map(|(prop, container)| (*prop, container.freeze()))
                .collect(),
        }
    }

    /// Rewrites entity IDs through a monotone map.
    pub fn remap(&self, map: impl Fn(u64) -> u64) -> PropertyStore {
        PropertyStore {
            containers: self
                .containers
                .iter()
                .map(|(prop, container)| (*prop, container.remap(&map)))
                .collect(),
        }
    }
}

fn empty_for(value_type: ValueType) -> PropertyContainer {
    match value_type {
        ValueType::Int64 => i64::empty_container(),
        ValueType::Double => f64::empty_container(),
        ValueType::Bool => bool::empty_container(),
        ValueType::String => <Arc<str>>::empty_container(),
    }
}
