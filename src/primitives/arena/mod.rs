//! Generation-checked shared-ownership arena.
//!
//! Long-lived immutable objects (dataparts, commit data) are referenced from
//! many places at once: main's head, every open change's base, and every
//! outstanding reader snapshot. [`ArcManager`] keeps them in a slot table
//! with an explicit strong count per slot. A [`StrongHandle`] keeps its slot
//! occupied; a [`WeakHandle`] is only an `(index, generation)` pair that is
//! validated on upgrade and never extends the object's lifetime.

use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::warn;

use crate::types::{PenumbraError, Result};

struct Slot<T> {
    generation: u32,
    strong: usize,
    value: Option<Arc<T>>,
}

struct SlotTable<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    live: usize,
}

struct ArenaInner<T> {
    resource: &'static str,
    capacity: usize,
    table: Mutex<SlotTable<T>>,
}

impl<T> ArenaInner<T> {
    fn retain(&self, index: u32) {
        let mut table = self.table.lock();
        let slot = &mut table.slots[index as usize];
        slot.strong += 1;
    }

    /// Returns the value when the last strong reference released the slot.
    fn release(&self, index: u32) -> Option<Arc<T>> {
        let mut table = self.table.lock();
        let slot = &mut table.slots[index as usize];
        slot.strong -= 1;
        if slot.strong > 0 {
            return None;
        }
        slot.generation = slot.generation.wrapping_add(1);
        let value = slot.value.take();
        table.free.push(index);
        table.live -= 1;
        value
    }
}

/// Reference-counted slot storage with a configurable live-object limit.
pub struct ArcManager<T> {
    inner: Arc<ArenaInner<T>>,
}

impl<T> Clone for ArcManager<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> ArcManager<T> {
    /// Creates an arena allowing at most `capacity` live objects.
    pub fn new(resource: &'static str, capacity: usize) -> Self {
        Self {
            inner: Arc::new(ArenaInner {
                resource,
                capacity,
                table: Mutex::new(SlotTable {
                    slots: Vec::new(),
                    free: Vec::new(),
                    live: 0,
                }),
            }),
        }
    }

    /// Stores `value` and returns the first strong handle to it.
    pub fn create(&self, value: T) -> Result<StrongHandle<T>> {
        let value = Arc::new(value);
        let mut table = self.inner.table.lock();
        if table.live >= self.inner.capacity {
            warn!(
                resource = self.inner.resource,
                limit = self.inner.capacity,
                "arena.create.capacity_exceeded"
            );
            return Err(PenumbraError::CapacityExceeded {
                resource: self.inner.resource,
                limit: self.inner.capacity,
            });
        }
        let index = match table.free.pop() {
            Some(index) => index,
            None => {
                let index = u32::try_from(table.slots.len())
                    .map_err(|_| PenumbraError::Invalid("arena slot index overflow"))?;
                table.slots.push(Slot {
                    generation: 0,
                    strong: 0,
                    value: None,
                });
                index
            }
        };
        let slot = &mut table.slots[index as usize];
        slot.strong = 1;
        slot.value = Some(Arc::clone(&value));
        let generation = slot.generation;
        table.live += 1;
        Ok(StrongHandle {
            arena: Arc::clone(&self.inner),
            index,
            generation,
            value,
        })
    }

    /// Number of objects currently held alive by at least one strong handle.
    pub fn live(&self) -> usize {
        self.inner.table.lock().live
    }

    /// Maximum number of live objects.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }
}

/// Owning handle into an [`ArcManager`].
pub struct StrongHandle<T> {
    arena: Arc<ArenaInner<T>>,
    index: u32,
    generation: u32,
    value: Arc<T>,
}

impl<T> StrongHandle<T> {
    /// Creates a non-owning observer of the same object.
    pub fn downgrade(&self) -> WeakHandle<T> {
        WeakHandle {
            arena: Arc::downgrade(&self.arena),
            index: self.index,
            generation: self.generation,
        }
    }

    /// Returns `true` when both handles refer to the same stored object.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.value, &b.value)
    }

    /// Number of strong handles currently sharing the object.
    pub fn strong_count(&self) -> usize {
        self.arena.table.lock().slots[self.index as usize].strong
    }
}

impl<T> Clone for StrongHandle<T> {
    fn clone(&self) -> Self {
        self.arena.retain(self.index);
        Self {
            arena: Arc::clone(&self.arena),
            index: self.index,
            generation: self.generation,
            value: Arc::clone(&self.value),
        }
    }
}

impl<T> Drop for StrongHandle<T> {
    fn drop(&mut self) {
        // The slot's copy is dropped outside the table lock so that `T::drop`
        // may itself release handles into the same arena.
        let released = self.arena.release(self.index);
        drop(released);
    }
}

impl<T> Deref for StrongHandle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: fmt::Debug> fmt::Debug for StrongHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrongHandle")
            .field("index", &self.index)
            .field("generation", &self.generation)
            .field("value", &self.value)
            .finish()
    }
}

/// Non-owning observer validated by slot generation.
pub struct WeakHandle<T> {
    arena: Weak<ArenaInner<T>>,
    index: u32,
    generation: u32,
}

impl<T> WeakHandle<T> {
    /// Returns a strong handle when the object is still alive.
    pub fn upgrade(&self) -> Option<StrongHandle<T>> {
        let arena = self.arena.upgrade()?;
        let value = {
            let mut table = arena.table.lock();
            let slot = table.slots.get_mut(self.index as usize)?;
            if slot.generation != self.generation || slot.strong == 0 {
                return None;
            }
            let value = Arc::clone(slot.value.as_ref()?);
            slot.strong += 1;
            value
        };
        Some(StrongHandle {
            arena,
            index: self.index,
            generation: self.generation,
            value,
        })
    }

    /// Returns `true` when the observed object has not been released.
    pub fn is_alive(&self) -> bool {
        let Some(arena) = self.arena.upgrade() else {
            return false;
        };
        let table = arena.table.lock();
        table
            .slots
            .get(self.index as usize)
            .is_some_and(|slot| slot.generation == self.generation && slot.strong > 0)
    }
}

impl<T> Clone for WeakHandle<T> {
    fn clone(&self) -> Self {
        Self {
            arena: Weak::clone(&self.arena),
            index: self.index,
            generation: self.generation,
        }
    }
}

impl<T> fmt::Debug for WeakHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakHandle")
            .field("index", &self.index)
            .field("generation", &self.generation)
            .finish()
    }
}
