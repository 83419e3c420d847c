use std::fmt;
use std::ops::{Deref, DerefMut};

use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::RawMutex;

use crate::types::ChangeId;

use super::change::Change;

/// Exclusive handle to one change.
///
/// At most one accessor per change exists at a time; dropping it releases
/// the change for the next writer.
pub struct ChangeAccessor {
    guard: ArcMutexGuard<RawMutex, Change>,
}

impl ChangeAccessor {
    pub(crate) fn new(guard: ArcMutexGuard<RawMutex, Change>) -> Self {
        Self { guard }
    }

    /// Identifier of the held change.
    pub fn id(&self) -> ChangeId {
        self.guard.id()
    }
}

impl Deref for ChangeAccessor {
    type Target = Change;

    fn deref(&self) -> &Change {
        &self.guard
    }
}

impl DerefMut for ChangeAccessor {
    fn deref_mut(&mut self) -> &mut Change {
        &mut self.guard
    }
}

impl fmt::Debug for ChangeAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeAccessor")
            .field("id", &self.guard.id())
            .field("state", &self.guard.state())
            .field("builders", &self.guard.stack_len())
            .finish()
    }
}
