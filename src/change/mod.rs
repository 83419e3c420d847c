//! Per-user editing sessions layered on top of a graph's main line.

mod accessor;
#[allow(clippy::module_inception)]
mod change;
mod manager;

pub use accessor::ChangeAccessor;
pub use change::{Change, ChangeState};
pub use manager::ChangeManager;
