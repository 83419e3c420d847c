//! Low-level building blocks shared by storage and versioning.

/// Bounded arena of shared objects handing out strong and weak handles.
pub mod arena;

/// Fork-join job execution for CPU-bound builds.
pub mod jobs;
