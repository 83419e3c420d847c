//! Fork-join adapter used for CPU-bound datapart construction.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::types::{PenumbraError, Result};

/// Executes batches of independent jobs and waits for all of them.
///
/// When no worker pool is configured every job runs on the calling thread,
/// which keeps single-threaded tests deterministic.
pub struct JobSystem {
    pool: Option<ThreadPool>,
}

impl JobSystem {
    /// Creates a job system backed by a dedicated pool of `threads` workers.
    pub fn new(threads: usize) -> Result<Self> {
        if threads == 0 {
            return Ok(Self::inline());
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|idx| format!("penumbra-job-{idx}"))
            .build()
            .map_err(|err| PenumbraError::Config(format!("job pool: {err}")))?;
        Ok(Self { pool: Some(pool) })
    }

    /// Creates a job system that runs everything on the caller's thread.
    pub fn inline() -> Self {
        Self { pool: None }
    }

    /// Number of worker threads available (one when running inline).
    pub fn threads(&self) -> usize {
        self.pool
            .as_ref()
            .map(ThreadPool::current_num_threads)
            .unwrap_or(1)
    }

    /// Submits every job and waits for completion, preserving input order.
    pub fn run_all<T, F>(&self, jobs: Vec<F>) -> Vec<T>
    where
        T: Send,
        F: FnOnce() -> T + Send,
    {
        match self.pool.as_ref() {
            Some(pool) if jobs.len() > 1 => {
                pool.install(|| jobs.into_par_iter().map(|job| job()).collect())
            }
            _ => jobs.into_iter().map(|job| job()).collect(),
        }
    }

    /// Runs two jobs, potentially in parallel, and returns both results.
    pub fn join<A, B, RA, RB>(&self, a: A, b: B) -> (RA, RB)
    where
        A: FnOnce() -> RA + Send,
        B: FnOnce() -> RB + Send,
        RA: Send,
        RB: Send,
    {
        match self.pool.as_ref() {
            Some(pool) => pool.install(|| rayon::join(a, b)),
            None => (a(), b()),
        }
    }
}

impl Default for JobSystem {
    fn default() -> Self {
        Self::inline()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_all_preserves_order() {
        let jobs = JobSystem::new(4).unwrap();
        let work: Vec<_> = (0..32u64).map(|i| move || i * i).collect();
        let out = jobs.run_all(work);
        assert_eq!(out, (0..32u64).map(|i| i * i).collect::<Vec<_>>());
        assert_eq!(jobs.threads(), 4);
    }

    #[test]
    fn inline_join_runs_both() {
        let jobs = JobSystem::inline();
        let (a, b) = jobs.join(|| 1, || "two");
        assert_eq!((a, b), (1, "two"));
        assert_eq!(jobs.threads(), 1);
    }
}
