use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::persistence::CommitPersistence;
use crate::types::{PenumbraError, Result};

use super::metrics::StorageMetrics;

/// Default live-datapart ceiling per graph.
pub const DEFAULT_MAX_LIVE_DATAPARTS: usize = 1024;
/// Default live-commit ceiling per graph.
pub const DEFAULT_MAX_LIVE_COMMITS: usize = 65_536;

/// Configuration options supplied when creating a graph.
#[derive(Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GraphOptions {
    /// Maximum number of dataparts alive at once across main, changes and
    /// reader snapshots.
    pub max_live_dataparts: usize,
    /// Maximum number of commit data objects alive at once.
    pub max_live_commits: usize,
    /// Optional metrics collection implementation
    #[serde(skip)]
    pub metrics: Option<Arc<dyn StorageMetrics>>,
    /// Optional collaborator persisting every commit appended to main.
    #[serde(skip)]
    pub persistence: Option<Arc<dyn CommitPersistence>>,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphOptions {
    /// Creates a new GraphOptions with default settings.
    pub fn new() -> Self {
        Self {
            max_live_dataparts: DEFAULT_MAX_LIVE_DATAPARTS,
            max_live_commits: DEFAULT_MAX_LIVE_COMMITS,
            metrics: None,
            persistence: None,
        }
    }

    /// Sets the live-datapart ceiling.
    pub fn max_live_dataparts(mut self, limit: usize) -> Self {
        self.max_live_dataparts = limit;
        self
    }

    /// Sets the live-commit ceiling.
    pub fn max_live_commits(mut self, limit: usize) -> Self {
        self.max_live_commits = limit;
        self
    }

    /// Sets the metrics collection implementation.
    pub fn metrics(mut self, metrics: Arc<dyn StorageMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Sets the persistence collaborator.
    pub fn persistence(mut self, persistence: Arc<dyn CommitPersistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.max_live_dataparts == 0 {
            return Err(PenumbraError::Config(
                "max_live_dataparts must be positive".into(),
            ));
        }
        if self.max_live_commits == 0 {
            return Err(PenumbraError::Config("max_live_commits must be positive".into()));
        }
        Ok(())
    }
}

impl fmt::Debug for GraphOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphOptions")
            .field("max_live_dataparts", &self.max_live_dataparts)
            .field("max_live_commits", &self.max_live_commits)
            .field("metrics", &self.metrics.is_some())
            .field("persistence", &self.persistence.is_some())
            .finish()
    }
}

/// Configuration for a [`crate::db::Database`].
///
/// ```toml
/// job_threads = 4
///
/// [graph]
/// max_live_dataparts = 2048
/// ```
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseOptions {
    /// Worker threads used for datapart construction; 0 runs inline.
    pub job_threads: usize,
    /// Options applied to every graph created without explicit options.
    pub graph: GraphOptions,
}

impl DatabaseOptions {
    /// Creates options with inline jobs and default graph settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of job worker threads.
    pub fn job_threads(mut self, threads: usize) -> Self {
        self.job_threads = threads;
        self
    }

    /// Sets the default graph options.
    pub fn graph(mut self, graph: GraphOptions) -> Self {
        self.graph = graph;
        self
    }

    /// Parses options from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let options: DatabaseOptions =
            toml::from_str(text).map_err(|err| PenumbraError::Config(err.to_string()))?;
        options.graph.validate()?;
        Ok(options)
    }

    /// Loads options from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}
