//! Process-wide `tracing` subscriber setup.

use tracing_subscriber::{fmt, EnvFilter};

use crate::types::{PenumbraError, Result};

/// Installs a formatted subscriber filtered by `filter` (for example
/// `"penumbra=debug"`). Fails when the filter is malformed or a global
/// subscriber is already installed.
pub fn init_logging(filter: &str) -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_new(filter)
                .map_err(|err| PenumbraError::Config(format!("invalid log filter: {err}")))?,
        )
        .with_target(true)
        .with_thread_ids(true)
        .try_init()
        .map_err(|_| PenumbraError::Config("logging already initialized".into()))
}
