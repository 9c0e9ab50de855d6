//! Runtime configuration and statistics.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Tunables for a [`Runtime`](crate::reactive::Runtime).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Maximum number of microtasks a single `settle()` call may execute
    /// before giving up with `SettleLimitExceeded`.
    pub settle_limit: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            settle_limit: 100_000,
        }
    }
}

impl RuntimeConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(source: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = serde_json::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.settle_limit == 0 {
            return Err(ConfigError::ZeroSettleLimit);
        }
        Ok(())
    }
}

/// A point-in-time summary of a runtime's graph and scheduler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RuntimeStats {
    pub live_cells: usize,
    pub live_computations: usize,
    pub dirty_queue_len: usize,
    pub pending_microtasks: usize,
    /// Completed computation runs since the runtime was created.
    pub total_runs: u64,
}
