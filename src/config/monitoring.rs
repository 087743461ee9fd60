use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MonitoringConfig {
    /// Interval between progress lines
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,

    /// Directory for a `purge.log` file next to stderr output
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}
impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            progress_interval_ms: default_progress_interval_ms(),
            log_dir: None,
        }
    }
}
impl MonitoringConfig {
    /// Validates monitoring configuration
    /// # Errors
    /// Returns `Error::InvalidConfig` when the progress interval is below 100ms
    pub fn validate(&self) -> Result<()> {
        if self.progress_interval_ms < 100 {
            return Err(Error::InvalidConfig(format!(
                "monitoring.progress_interval_ms {} must be at least 100ms",
                self.progress_interval_ms
            )));
        }

        Ok(())
    }
}

fn default_progress_interval_ms() -> u64 {
    2000
}
