use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Largest key batch a single delete request may carry.
pub const MAX_BATCH_SIZE: usize = 25;

/// Upper bound on concurrent scan segments.
pub const MAX_TOTAL_SEGMENTS: u32 = 10;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TableConfig {
    /// Table to purge
    #[serde(default)]
    pub name: String,

    /// Number of disjoint scan segments, one worker each
    #[serde(default = "default_total_segments")]
    pub total_segments: u32,

    /// Report schema and estimate only, never delete
    #[serde(default)]
    pub dry_run: bool,

    /// Item limit per scan page
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Keys per delete request (decoupled from `page_size`)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            total_segments: default_total_segments(),
            dry_run: false,
            page_size: default_page_size(),
            batch_size: default_batch_size(),
        }
    }
}

impl TableConfig {
    /// # Errors
    /// Returns `Error::InvalidConfig` when:
    /// - table name is blank
    /// - segment count is outside 1..=10
    /// - page size is 0
    /// - batch size is outside 1..=25
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidConfig("table.name cannot be empty".into()));
        }

        if self.total_segments == 0 || self.total_segments > MAX_TOTAL_SEGMENTS {
            return Err(Error::InvalidConfig(format!(
                "table.total_segments {} must be between 1 and {}",
                self.total_segments, MAX_TOTAL_SEGMENTS
            )));
        }

        if self.page_size == 0 {
            return Err(Error::InvalidConfig("table.page_size must be > 0".into()));
        }

        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(Error::InvalidConfig(format!(
                "table.batch_size {} must be between 1 and {}",
                self.batch_size, MAX_BATCH_SIZE
            )));
        }

        Ok(())
    }
}

fn default_total_segments() -> u32 {
    4
}
fn default_page_size() -> u32 {
    1000
}
fn default_batch_size() -> usize {
    MAX_BATCH_SIZE
}
