//! Configuration management for the purge engine.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support (`CONFIG_PATH`)
//! - Environment variable overrides (`PURGE__` prefix)
//! - Section-wise validation
mod monitoring;
mod retry;
mod store;
mod table;
pub use monitoring::*;
pub use retry::*;
pub use store::*;
pub use table::*;
use std::env;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// Main configuration container for a purge run
///
/// Combines all section configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables (highest priority)
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct PurgeConfig {
    /// Target table and partitioning parameters
    #[serde(default)]
    pub table: TableConfig,
    /// Retry policies for store operations
    #[serde(default)]
    pub retry: RetryPolicies,
    /// Progress reporting and logging
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    /// Store adapter connection settings
    #[serde(default)]
    pub store: StoreConfig,
}

impl PurgeConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Sources are merged in the following order (later sources override earlier):
    /// 1. Type defaults (lowest priority)
    /// 2. Configuration file from `CONFIG_PATH` environment variable (if set)
    /// 3. Environment variables with `PURGE__` prefix (highest priority)
    ///
    /// # Note
    /// Validation is deferred so that further overrides can be applied with
    /// `with_override_config()`. Callers MUST call `validate()` before use.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("PURGE__TABLE__NAME", "orders");
    /// let cfg = PurgeConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(env_source());

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Merging order (later sources override earlier):
    /// 1. Current configuration values
    /// 2. New configuration file
    /// 3. Latest environment variables (highest priority)
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(env_source())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates every section and returns the validated instance.
    ///
    /// # Errors
    /// Returns `Error::InvalidConfig` describing the first violated rule.
    pub fn validate(self) -> Result<Self> {
        self.table.validate()?;
        self.retry.validate()?;
        self.monitoring.validate()?;
        self.store.validate()?;
        Ok(self)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix("PURGE")
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
}
