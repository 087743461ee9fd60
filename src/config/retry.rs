use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Basic retry policy template
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Maximum number of resubmissions after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff base (unit: milliseconds)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Maximum backoff time (unit: milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl BackoffPolicy {
    /// Delay before resubmission number `retry_count` (0-based):
    /// `min(max_delay, base_delay * 2^retry_count)`.
    pub fn delay_for(
        &self,
        retry_count: u32,
    ) -> Duration {
        let factor = 1u64.checked_shl(retry_count).unwrap_or(u64::MAX);
        let delay_ms = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }

    fn validate(
        &self,
        name: &str,
    ) -> Result<()> {
        if self.base_delay_ms == 0 {
            return Err(Error::InvalidConfig(format!("retry.{name}.base_delay_ms must be > 0")));
        }

        if self.max_delay_ms < self.base_delay_ms {
            return Err(Error::InvalidConfig(format!(
                "retry.{name}.max_delay_ms {} must be >= base_delay_ms {}",
                self.max_delay_ms, self.base_delay_ms
            )));
        }

        Ok(())
    }
}

/// Divide strategies by store operation
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RetryPolicies {
    // Batch delete strategy (unprocessed keys and throttling)
    #[serde(default = "default_batch_delete_policy")]
    pub batch_delete: BackoffPolicy,

    // Scan page strategy (throttled idempotent reads)
    #[serde(default = "default_scan_policy")]
    pub scan: BackoffPolicy,
}

impl Default for RetryPolicies {
    fn default() -> Self {
        Self {
            batch_delete: default_batch_delete_policy(),
            scan: default_scan_policy(),
        }
    }
}

impl RetryPolicies {
    pub fn validate(&self) -> Result<()> {
        self.batch_delete.validate("batch_delete")?;
        self.scan.validate("scan")?;
        Ok(())
    }
}

fn default_batch_delete_policy() -> BackoffPolicy {
    BackoffPolicy {
        max_retries: 8,
        base_delay_ms: 50,
        max_delay_ms: 5000,
    }
}
fn default_scan_policy() -> BackoffPolicy {
    BackoffPolicy {
        max_retries: 5,
        base_delay_ms: 100,
        max_delay_ms: 2000,
    }
}
fn default_max_retries() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    50
}
fn default_max_delay_ms() -> u64 {
    1000
}
