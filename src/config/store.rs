use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Connection settings for the DynamoDB adapter.
///
/// Credentials and profiles are resolved by the AWS default provider chain; only the
/// region and an optional endpoint override (local emulators) are configured here.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct StoreConfig {
    #[serde(default)]
    pub region: Option<String>,

    #[serde(default)]
    pub endpoint_url: Option<String>,
}

impl StoreConfig {
    pub fn validate(&self) -> Result<()> {
        if let Some(endpoint) = &self.endpoint_url {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(Error::InvalidConfig(format!(
                    "store.endpoint_url {endpoint} must start with http:// or https://"
                )));
            }
        }

        if matches!(&self.region, Some(region) if region.trim().is_empty()) {
            return Err(Error::InvalidConfig("store.region cannot be blank".into()));
        }

        Ok(())
    }
}
