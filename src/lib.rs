//! Parallel table purge engine.
//!
//! Empties a key-value table by scanning disjoint segments concurrently, deleting keys in
//! store-sized batches, resubmitting unprocessed keys with exponential backoff, and
//! reporting live progress through shared atomic counters.
//!
//! ```ignore
//! let store = Arc::new(DynamoDbStore::connect(&config.store).await);
//! let mut orchestrator = PurgeOrchestrator::new(store, config, CancellationToken::new());
//! let summary = orchestrator.run().await?;
//! println!("{summary}");
//! ```

mod config;
mod core;
mod errors;
pub mod metrics;
mod store;
pub(crate) mod utils;

pub use self::config::*;
pub use self::core::*;
pub use errors::*;
pub use store::*;

#[cfg(test)]
mod test_utils;
