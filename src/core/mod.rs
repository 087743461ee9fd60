//! Parallel purge engine.
//!
//! Leaf-first:
//! - [`resolve_key_schema`]: primary key attributes, resolved once per run
//! - [`SegmentedScanner`]: pages through one disjoint segment of the table
//! - [`BatchDeleter`]: store-sized delete batches with unprocessed-key resubmission
//! - [`PurgeStats`] / [`ProgressReporter`]: shared counters and periodic progress lines
//! - [`SegmentWorker`]: Scanner → Deleter loop of one segment
//! - [`PurgeOrchestrator`]: state machine wiring N workers, dry run and cancellation

mod deleter;
mod orchestrator;
mod progress;
mod report;
mod scanner;
mod schema;
mod worker;

pub use deleter::*;
pub use orchestrator::*;
pub use progress::*;
pub use report::*;
pub use scanner::*;
pub use schema::*;
pub use worker::*;

#[cfg(test)]
mod progress_test;
#[cfg(test)]
mod report_test;
#[cfg(test)]
mod schema_test;
