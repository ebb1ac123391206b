//! Hierarchical task execution.
//!
//! Tasks form a forest: each task has at most one parent and any number of
//! children. Executing a batch runs every independent subtree concurrently;
//! a parent evaluates its own unit of work only after all of its children
//! have settled, whatever their outcomes. The [`Scheduler`] publishes live
//! progress over a watch channel and reports the failed subset at settle,
//! which a [`RetryController`] can re-run on its own.
//!
//! ```no_run
//! use std::sync::Arc;
//! use grove::{FixedOutcome, Forest, RetryController, RetryPolicy, Scheduler};
//!
//! # async fn demo() -> Result<(), grove::TaskError> {
//! let forest = Arc::new(Forest::new());
//! for id in 0..4 {
//!     forest.insert(id, Arc::new(FixedOutcome(id != 2)))?;
//! }
//! forest.add_children(1, &[0, 2])?;
//!
//! let scheduler = Scheduler::new(forest);
//! let report = scheduler.run(&[0, 1, 2, 3]).await?;
//! if !report.fully_succeeded() {
//!     let retry = RetryController::new(RetryPolicy::ForceSuccess);
//!     retry.retry(&scheduler, &report.failed).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod model;
pub mod retry;
pub mod scheduler;
pub mod work;

pub use error::TaskError;
pub use model::{Forest, Task, TaskId, TaskStatus};
pub use retry::{RetryController, RetryPolicy};
pub use scheduler::{Progress, RunReport, Scheduler};
pub use work::{FixedOutcome, FlakyOutcome, Work};
