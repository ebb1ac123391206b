use tracing::info;

use crate::error::TaskError;
use crate::model::TaskId;
use crate::scheduler::{RunReport, Scheduler};

/// How a retry attempt resolves the work of a previously failed task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    /// Re-run the task's real unit of work; it may fail again.
    #[default]
    Reattempt,
    /// Resolve the next attempt to success deterministically, modeling
    /// "the underlying problem was fixed". Intended for tests and demos.
    ForceSuccess,
}

/// Re-runs the failed subset of a batch through the scheduler.
///
/// Each invocation is independent: no retry counts, no backoff, no cap.
/// Callers wanting a bounded retry loop layer it on top.
pub struct RetryController {
    policy: RetryPolicy,
}

impl RetryController {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Reset every failed task to `Pending` and run exactly that subset as
    /// a new batch, forwarding the scheduler's report.
    pub async fn retry(
        &self,
        scheduler: &Scheduler,
        failed: &[TaskId],
    ) -> Result<RunReport, TaskError> {
        for &id in failed {
            scheduler.forest().reset_status(id)?;
            if self.policy == RetryPolicy::ForceSuccess {
                scheduler.forest().force_success(id)?;
            }
        }
        info!(tasks = failed.len(), policy = ?self.policy, "retrying failed tasks");
        scheduler.run(failed).await
    }
}
