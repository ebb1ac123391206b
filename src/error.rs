use thiserror::Error;

use crate::model::TaskId;

/// Usage and execution errors.
///
/// A task whose own work does not succeed is not an error: that outcome is
/// recorded as `TaskStatus::Failed` on the node and surfaced through the
/// run report. `TaskError` covers misuse of the API and worker panics.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task {0} already exists in the forest")]
    DuplicateTask(TaskId),

    #[error("task {0} not found in the forest")]
    TaskNotFound(TaskId),

    #[error("adding task {child} under task {parent} would create a cycle")]
    CycleDetected { parent: TaskId, child: TaskId },

    #[error("task {0} appears more than once in the batch")]
    DuplicateInBatch(TaskId),

    #[error("task {0} is already mid-execution")]
    AlreadyRunning(TaskId),

    #[error("task worker panicked: {0}")]
    Join(#[from] tokio::task::JoinError),
}
