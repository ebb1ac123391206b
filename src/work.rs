use std::time::Duration;

use async_trait::async_trait;

use crate::model::TaskId;

/// The unit of work a task performs, independent of its children.
///
/// A task with children only evaluates its work after every child has
/// settled, but the outcome returned here is never influenced by how the
/// children fared.
#[async_trait]
pub trait Work: Send + Sync + 'static {
    /// Carry out this task's own work. `true` means the task succeeded.
    async fn run(&self, id: TaskId) -> bool;
}

/// Work that resolves immediately to a fixed outcome.
pub struct FixedOutcome(pub bool);

#[async_trait]
impl Work for FixedOutcome {
    async fn run(&self, _id: TaskId) -> bool {
        self.0
    }
}

/// Work that sleeps for a random bounded delay and resolves to a random
/// outcome, simulating an unreliable asynchronous operation.
pub struct FlakyOutcome {
    max_delay: Duration,
}

impl FlakyOutcome {
    pub fn new(max_delay: Duration) -> Self {
        Self { max_delay }
    }
}

#[async_trait]
impl Work for FlakyOutcome {
    async fn run(&self, _id: TaskId) -> bool {
        let delay = self.max_delay.mul_f64(fastrand::f64());
        tokio::time::sleep(delay).await;
        fastrand::bool()
    }
}
