use std::collections::HashSet;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::TaskError;
use crate::model::{Forest, TaskId, TaskStatus};

/// Live progress over one batch: how many of its tasks have left `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub settled: usize,
    pub total: usize,
}

impl Progress {
    /// The value published outside of any run, and again strictly after a
    /// run settles.
    pub const IDLE: Progress = Progress {
        settled: 0,
        total: 0,
    };
}

/// Final result of one batch run. An empty `failed` list means every task
/// in the batch succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub failed: Vec<TaskId>,
}

impl RunReport {
    pub fn fully_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Executes batches of tasks out of a shared [`Forest`].
///
/// A batch is a flat list of task ids; tasks whose parent is also in the
/// batch are not launched directly but run transitively under that parent.
/// Each root subtree executes concurrently, and the scheduler publishes a
/// progress update on its watch channel every time any task in the batch
/// reaches a terminal status.
pub struct Scheduler {
    forest: Arc<Forest>,
    progress_tx: watch::Sender<Progress>,
}

impl Scheduler {
    pub fn new(forest: Arc<Forest>) -> Self {
        let (progress_tx, _) = watch::channel(Progress::IDLE);
        Self {
            forest,
            progress_tx,
        }
    }

    pub fn forest(&self) -> &Arc<Forest> {
        &self.forest
    }

    /// Subscribe to live progress. Suitable for driving a progress
    /// indicator; the denominator is the size of the batch currently
    /// running, and the value returns to [`Progress::IDLE`] after settle.
    pub fn subscribe(&self) -> watch::Receiver<Progress> {
        self.progress_tx.subscribe()
    }

    /// Run one batch to settle and report which of its tasks failed.
    ///
    /// Waits, with no deadline, until every launched subtree has reached a
    /// terminal status. Individual task failures never abort siblings and
    /// never surface as an `Err`; the error path is reserved for batch
    /// misuse and worker panics.
    pub async fn run(&self, batch: &[TaskId]) -> Result<RunReport, TaskError> {
        let mut members = HashSet::with_capacity(batch.len());
        for &id in batch {
            if !self.forest.contains(id) {
                return Err(TaskError::TaskNotFound(id));
            }
            if !members.insert(id) {
                return Err(TaskError::DuplicateInBatch(id));
            }
        }

        let total = batch.len();
        self.progress_tx.send_replace(Progress { settled: 0, total });

        if batch.is_empty() {
            debug!("empty batch, settling immediately");
            self.progress_tx.send_replace(Progress::IDLE);
            return Ok(RunReport { failed: Vec::new() });
        }

        // A task is a root of this batch only when its parent was not
        // supplied alongside it; included children run under their parent.
        let roots: Vec<TaskId> = batch
            .iter()
            .copied()
            .filter(|&id| match self.forest.parent_of(id) {
                Some(parent) => !members.contains(&parent),
                None => true,
            })
            .collect();
        info!(batch = total, roots = roots.len(), "launching batch");

        let (signal_tx, mut signal_rx) = mpsc::unbounded_channel::<TaskId>();

        // Every perform in the batch's subtrees reports here individually,
        // so progress moves on each task, not only when a root finishes.
        let listener = {
            let forest = self.forest.clone();
            let progress_tx = self.progress_tx.clone();
            let members: Vec<TaskId> = batch.to_vec();
            tokio::spawn(async move {
                while let Some(id) = signal_rx.recv().await {
                    let settled = members
                        .iter()
                        .filter(|&&member| {
                            forest
                                .status(member)
                                .is_some_and(|status| status.is_terminal())
                        })
                        .count();
                    debug!(task = id, settled, total, "completion signal");
                    progress_tx.send_replace(Progress { settled, total });
                }
            })
        };

        let mut running = JoinSet::new();
        for root in roots {
            running.spawn(perform(self.forest.clone(), root, signal_tx.clone()));
        }
        drop(signal_tx);

        let mut first_err = None;
        while let Some(joined) = running.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!(error = %err, "subtree aborted");
                    first_err.get_or_insert(err);
                }
                Err(err) => {
                    first_err.get_or_insert(TaskError::Join(err));
                }
            }
        }
        // All senders are gone once the subtrees are joined, so the
        // listener drains and exits on its own.
        listener.await?;

        // The externally observed counter resets strictly after settle.
        self.progress_tx.send_replace(Progress::IDLE);

        if let Some(err) = first_err {
            return Err(err);
        }

        let failed: Vec<TaskId> = batch
            .iter()
            .copied()
            .filter(|&id| self.forest.status(id) == Some(TaskStatus::Failed))
            .collect();
        info!(failed = failed.len(), "batch settled");
        Ok(RunReport { failed })
    }
}

/// Execute one task's subtree: fan out over its children, wait for all of
/// them to settle regardless of outcome, then evaluate this task's own work
/// and signal completion exactly once.
fn perform(
    forest: Arc<Forest>,
    id: TaskId,
    signal: mpsc::UnboundedSender<TaskId>,
) -> BoxFuture<'static, Result<(), TaskError>> {
    Box::pin(async move {
        let task = forest.get(id).ok_or(TaskError::TaskNotFound(id))?;
        task.begin_attempt()?;

        let children = forest.children_of(id);
        if !children.is_empty() {
            debug!(task = id, children = children.len(), "fanning out");
            let mut pending = JoinSet::new();
            for child in children {
                pending.spawn(perform(forest.clone(), child, signal.clone()));
            }
            let mut first_err = None;
            while let Some(joined) = pending.join_next().await {
                match joined {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        first_err.get_or_insert(err);
                    }
                    Err(err) => {
                        first_err.get_or_insert(TaskError::Join(err));
                    }
                }
            }
            if let Some(err) = first_err {
                task.end_attempt();
                return Err(err);
            }
        }

        // Children settled (succeeded or failed alike); the task's own
        // outcome is evaluated independently of theirs.
        let succeeded = if task.take_forced() {
            true
        } else {
            task.work().run(id).await
        };
        task.set_status(if succeeded {
            TaskStatus::Succeeded
        } else {
            TaskStatus::Failed
        });
        task.end_attempt();
        debug!(task = id, succeeded, "task evaluated");

        // The run may have been abandoned; a closed channel is fine.
        let _ = signal.send(id);
        Ok(())
    })
}
