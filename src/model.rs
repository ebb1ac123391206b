use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::TaskError;
use crate::work::Work;

pub type TaskId = u64;

/// Task status with atomic representation
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending = 0,
    Succeeded = 1,
    Failed = 2,
}

impl TaskStatus {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(TaskStatus::Pending),
            1 => Some(TaskStatus::Succeeded),
            2 => Some(TaskStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Pending)
    }
}

/// A single node in the forest.
///
/// The node carries only per-task execution state; parent/child edges live
/// on the [`Forest`] as id references, so nodes never own each other.
pub struct Task {
    pub id: TaskId,
    status: AtomicU8,
    in_flight: AtomicBool,
    force_success: AtomicBool,
    work: Arc<dyn Work>,
}

impl Task {
    fn new(id: TaskId, work: Arc<dyn Work>) -> Self {
        Self {
            id,
            status: AtomicU8::new(TaskStatus::Pending as u8),
            in_flight: AtomicBool::new(false),
            force_success: AtomicBool::new(false),
            work,
        }
    }

    pub fn status(&self) -> TaskStatus {
        // The stored value only ever comes from a TaskStatus.
        TaskStatus::from_u8(self.status.load(Ordering::Acquire)).unwrap_or(TaskStatus::Pending)
    }

    pub(crate) fn set_status(&self, status: TaskStatus) {
        self.status.store(status as u8, Ordering::Release);
    }

    /// Mark this task as mid-execution. Fails if an attempt is already in
    /// flight: perform must not be re-entered before it signals completion.
    pub(crate) fn begin_attempt(&self) -> Result<(), TaskError> {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            return Err(TaskError::AlreadyRunning(self.id));
        }
        Ok(())
    }

    pub(crate) fn end_attempt(&self) {
        self.in_flight.store(false, Ordering::Release);
    }

    /// Consume the one-shot forced-success flag armed by a retry.
    pub(crate) fn take_forced(&self) -> bool {
        self.force_success.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn work(&self) -> Arc<dyn Work> {
        self.work.clone()
    }
}

/// Flat arena of tasks plus the parent/child edge indices.
///
/// Edges are stored as id references in both directions, mirroring a
/// dependency index: `children` maps a parent to its ordered child list,
/// `parents` maps a child back to its single parent. Storing ids instead of
/// node pointers keeps the graph acyclic in ownership terms.
pub struct Forest {
    tasks: DashMap<TaskId, Arc<Task>>,
    children: DashMap<TaskId, Vec<TaskId>>,
    parents: DashMap<TaskId, TaskId>,
}

impl Forest {
    pub fn new() -> Self {
        Self {
            tasks: DashMap::new(),
            children: DashMap::new(),
            parents: DashMap::new(),
        }
    }

    /// Register a new task under a caller-assigned id.
    pub fn insert(&self, id: TaskId, work: Arc<dyn Work>) -> Result<(), TaskError> {
        if self.tasks.contains_key(&id) {
            return Err(TaskError::DuplicateTask(id));
        }
        self.tasks.insert(id, Arc::new(Task::new(id, work)));
        debug!(task = id, "task registered");
        Ok(())
    }

    /// Wire `children` under `parent`.
    ///
    /// Each child's parent reference is set to `parent`; the last add wins,
    /// so a re-parented child is removed from its previous parent's list.
    /// Appending is idempotent by id. Rejects edges that would close a cycle.
    pub fn add_children(&self, parent: TaskId, children: &[TaskId]) -> Result<(), TaskError> {
        if !self.tasks.contains_key(&parent) {
            return Err(TaskError::TaskNotFound(parent));
        }
        for &child in children {
            if !self.tasks.contains_key(&child) {
                return Err(TaskError::TaskNotFound(child));
            }
            if child == parent || self.is_ancestor(child, parent) {
                return Err(TaskError::CycleDetected { parent, child });
            }

            let previous = self.parents.insert(child, parent);
            if let Some(old_parent) = previous {
                if old_parent != parent {
                    if let Some(mut siblings) = self.children.get_mut(&old_parent) {
                        siblings.retain(|&id| id != child);
                    }
                    debug!(task = child, from = old_parent, to = parent, "task re-parented");
                }
            }

            let mut list = self.children.entry(parent).or_default();
            if !list.contains(&child) {
                list.push(child);
            }
        }
        Ok(())
    }

    /// Whether `ancestor` appears on the parent chain above `id`.
    fn is_ancestor(&self, ancestor: TaskId, id: TaskId) -> bool {
        let mut current = id;
        while let Some(parent) = self.parent_of(current) {
            if parent == ancestor {
                return true;
            }
            current = parent;
        }
        false
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.tasks.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn ids(&self) -> Vec<TaskId> {
        self.tasks.iter().map(|entry| *entry.key()).collect()
    }

    pub fn status(&self, id: TaskId) -> Option<TaskStatus> {
        self.tasks.get(&id).map(|task| task.status())
    }

    pub fn parent_of(&self, id: TaskId) -> Option<TaskId> {
        self.parents.get(&id).map(|parent| *parent)
    }

    pub fn children_of(&self, id: TaskId) -> Vec<TaskId> {
        self.children
            .get(&id)
            .map(|list| list.clone())
            .unwrap_or_default()
    }

    /// Look up a task node, e.g. to read `id` and `status` after settle.
    pub fn get(&self, id: TaskId) -> Option<Arc<Task>> {
        self.tasks.get(&id).map(|task| task.clone())
    }

    /// Put a settled task back to `Pending` ahead of a retry attempt.
    pub fn reset_status(&self, id: TaskId) -> Result<(), TaskError> {
        let task = self.get(id).ok_or(TaskError::TaskNotFound(id))?;
        task.set_status(TaskStatus::Pending);
        Ok(())
    }

    /// Arm the one-shot forced-success override for the next attempt.
    pub fn force_success(&self, id: TaskId) -> Result<(), TaskError> {
        let task = self.get(id).ok_or(TaskError::TaskNotFound(id))?;
        task.force_success.store(true, Ordering::Release);
        Ok(())
    }
}

impl Default for Forest {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::work::FixedOutcome;
    use pretty_assertions::assert_eq;

    fn forest_with(ids: &[TaskId]) -> Forest {
        let forest = Forest::new();
        for &id in ids {
            forest.insert(id, Arc::new(FixedOutcome(true))).unwrap();
        }
        forest
    }

    #[test]
    fn insert_rejects_duplicate_id() {
        let forest = forest_with(&[1]);
        let err = forest.insert(1, Arc::new(FixedOutcome(true))).unwrap_err();
        assert!(matches!(err, TaskError::DuplicateTask(1)));
    }

    #[test]
    fn add_children_sets_parent_reference() {
        let forest = forest_with(&[1, 2, 3]);
        forest.add_children(1, &[2, 3]).unwrap();

        assert_eq!(forest.parent_of(2), Some(1));
        assert_eq!(forest.parent_of(3), Some(1));
        assert_eq!(forest.children_of(1), vec![2, 3]);
    }

    #[test]
    fn add_is_idempotent_by_id() {
        let forest = forest_with(&[1, 2]);
        forest.add_children(1, &[2]).unwrap();
        forest.add_children(1, &[2]).unwrap();

        assert_eq!(forest.children_of(1), vec![2]);
    }

    #[test]
    fn last_add_wins_on_reparent() {
        let forest = forest_with(&[1, 2, 3]);
        forest.add_children(1, &[3]).unwrap();
        forest.add_children(2, &[3]).unwrap();

        assert_eq!(forest.parent_of(3), Some(2));
        assert_eq!(forest.children_of(1), Vec::<TaskId>::new());
        assert_eq!(forest.children_of(2), vec![3]);
    }

    #[test]
    fn self_edge_is_a_cycle() {
        let forest = forest_with(&[1]);
        let err = forest.add_children(1, &[1]).unwrap_err();
        assert!(matches!(
            err,
            TaskError::CycleDetected { parent: 1, child: 1 }
        ));
    }

    #[test]
    fn ancestor_edge_is_a_cycle() {
        let forest = forest_with(&[1, 2, 3]);
        forest.add_children(1, &[2]).unwrap();
        forest.add_children(2, &[3]).unwrap();

        let err = forest.add_children(3, &[1]).unwrap_err();
        assert!(matches!(
            err,
            TaskError::CycleDetected { parent: 3, child: 1 }
        ));
    }

    #[test]
    fn unknown_ids_are_rejected() {
        let forest = forest_with(&[1]);
        assert!(matches!(
            forest.add_children(1, &[9]).unwrap_err(),
            TaskError::TaskNotFound(9)
        ));
        assert!(matches!(
            forest.add_children(9, &[1]).unwrap_err(),
            TaskError::TaskNotFound(9)
        ));
    }

    #[test]
    fn attempt_guard_rejects_reentry() {
        let forest = forest_with(&[1]);
        let task = forest.get(1).unwrap();

        task.begin_attempt().unwrap();
        assert!(matches!(
            task.begin_attempt().unwrap_err(),
            TaskError::AlreadyRunning(1)
        ));

        task.end_attempt();
        task.begin_attempt().unwrap();
    }

    #[test]
    fn forced_success_flag_is_one_shot() {
        let forest = forest_with(&[1]);
        let task = forest.get(1).unwrap();

        assert!(!task.take_forced());
        forest.force_success(1).unwrap();
        assert!(task.take_forced());
        assert!(!task.take_forced());
    }

    #[test]
    fn status_reset_returns_to_pending() {
        let forest = forest_with(&[1]);
        let task = forest.get(1).unwrap();

        task.set_status(TaskStatus::Failed);
        assert_eq!(forest.status(1), Some(TaskStatus::Failed));

        forest.reset_status(1).unwrap();
        assert_eq!(forest.status(1), Some(TaskStatus::Pending));
    }

    #[test]
    fn status_round_trips_through_u8() {
        for status in [TaskStatus::Pending, TaskStatus::Succeeded, TaskStatus::Failed] {
            assert_eq!(TaskStatus::from_u8(status as u8), Some(status));
        }
        assert_eq!(TaskStatus::from_u8(3), None);
    }
}
