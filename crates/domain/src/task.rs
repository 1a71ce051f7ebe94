use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Task lifecycle status. Subtasks only ever move through
/// `pending -> running -> {completed, failed, cancelled}` (with `paused`
/// as a side branch). The main task additionally passes through
/// `pending_planning -> planned -> executing_plan` before the subtask DAG
/// starts running, since planning happens once for the whole run before
/// any subtask is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    /// Main task only: a planning call is in flight.
    PendingPlanning,
    /// Main task only: the planner returned a validated subtask DAG.
    Planned,
    /// Main task only: subtasks are being dispatched.
    ExecutingPlan,
    Running,
    Completed,
    Failed,
    Paused,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

/// An artifact produced by a task (a file, a URL, a text snippet).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A node in the run's task DAG: either the plan's single main task, or
/// one of its subtasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub run_id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: TaskStatus,
    /// `None` for the main task.
    pub parent_id: Option<Uuid>,
    /// Subtask ids, in plan order.
    #[serde(default)]
    pub subtasks: Vec<Uuid>,
    /// Ids of subtasks that must complete before this one is runnable.
    #[serde(default)]
    pub dependencies: Vec<Uuid>,
    /// Qualified tool names (`tool_id__method`) assigned to this task.
    #[serde(default)]
    pub assigned_tools: Vec<String>,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new_main(run_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            run_id,
            name: name.into(),
            description: None,
            status: TaskStatus::Pending,
            parent_id: None,
            subtasks: Vec::new(),
            dependencies: Vec::new(),
            assigned_tools: Vec::new(),
            artifacts: Vec::new(),
            error: None,
            result: None,
            created_at: Utc::now(),
            start_time: None,
            end_time: None,
        }
    }

    pub fn new_subtask(run_id: Uuid, parent_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            parent_id: Some(parent_id),
            ..Self::new_main(run_id, name)
        }
    }

    /// Whether this task can run now given the current status of its
    /// dependencies (all must be `Completed`).
    pub fn is_runnable(&self, dependency_statuses: &[TaskStatus]) -> bool {
        self.status == TaskStatus::Pending
            && dependency_statuses
                .iter()
                .all(|s| *s == TaskStatus::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_main_has_no_parent() {
        let t = Task::new_main(Uuid::new_v4(), "root");
        assert!(t.parent_id.is_none());
        assert_eq!(t.status, TaskStatus::Pending);
    }

    #[test]
    fn new_subtask_has_parent() {
        let run_id = Uuid::new_v4();
        let parent = Uuid::new_v4();
        let t = Task::new_subtask(run_id, parent, "child");
        assert_eq!(t.parent_id, Some(parent));
    }

    #[test]
    fn runnable_requires_all_dependencies_completed() {
        let t = Task::new_main(Uuid::new_v4(), "n");
        assert!(t.is_runnable(&[]));
        assert!(t.is_runnable(&[TaskStatus::Completed, TaskStatus::Completed]));
        assert!(!t.is_runnable(&[TaskStatus::Completed, TaskStatus::Running]));
        assert!(!t.is_runnable(&[TaskStatus::Pending]));
    }

    #[test]
    fn non_pending_task_is_never_runnable() {
        let mut t = Task::new_main(Uuid::new_v4(), "n");
        t.status = TaskStatus::Running;
        assert!(!t.is_runnable(&[]));
    }

    #[test]
    fn terminal_statuses() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(!TaskStatus::Paused.is_terminal());
    }
}
