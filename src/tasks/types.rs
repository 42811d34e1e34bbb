//! Task types and the task state machine.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use uuid::Uuid;

use crate::agents::AgentId;

/// Unique identifier for a task
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    /// Create a new unique task ID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from string (for deserialization/testing)
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// String view of the ID
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Status & Priority
// ============================================================================

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Created,
    Queued,
    Assigned,
    InProgress,
    WaitingForDependencies,
    Delegated,
    UnderReview,
    Completed,
    Failed,
    Cancelled,
    Timeout,
}

impl TaskStatus {
    /// Terminal states admit no further transitions except Failed -> Queued
    /// via retry.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::Timeout
        )
    }

    /// Whether a transition from `self` to `to` is legal.
    pub fn can_transition_to(&self, to: TaskStatus) -> bool {
        use TaskStatus::*;
        match (self, to) {
            // retry re-queues a failed task
            (Failed, Queued) => true,
            (from, _) if from.is_terminal() => false,
            (_, Cancelled) | (_, Timeout) | (_, Failed) => true,
            (Created, Queued) | (Created, Assigned) | (Created, WaitingForDependencies) => true,
            (Queued, Assigned) | (Queued, WaitingForDependencies) => true,
            (Assigned, InProgress) | (Assigned, Delegated) | (Assigned, Queued) => true,
            (Assigned, WaitingForDependencies) => true,
            (WaitingForDependencies, Queued) => true,
            (InProgress, UnderReview) | (InProgress, Completed) | (InProgress, Delegated) => true,
            (InProgress, WaitingForDependencies) => true,
            (Delegated, Assigned) | (Delegated, InProgress) => true,
            (UnderReview, Completed) | (UnderReview, InProgress) => true,
            _ => false,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Queued => "queued",
            Self::Assigned => "assigned",
            Self::InProgress => "in_progress",
            Self::WaitingForDependencies => "waiting_for_dependencies",
            Self::Delegated => "delegated",
            Self::UnderReview => "under_review",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Timeout => "timeout",
        };
        write!(f, "{s}")
    }
}

/// Task priority, ordered low to critical.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
    Critical,
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Urgent => "urgent",
            Self::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

// ============================================================================
// Task
// ============================================================================

/// A unit of work flowing through the delegation hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique task ID
    pub id: TaskId,

    /// Task title
    pub title: String,

    /// Detailed description
    pub description: String,

    /// Priority
    pub priority: TaskPriority,

    /// Lifecycle status
    pub status: TaskStatus,

    /// Agent currently responsible for the task
    pub assigned_agent_id: Option<AgentId>,

    /// Agents that have delegated this task, oldest first
    pub delegation_chain: Vec<AgentId>,

    /// Delegation depth; 0 = original task
    pub delegation_level: u32,

    /// Parent task if this is a subtask
    pub parent_task_id: Option<TaskId>,

    /// Direct subtasks
    pub subtask_ids: HashSet<TaskId>,

    /// Capability tags an executing agent must carry
    pub required_capabilities: Vec<String>,

    /// Arbitrary input payload
    pub input_data: HashMap<String, Value>,

    /// Result payload written on completion
    pub output_data: HashMap<String, Value>,

    /// Intermediate results, append-only
    pub intermediate_results: Vec<Value>,

    /// Orchestration context (workflow id, level, strategy, ...)
    pub context: HashMap<String, Value>,

    /// Deadline, if any
    pub deadline: Option<DateTime<Utc>>,

    /// Estimated duration
    pub estimated_duration: Option<Duration>,

    /// Actual duration, set when the task reaches completion or failure
    pub actual_duration: Option<Duration>,

    /// Execution start timestamp
    pub started_at: Option<DateTime<Utc>>,

    /// Completion (or failure) timestamp
    pub completed_at: Option<DateTime<Utc>>,

    /// Retry attempts so far
    pub retry_count: u32,

    /// Retry budget
    pub max_retries: u32,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a new task in `Created` status
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::new(),
            title: title.into(),
            description: description.into(),
            priority: TaskPriority::Normal,
            status: TaskStatus::Created,
            assigned_agent_id: None,
            delegation_chain: Vec::new(),
            delegation_level: 0,
            parent_task_id: None,
            subtask_ids: HashSet::new(),
            required_capabilities: Vec::new(),
            input_data: HashMap::new(),
            output_data: HashMap::new(),
            intermediate_results: Vec::new(),
            context: HashMap::new(),
            deadline: None,
            estimated_duration: None,
            actual_duration: None,
            started_at: None,
            completed_at: None,
            retry_count: 0,
            max_retries: 3,
            created_at: now,
            updated_at: now,
        }
    }

    /// Builder-style priority setter
    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Builder-style capability requirements
    pub fn with_capabilities(mut self, capabilities: Vec<String>) -> Self {
        self.required_capabilities = capabilities;
        self
    }

    /// Whether the task may be retried (failed, with budget remaining)
    pub fn can_retry(&self) -> bool {
        self.status == TaskStatus::Failed && self.retry_count < self.max_retries
    }

    /// Whether the task is past its deadline and still open
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        match self.deadline {
            Some(deadline) => {
                now > deadline
                    && !matches!(self.status, TaskStatus::Completed | TaskStatus::Cancelled)
            }
            None => false,
        }
    }

    /// Whether the task is in a status eligible for execution
    pub fn is_ready_status(&self) -> bool {
        matches!(
            self.status,
            TaskStatus::Created | TaskStatus::Queued | TaskStatus::Assigned
        )
    }

    /// Whether this task has been delegated at least once
    pub fn is_delegated(&self) -> bool {
        !self.delegation_chain.is_empty()
    }

    /// Whether this task has subtasks
    pub fn has_subtasks(&self) -> bool {
        !self.subtask_ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(TaskStatus::Timeout.is_terminal());
        assert!(!TaskStatus::InProgress.is_terminal());
    }

    #[test]
    fn test_legal_transitions() {
        use TaskStatus::*;
        assert!(Created.can_transition_to(Queued));
        assert!(Queued.can_transition_to(Assigned));
        assert!(Assigned.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Completed));
        // a late blocking dependency parks even assigned or running tasks
        assert!(Assigned.can_transition_to(WaitingForDependencies));
        assert!(InProgress.can_transition_to(WaitingForDependencies));
        assert!(WaitingForDependencies.can_transition_to(Queued));
        assert!(Failed.can_transition_to(Queued));
        assert!(InProgress.can_transition_to(Cancelled));
    }

    #[test]
    fn test_illegal_transitions() {
        use TaskStatus::*;
        assert!(!Completed.can_transition_to(InProgress));
        assert!(!Cancelled.can_transition_to(Queued));
        assert!(!Created.can_transition_to(InProgress));
        assert!(!Queued.can_transition_to(Completed));
    }

    #[test]
    fn test_priority_ordering() {
        assert!(TaskPriority::Critical > TaskPriority::Urgent);
        assert!(TaskPriority::Urgent > TaskPriority::High);
        assert!(TaskPriority::High > TaskPriority::Normal);
        assert!(TaskPriority::Normal > TaskPriority::Low);
    }

    #[test]
    fn test_retry_gate() {
        let mut task = Task::new("t", "d");
        assert!(!task.can_retry());

        task.status = TaskStatus::Failed;
        task.retry_count = 2;
        assert!(task.can_retry());

        task.retry_count = 3;
        assert!(!task.can_retry());
    }

    #[test]
    fn test_overdue() {
        let now = Utc::now();
        let mut task = Task::new("t", "d");
        assert!(!task.is_overdue(now));

        task.deadline = Some(now - Duration::seconds(60));
        assert!(task.is_overdue(now));

        task.status = TaskStatus::Completed;
        assert!(!task.is_overdue(now));
    }
}
