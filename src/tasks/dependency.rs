//! Task dependency edges.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use super::types::TaskId;

/// Unique identifier for a dependency edge
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencyId(String);

impl DependencyId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for DependencyId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DependencyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of ordering constraint between two tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DependencyType {
    /// Prerequisite must complete before the dependent may start
    #[default]
    FinishToStart,
    /// Prerequisite must start before the dependent may start
    StartToStart,
    /// Prerequisite must complete before the dependent may complete
    FinishToFinish,
}

/// A directed dependency edge: `dependent_task_id` waits on
/// `dependency_task_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDependency {
    /// Edge ID
    pub id: DependencyId,

    /// The task that waits
    pub dependent_task_id: TaskId,

    /// The task being waited on
    pub dependency_task_id: TaskId,

    /// Ordering semantics
    pub dependency_type: DependencyType,

    /// Whether an unsatisfied edge blocks execution
    pub is_blocking: bool,

    /// Whether the edge lies on the workflow's critical path
    pub is_critical: bool,

    /// Field/value pairs the prerequisite's output must match exactly
    pub satisfaction_criteria: HashMap<String, Value>,

    /// Whether the edge has been satisfied
    pub is_satisfied: bool,

    /// Satisfaction timestamp
    pub satisfied_at: Option<DateTime<Utc>>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl TaskDependency {
    /// Create a new blocking finish-to-start dependency
    pub fn new(dependent_task_id: TaskId, dependency_task_id: TaskId) -> Self {
        Self {
            id: DependencyId::new(),
            dependent_task_id,
            dependency_task_id,
            dependency_type: DependencyType::FinishToStart,
            is_blocking: true,
            is_critical: false,
            satisfaction_criteria: HashMap::new(),
            is_satisfied: false,
            satisfied_at: None,
            created_at: Utc::now(),
        }
    }

    /// Builder-style satisfaction criteria
    pub fn with_criteria(mut self, criteria: HashMap<String, Value>) -> Self {
        self.satisfaction_criteria = criteria;
        self
    }

    /// Mark satisfied. Idempotent; the timestamp is set only on the first
    /// call.
    pub fn satisfy(&mut self) {
        if !self.is_satisfied {
            self.is_satisfied = true;
            self.satisfied_at = Some(Utc::now());
        }
    }

    /// Check the prerequisite's result against the criteria. Every criterion
    /// must be present in the result with exactly the expected value; an
    /// empty criteria map always passes.
    pub fn criteria_met(&self, task_result: &HashMap<String, Value>) -> bool {
        self.satisfaction_criteria
            .iter()
            .all(|(key, expected)| task_result.get(key) == Some(expected))
    }
}
