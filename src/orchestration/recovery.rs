//! Failure classification and recovery.
//!
//! Every task failure is classified into a `FailureKind` and mapped through
//! `select_strategy` onto exactly one of five recovery actions. Nothing is
//! swallowed: each path either repairs the task or ends in an abort cascade.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::agents::{AgentId, AgentService};
use crate::config::MaestroConfig;
use crate::error::Result;
use crate::tasks::{Task, TaskId, TaskService};

use super::analysis::{analyze, Complexity};
use super::decomposition::build_plan;

/// Classified cause of a task failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Timeouts, disconnects, momentary unavailability
    Transient,
    /// The agent or its resources are saturated
    ResourceExhausted,
    /// The work outgrew the assigned task's scope
    ExceededComplexity,
    /// The assigned agent lacks the needed skills
    CapabilityMismatch,
    /// The task has burned through its retry budget
    RepeatedFailure,
    /// Unrecoverable by any local action
    Fatal,
}

/// One of the five recovery actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    Retry,
    Reassign,
    Decompose,
    Escalate,
    Abort,
}

impl fmt::Display for RecoveryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Retry => "retry",
            Self::Reassign => "reassign",
            Self::Decompose => "decompose",
            Self::Escalate => "escalate",
            Self::Abort => "abort",
        };
        write!(f, "{s}")
    }
}

/// Report of a handled failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryReport {
    pub task_id: TaskId,
    pub kind: FailureKind,
    pub strategy: RecoveryStrategy,
    pub actions_taken: Vec<String>,
}

/// Classify a failure from the error context and the task's state. Budget
/// exhaustion dominates the textual hints.
pub fn classify_failure(task: &Task, error_context: &str) -> FailureKind {
    if task.retry_count >= task.max_retries {
        return FailureKind::RepeatedFailure;
    }

    let context = error_context.to_lowercase();
    if ["timeout", "unavailable", "connection", "transient"]
        .iter()
        .any(|k| context.contains(k))
    {
        FailureKind::Transient
    } else if ["capacity", "overload", "resource", "exhausted"]
        .iter()
        .any(|k| context.contains(k))
    {
        FailureKind::ResourceExhausted
    } else if ["capability", "unsupported", "skill"]
        .iter()
        .any(|k| context.contains(k))
    {
        FailureKind::CapabilityMismatch
    } else if ["complexity", "too complex", "scope"]
        .iter()
        .any(|k| context.contains(k))
    {
        FailureKind::ExceededComplexity
    } else {
        FailureKind::Fatal
    }
}

/// Map a failure kind onto exactly one recovery strategy. Pure function;
/// transient failures retry only while budget remains.
pub fn select_strategy(kind: FailureKind, task: &Task) -> RecoveryStrategy {
    match kind {
        FailureKind::Transient if task.can_retry() => RecoveryStrategy::Retry,
        FailureKind::Transient => RecoveryStrategy::Escalate,
        FailureKind::ResourceExhausted | FailureKind::CapabilityMismatch => {
            RecoveryStrategy::Reassign
        }
        FailureKind::ExceededComplexity => RecoveryStrategy::Decompose,
        FailureKind::RepeatedFailure => RecoveryStrategy::Escalate,
        FailureKind::Fatal => RecoveryStrategy::Abort,
    }
}

/// Executes recovery strategies against the services.
pub struct RecoveryEngine {
    agents: Arc<AgentService>,
    tasks: Arc<TaskService>,
    config: Arc<MaestroConfig>,
}

impl RecoveryEngine {
    pub fn new(
        agents: Arc<AgentService>,
        tasks: Arc<TaskService>,
        config: Arc<MaestroConfig>,
    ) -> Self {
        Self {
            agents,
            tasks,
            config,
        }
    }

    /// Classify, select, and execute recovery for a failed task.
    pub async fn handle_task_failure(
        &self,
        task_id: &TaskId,
        error_context: &str,
    ) -> Result<RecoveryReport> {
        let task = self.tasks.get_task(task_id).await?;
        let kind = classify_failure(&task, error_context);
        let strategy = select_strategy(kind, &task);
        warn!(
            task_id = %task_id,
            ?kind,
            %strategy,
            "handling task failure"
        );

        let actions_taken = match strategy {
            RecoveryStrategy::Retry => self.execute_retry(&task).await?,
            RecoveryStrategy::Reassign => self.execute_reassign(&task).await?,
            RecoveryStrategy::Decompose => self.execute_decompose(&task).await?,
            RecoveryStrategy::Escalate => self.execute_escalate(&task).await?,
            RecoveryStrategy::Abort => self.execute_abort(&task).await?,
        };

        info!(task_id = %task_id, %strategy, "recovery applied");
        Ok(RecoveryReport {
            task_id: task_id.clone(),
            kind,
            strategy,
            actions_taken,
        })
    }

    async fn execute_retry(&self, task: &Task) -> Result<Vec<String>> {
        let retried = self.tasks.retry_task(&task.id).await?;
        Ok(vec![format!(
            "re-queued task for attempt {}",
            retried.retry_count + 1
        )])
    }

    /// Re-queue the task and hand it to a different capable agent. Falls
    /// back to escalation when no alternative exists.
    async fn execute_reassign(&self, task: &Task) -> Result<Vec<String>> {
        let previous = task.assigned_agent_id.clone();
        let alternative = self
            .agents
            .list_agents()
            .await?
            .into_iter()
            .filter(|a| a.is_available() && a.has_all_capabilities(&task.required_capabilities))
            .find(|a| previous.as_ref() != Some(&a.id));

        let Some(agent) = alternative else {
            let mut actions = vec!["no alternative agent available".to_string()];
            actions.extend(self.execute_escalate(task).await?);
            return Ok(actions);
        };

        self.tasks.retry_task(&task.id).await?;
        self.tasks.assign_task(&task.id, &agent.id).await?;
        Ok(vec![format!("reassigned to agent {}", agent.id)])
    }

    /// Re-queue the failed task and split it into smaller parts. The plan
    /// is applied directly: the decomposition gate only splits
    /// workflow-type tasks, and decompose recovery targets leaves of any
    /// type.
    async fn execute_decompose(&self, task: &Task) -> Result<Vec<String>> {
        let requeued = self.tasks.retry_task(&task.id).await?;

        let complexity = task
            .context
            .get("complexity")
            .and_then(|v| v.as_str())
            .map(Complexity::from_label)
            .unwrap_or_default();
        let analysis = analyze(
            &task.description,
            complexity,
            &task.required_capabilities,
            self.config.complexity_threshold,
        );
        let plan = build_plan(&requeued, &analysis);
        let subtasks = self
            .tasks
            .decompose_task(&requeued.id, &plan.subtask_specs)
            .await?;

        Ok(vec![format!(
            "split into {} subtasks ({} plan)",
            subtasks.len(),
            plan.strategy
        )])
    }

    /// Walk upward: prefer the assigned agent's manager, falling back to the
    /// most recent delegator. With nowhere to escalate, abort.
    async fn execute_escalate(&self, task: &Task) -> Result<Vec<String>> {
        let target = match self.escalation_target(task).await? {
            Some(target) => target,
            None => {
                let mut actions = vec!["no escalation target".to_string()];
                actions.extend(self.execute_abort(task).await?);
                return Ok(actions);
            }
        };

        self.tasks.escalate_task(&task.id, &target).await?;
        Ok(vec![format!("escalated to agent {target}")])
    }

    async fn escalation_target(&self, task: &Task) -> Result<Option<AgentId>> {
        if let Some(agent_id) = &task.assigned_agent_id {
            let agent = self.agents.get_agent(agent_id).await?;
            if let Some(parent_id) = agent.parent_agent_id {
                let parent = self.agents.get_agent(&parent_id).await?;
                if parent.is_available() {
                    return Ok(Some(parent_id));
                }
            }
        }
        if let Some(delegator) = task.delegation_chain.last() {
            let agent = self.agents.get_agent(delegator).await?;
            if agent.is_available() {
                return Ok(Some(delegator.clone()));
            }
        }
        Ok(None)
    }

    /// Cancel the task's subtask tree, cascade-cancel everything waiting on
    /// it, and propagate failure up the parent chain.
    async fn execute_abort(&self, task: &Task) -> Result<Vec<String>> {
        let mut actions = Vec::new();

        let cancelled = self.tasks.cancel_task_tree(&task.id).await?;
        actions.push(format!("cancelled task tree ({cancelled} tasks)"));

        let mut visited = HashSet::new();
        visited.insert(task.id.clone());
        let dependents_cancelled = self.cancel_dependents(task.id.clone(), &mut visited).await?;
        if dependents_cancelled > 0 {
            actions.push(format!("cancelled {dependents_cancelled} dependent tasks"));
        }

        let mut failed_parents = 0;
        let mut parent_visited = HashSet::new();
        let mut cursor = task.parent_task_id.clone();
        while let Some(parent_id) = cursor {
            if !parent_visited.insert(parent_id.clone()) {
                break;
            }
            let parent = self.tasks.get_task(&parent_id).await?;
            if !parent.status.is_terminal() {
                self.tasks
                    .fail_task(&parent_id, "aborted: subtask chain failed")
                    .await?;
                failed_parents += 1;
            }
            cursor = parent.parent_task_id;
        }
        if failed_parents > 0 {
            actions.push(format!("propagated failure to {failed_parents} parents"));
        }

        Ok(actions)
    }

    fn cancel_dependents<'a>(
        &'a self,
        task_id: TaskId,
        visited: &'a mut HashSet<TaskId>,
    ) -> BoxFuture<'a, Result<usize>> {
        async move {
            let mut cancelled = 0;
            for edge in self.tasks.get_dependents(&task_id).await? {
                let dependent_id = edge.dependent_task_id;
                if !visited.insert(dependent_id.clone()) {
                    continue;
                }
                cancelled += self.tasks.cancel_task_tree(&dependent_id).await?;
                cancelled += self.cancel_dependents(dependent_id, visited).await?;
            }
            Ok(cancelled)
        }
        .boxed()
    }
}
