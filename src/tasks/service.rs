//! Task lifecycle service.
//!
//! All status changes flow through here so the state machine, agent metrics,
//! workload counters, and the dependency-satisfaction sweep stay consistent.

use chrono::{DateTime, Duration, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::agents::{AgentId, AgentService};
use crate::config::MaestroConfig;
use crate::error::{MaestroError, Result};
use crate::storage::{DependencyStore, TaskStore};

use super::dependency::{DependencyType, TaskDependency};
use super::types::{Task, TaskId, TaskPriority, TaskStatus};

/// Specification for creating a task.
#[derive(Debug, Clone, Default)]
pub struct TaskSpec {
    pub title: String,
    pub description: String,
    pub priority: TaskPriority,
    pub parent_task_id: Option<TaskId>,
    pub required_capabilities: Vec<String>,
    pub deadline: Option<DateTime<Utc>>,
    pub estimated_duration_secs: Option<i64>,
    pub input_data: HashMap<String, Value>,
    pub context: HashMap<String, Value>,
}

/// Specification for one subtask in a decomposition, with dependencies
/// declared by sibling name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubtaskSpec {
    /// Name unique within the decomposition, used for dependency wiring
    pub name: String,
    pub description: String,
    pub priority: TaskPriority,
    pub required_capabilities: Vec<String>,
    pub estimated_duration_secs: Option<i64>,
    pub input_data: HashMap<String, Value>,
    pub context: HashMap<String, Value>,
    /// Names of sibling subtasks this one waits on (finish-to-start)
    pub depends_on: Vec<String>,
}

/// Progress report for a task and its direct subtasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskProgress {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub progress_percentage: f32,
    pub total_subtasks: usize,
    pub completed_subtasks: usize,
    pub failed_subtasks: usize,
    pub in_progress_subtasks: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub estimated_completion: Option<DateTime<Utc>>,
    pub actual_duration_secs: Option<i64>,
    pub delegation_level: u32,
}

/// Service for task lifecycle operations.
pub struct TaskService {
    tasks: Arc<dyn TaskStore>,
    dependencies: Arc<dyn DependencyStore>,
    agents: Arc<AgentService>,
    config: Arc<MaestroConfig>,
}

impl TaskService {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        dependencies: Arc<dyn DependencyStore>,
        agents: Arc<AgentService>,
        config: Arc<MaestroConfig>,
    ) -> Self {
        Self {
            tasks,
            dependencies,
            agents,
            config,
        }
    }

    /// Create a task. Subtasks inherit delegation level and chain from the
    /// parent and are registered in the parent's subtask index.
    pub async fn create_task(&self, spec: TaskSpec) -> Result<Task> {
        let mut task = Task::new(spec.title, spec.description);
        task.priority = spec.priority;
        task.required_capabilities = spec.required_capabilities;
        task.deadline = spec.deadline;
        task.estimated_duration = spec.estimated_duration_secs.map(Duration::seconds);
        task.input_data = spec.input_data;
        task.context = spec.context;
        task.max_retries = self.config.default_max_retries;

        if let Some(parent_id) = &spec.parent_task_id {
            let parent = self.tasks.get_task(parent_id).await?;
            task.parent_task_id = Some(parent_id.clone());
            task.delegation_level = parent.delegation_level + 1;
            task.delegation_chain = parent.delegation_chain.clone();
        }

        self.tasks.insert_task(task.clone()).await?;

        if let Some(parent_id) = &spec.parent_task_id {
            let child_id = task.id.clone();
            self.tasks
                .update_task(
                    parent_id,
                    Box::new(move |parent| {
                        parent.subtask_ids.insert(child_id);
                        parent.updated_at = Utc::now();
                        Ok(())
                    }),
                )
                .await?;
        }

        info!(task_id = %task.id, title = %task.title, "created task");
        Ok(task)
    }

    /// Fetch a task by ID
    pub async fn get_task(&self, id: &TaskId) -> Result<Task> {
        self.tasks.get_task(id).await
    }

    /// Assign a task to an agent. The agent must be Active; the task moves
    /// to Assigned and the agent's workload counter goes up.
    pub async fn assign_task(&self, task_id: &TaskId, agent_id: &AgentId) -> Result<Task> {
        let agent = self.agents.get_agent(agent_id).await?;
        if !agent.is_available() {
            return Err(MaestroError::validation(format!(
                "agent {agent_id} is not active (status: {})",
                agent.status
            )));
        }

        let assignee = agent_id.clone();
        let updated = self
            .tasks
            .update_task(
                task_id,
                Box::new(move |task| {
                    if !task.status.can_transition_to(TaskStatus::Assigned) {
                        return Err(MaestroError::invalid_transition(
                            task.status,
                            TaskStatus::Assigned,
                        ));
                    }
                    task.assigned_agent_id = Some(assignee);
                    task.status = TaskStatus::Assigned;
                    task.updated_at = Utc::now();
                    Ok(())
                }),
            )
            .await?;

        self.adjust_agent_load(agent_id, 1).await?;

        info!(task_id = %task_id, agent_id = %agent_id, "assigned task");
        Ok(updated)
    }

    /// Start execution. Legal only from Created, Queued, or Assigned, and
    /// only while no blocking dependency remains unsatisfied.
    pub async fn start_task(&self, task_id: &TaskId) -> Result<Task> {
        let blocked = self
            .dependencies
            .dependencies_of(task_id)
            .await?
            .iter()
            .any(|d| d.is_blocking && !d.is_satisfied);
        if blocked {
            return Err(MaestroError::validation(format!(
                "task {task_id} has unsatisfied blocking dependencies"
            )));
        }

        let updated = self
            .tasks
            .update_task(
                task_id,
                Box::new(|task| {
                    if !task.is_ready_status() {
                        return Err(MaestroError::invalid_transition(
                            task.status,
                            TaskStatus::InProgress,
                        ));
                    }
                    task.status = TaskStatus::InProgress;
                    task.started_at = Some(Utc::now());
                    task.updated_at = Utc::now();
                    Ok(())
                }),
            )
            .await?;

        info!(task_id = %task_id, "started task");
        Ok(updated)
    }

    /// Complete a task. Stamps completion time and actual duration,
    /// propagates the outcome to the agent's metrics, and runs the
    /// dependency-satisfaction sweep over edges waiting on this task.
    pub async fn complete_task(
        &self,
        task_id: &TaskId,
        output_data: HashMap<String, Value>,
    ) -> Result<Task> {
        let output_clone = output_data.clone();
        let updated = self
            .tasks
            .update_task(
                task_id,
                Box::new(move |task| {
                    if !task.status.can_transition_to(TaskStatus::Completed) {
                        return Err(MaestroError::invalid_transition(
                            task.status,
                            TaskStatus::Completed,
                        ));
                    }
                    let now = Utc::now();
                    task.status = TaskStatus::Completed;
                    task.completed_at = Some(now);
                    if let Some(started) = task.started_at {
                        task.actual_duration = Some(now - started);
                    }
                    task.output_data.extend(output_clone);
                    task.updated_at = now;
                    Ok(())
                }),
            )
            .await?;

        if let (Some(agent_id), Some(duration)) =
            (&updated.assigned_agent_id, updated.actual_duration)
        {
            self.agents
                .update_performance_metrics(agent_id, duration.num_milliseconds() as f64 / 1000.0, true)
                .await?;
            self.adjust_agent_load(agent_id, -1).await?;
        }

        self.sweep_dependencies(task_id, &updated.output_data).await?;

        info!(task_id = %task_id, "completed task");
        Ok(updated)
    }

    /// Mark a task failed. Spends one retry attempt, records the error in
    /// the output payload, and propagates the failure to agent metrics.
    pub async fn fail_task(&self, task_id: &TaskId, error_message: &str) -> Result<Task> {
        let message = error_message.to_string();
        let updated = self
            .tasks
            .update_task(
                task_id,
                Box::new(move |task| {
                    if !task.status.can_transition_to(TaskStatus::Failed) {
                        return Err(MaestroError::invalid_transition(
                            task.status,
                            TaskStatus::Failed,
                        ));
                    }
                    let now = Utc::now();
                    task.status = TaskStatus::Failed;
                    task.completed_at = Some(now);
                    if let Some(started) = task.started_at {
                        task.actual_duration = Some(now - started);
                    }
                    task.retry_count += 1;
                    task.output_data
                        .insert("error_message".to_string(), json!(message));
                    task.output_data
                        .insert("failure_timestamp".to_string(), json!(now.to_rfc3339()));
                    task.updated_at = now;
                    Ok(())
                }),
            )
            .await?;

        if let (Some(agent_id), Some(duration)) =
            (&updated.assigned_agent_id, updated.actual_duration)
        {
            self.agents
                .update_performance_metrics(
                    agent_id,
                    duration.num_milliseconds() as f64 / 1000.0,
                    false,
                )
                .await?;
            self.adjust_agent_load(agent_id, -1).await?;
        }

        warn!(task_id = %task_id, error = error_message, "failed task");
        Ok(updated)
    }

    /// Re-queue a failed task for another attempt. Only Failed tasks with
    /// retry budget remaining are eligible; timing fields reset and the
    /// failed attempt's output is archived in `intermediate_results`.
    pub async fn retry_task(&self, task_id: &TaskId) -> Result<Task> {
        let task_label = task_id.to_string();
        let updated = self
            .tasks
            .update_task(
                task_id,
                Box::new(move |task| {
                    if task.status != TaskStatus::Failed {
                        return Err(MaestroError::invalid_transition(
                            task.status,
                            TaskStatus::Queued,
                        ));
                    }
                    if task.retry_count >= task.max_retries {
                        return Err(MaestroError::RetryLimitExceeded {
                            task_id: task_label,
                            max_retries: task.max_retries,
                        });
                    }
                    if !task.output_data.is_empty() {
                        let previous = std::mem::take(&mut task.output_data);
                        task.intermediate_results.push(json!(previous));
                    }
                    task.status = TaskStatus::Queued;
                    task.started_at = None;
                    task.completed_at = None;
                    task.actual_duration = None;
                    task.updated_at = Utc::now();
                    Ok(())
                }),
            )
            .await?;

        info!(
            task_id = %task_id,
            attempt = updated.retry_count + 1,
            "retrying task"
        );
        Ok(updated)
    }

    /// Hand a failed task to a supervising agent with a fresh retry budget.
    /// Unlike `retry_task` this works even when the budget is spent, since
    /// the supervisor takes over responsibility for the task.
    pub async fn escalate_task(&self, task_id: &TaskId, to_agent_id: &AgentId) -> Result<Task> {
        let agent = self.agents.get_agent(to_agent_id).await?;
        if !agent.is_available() {
            return Err(MaestroError::validation(format!(
                "agent {to_agent_id} is not active (status: {})",
                agent.status
            )));
        }

        let to = to_agent_id.clone();
        let updated = self
            .tasks
            .update_task(
                task_id,
                Box::new(move |task| {
                    if task.status != TaskStatus::Failed {
                        return Err(MaestroError::invalid_transition(
                            task.status,
                            TaskStatus::Assigned,
                        ));
                    }
                    if !task.output_data.is_empty() {
                        let previous = std::mem::take(&mut task.output_data);
                        task.intermediate_results.push(json!(previous));
                    }
                    task.assigned_agent_id = Some(to);
                    task.status = TaskStatus::Assigned;
                    task.retry_count = 0;
                    task.started_at = None;
                    task.completed_at = None;
                    task.actual_duration = None;
                    task.updated_at = Utc::now();
                    Ok(())
                }),
            )
            .await?;

        self.adjust_agent_load(to_agent_id, 1).await?;

        info!(task_id = %task_id, to = %to_agent_id, "escalated task");
        Ok(updated)
    }

    /// Cancel a single task. Terminal tasks are left untouched.
    pub async fn cancel_task(&self, task_id: &TaskId) -> Result<Task> {
        let updated = self
            .tasks
            .update_task(
                task_id,
                Box::new(|task| {
                    if task.status.is_terminal() {
                        return Err(MaestroError::invalid_transition(
                            task.status,
                            TaskStatus::Cancelled,
                        ));
                    }
                    task.status = TaskStatus::Cancelled;
                    task.completed_at = Some(Utc::now());
                    task.updated_at = Utc::now();
                    Ok(())
                }),
            )
            .await;

        let updated = match updated {
            Ok(task) => task,
            // already terminal: cancellation is a no-op, load stays settled
            Err(MaestroError::InvalidTransition { .. }) => {
                return self.tasks.get_task(task_id).await
            }
            Err(e) => return Err(e),
        };

        if let Some(agent_id) = &updated.assigned_agent_id {
            self.adjust_agent_load(agent_id, -1).await?;
        }

        info!(task_id = %task_id, "cancelled task");
        Ok(updated)
    }

    /// Cancel a task and its whole subtask tree. A visited set guards
    /// against cyclic parent links.
    pub async fn cancel_task_tree(&self, task_id: &TaskId) -> Result<usize> {
        let mut visited = HashSet::new();
        self.cancel_tree_inner(task_id.clone(), &mut visited).await
    }

    fn cancel_tree_inner<'a>(
        &'a self,
        task_id: TaskId,
        visited: &'a mut HashSet<TaskId>,
    ) -> BoxFuture<'a, Result<usize>> {
        async move {
            if !visited.insert(task_id.clone()) {
                return Ok(0);
            }

            let task = self.tasks.get_task(&task_id).await?;
            let mut cancelled = 0;
            if !task.status.is_terminal() {
                self.cancel_task(&task_id).await?;
                cancelled += 1;
            }
            for child_id in task.subtask_ids {
                cancelled += self.cancel_tree_inner(child_id, visited).await?;
            }
            Ok(cancelled)
        }
        .boxed()
    }

    /// Delegate a task from one agent to another. Appends to the delegation
    /// chain, deepens the delegation level, and transfers the workload.
    pub async fn delegate_task(
        &self,
        task_id: &TaskId,
        from_agent_id: &AgentId,
        to_agent_id: &AgentId,
    ) -> Result<Task> {
        let to_agent = self.agents.get_agent(to_agent_id).await?;
        if !to_agent.is_available() {
            return Err(MaestroError::validation(format!(
                "agent {to_agent_id} is not active (status: {})",
                to_agent.status
            )));
        }

        let from = from_agent_id.clone();
        let to = to_agent_id.clone();
        let updated = self
            .tasks
            .update_task(
                task_id,
                Box::new(move |task| {
                    if !task.status.can_transition_to(TaskStatus::Delegated) {
                        return Err(MaestroError::invalid_transition(
                            task.status,
                            TaskStatus::Delegated,
                        ));
                    }
                    task.delegation_chain.push(from);
                    task.delegation_level += 1;
                    task.assigned_agent_id = Some(to);
                    // delegated tasks land assigned on the new agent
                    task.status = TaskStatus::Assigned;
                    task.updated_at = Utc::now();
                    Ok(())
                }),
            )
            .await?;

        self.adjust_agent_load(from_agent_id, -1).await?;
        self.adjust_agent_load(to_agent_id, 1).await?;

        info!(
            task_id = %task_id,
            from = %from_agent_id,
            to = %to_agent_id,
            level = updated.delegation_level,
            "delegated task"
        );
        Ok(updated)
    }

    /// Tasks eligible for execution: ready status and not the dependent side
    /// of any unsatisfied blocking edge.
    pub async fn get_ready_tasks(&self) -> Result<Vec<Task>> {
        let mut ready = Vec::new();
        for task in self.tasks.list_tasks().await? {
            if !task.is_ready_status() {
                continue;
            }
            let blocked = self
                .dependencies
                .dependencies_of(&task.id)
                .await?
                .iter()
                .any(|d| d.is_blocking && !d.is_satisfied);
            if !blocked {
                ready.push(task);
            }
        }
        Ok(ready)
    }

    /// Tasks assigned to an agent
    pub async fn get_agent_tasks(&self, agent_id: &AgentId) -> Result<Vec<Task>> {
        self.tasks.find_tasks_by_agent(agent_id).await
    }

    /// Direct subtasks of a task
    pub async fn get_subtasks(&self, parent_id: &TaskId) -> Result<Vec<Task>> {
        let parent = self.tasks.get_task(parent_id).await?;
        let mut subtasks = Vec::with_capacity(parent.subtask_ids.len());
        for id in &parent.subtask_ids {
            subtasks.push(self.tasks.get_task(id).await?);
        }
        Ok(subtasks)
    }

    /// Dependency edges waiting on the given task
    pub async fn get_dependents(&self, task_id: &TaskId) -> Result<Vec<TaskDependency>> {
        self.dependencies.dependents_of(task_id).await
    }

    /// Create a dependency edge. Self-dependencies are rejected; when the
    /// edge is blocking and unsatisfied, the dependent task is parked in
    /// WaitingForDependencies.
    pub async fn create_task_dependency(
        &self,
        dependent_task_id: &TaskId,
        dependency_task_id: &TaskId,
        dependency_type: DependencyType,
        is_blocking: bool,
        criteria: HashMap<String, Value>,
    ) -> Result<TaskDependency> {
        if dependent_task_id == dependency_task_id {
            return Err(MaestroError::validation(format!(
                "task {dependent_task_id} cannot depend on itself"
            )));
        }
        // both ends must exist
        self.tasks.get_task(dependency_task_id).await?;
        self.tasks.get_task(dependent_task_id).await?;

        let mut edge =
            TaskDependency::new(dependent_task_id.clone(), dependency_task_id.clone())
                .with_criteria(criteria);
        edge.dependency_type = dependency_type;
        edge.is_blocking = is_blocking;
        self.dependencies.insert_dependency(edge.clone()).await?;

        if is_blocking {
            self.tasks
                .update_task(
                    dependent_task_id,
                    Box::new(|task| {
                        if task
                            .status
                            .can_transition_to(TaskStatus::WaitingForDependencies)
                        {
                            task.status = TaskStatus::WaitingForDependencies;
                            task.updated_at = Utc::now();
                        }
                        Ok(())
                    }),
                )
                .await?;
        }

        debug!(
            dependent = %dependent_task_id,
            dependency = %dependency_task_id,
            "created task dependency"
        );
        Ok(edge)
    }

    /// Bulk-create subtasks from specs, wiring declared inter-subtask
    /// dependencies by spec name.
    pub async fn decompose_task(
        &self,
        parent_id: &TaskId,
        specs: &[SubtaskSpec],
    ) -> Result<Vec<Task>> {
        let mut subtasks = Vec::with_capacity(specs.len());
        let mut by_name: HashMap<String, TaskId> = HashMap::new();

        for spec in specs {
            let subtask = self
                .create_task(TaskSpec {
                    title: spec.name.clone(),
                    description: spec.description.clone(),
                    priority: spec.priority,
                    parent_task_id: Some(parent_id.clone()),
                    required_capabilities: spec.required_capabilities.clone(),
                    estimated_duration_secs: spec.estimated_duration_secs,
                    input_data: spec.input_data.clone(),
                    context: spec.context.clone(),
                    ..Default::default()
                })
                .await?;
            by_name.insert(spec.name.clone(), subtask.id.clone());
            subtasks.push(subtask);
        }

        for spec in specs {
            for dep_name in &spec.depends_on {
                let dependency_id = by_name.get(dep_name).ok_or_else(|| {
                    MaestroError::validation(format!(
                        "subtask {} depends on unknown sibling {dep_name}",
                        spec.name
                    ))
                })?;
                let dependent_id = &by_name[&spec.name];
                self.create_task_dependency(
                    dependent_id,
                    dependency_id,
                    DependencyType::FinishToStart,
                    true,
                    HashMap::new(),
                )
                .await?;
            }
        }

        info!(
            parent = %parent_id,
            count = subtasks.len(),
            "decomposed task into subtasks"
        );
        Ok(subtasks)
    }

    /// Progress report over a task's direct subtasks
    pub async fn get_task_progress(&self, task_id: &TaskId) -> Result<TaskProgress> {
        let task = self.tasks.get_task(task_id).await?;
        let subtasks = self.get_subtasks(task_id).await?;

        let total = subtasks.len();
        let completed = subtasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .count();
        let failed = subtasks
            .iter()
            .filter(|t| t.status == TaskStatus::Failed)
            .count();
        let in_progress = subtasks
            .iter()
            .filter(|t| t.status == TaskStatus::InProgress)
            .count();

        let progress_percentage = if total > 0 {
            completed as f32 / total as f32 * 100.0
        } else {
            0.0
        };

        let estimated_completion = match (task.estimated_duration, task.started_at) {
            (Some(estimate), Some(started)) => Some(started + estimate),
            _ => None,
        };

        Ok(TaskProgress {
            task_id: task.id.clone(),
            status: task.status,
            progress_percentage,
            total_subtasks: total,
            completed_subtasks: completed,
            failed_subtasks: failed,
            in_progress_subtasks: in_progress,
            started_at: task.started_at,
            estimated_completion,
            actual_duration_secs: task.actual_duration.map(|d| d.num_seconds()),
            delegation_level: task.delegation_level,
        })
    }

    /// Open tasks past their deadline
    pub async fn get_overdue_tasks(&self) -> Result<Vec<Task>> {
        let now = Utc::now();
        Ok(self
            .tasks
            .list_tasks()
            .await?
            .into_iter()
            .filter(|t| t.is_overdue(now))
            .collect())
    }

    /// All tasks (for monitoring/reporting)
    pub async fn list_tasks(&self) -> Result<Vec<Task>> {
        self.tasks.list_tasks().await
    }

    /// Satisfy edges waiting on a completed task. Idempotent: already
    /// satisfied edges are skipped, and criteria are checked against the
    /// completed task's output. When a dependent's last unsatisfied blocking
    /// edge flips, the dependent leaves WaitingForDependencies for Queued.
    async fn sweep_dependencies(
        &self,
        completed_task_id: &TaskId,
        output: &HashMap<String, Value>,
    ) -> Result<()> {
        let edges = self.dependencies.dependents_of(completed_task_id).await?;
        for edge in edges {
            if edge.is_satisfied || !edge.criteria_met(output) {
                continue;
            }

            self.dependencies
                .update_dependency(
                    &edge.id,
                    Box::new(|d| {
                        d.satisfy();
                        Ok(())
                    }),
                )
                .await?;
            debug!(
                dependency = %edge.id,
                dependent = %edge.dependent_task_id,
                "dependency satisfied"
            );

            let still_blocked = self
                .dependencies
                .dependencies_of(&edge.dependent_task_id)
                .await?
                .iter()
                .any(|d| d.is_blocking && !d.is_satisfied);

            if !still_blocked {
                self.tasks
                    .update_task(
                        &edge.dependent_task_id,
                        Box::new(|task| {
                            if task.status == TaskStatus::WaitingForDependencies {
                                task.status = TaskStatus::Queued;
                                task.updated_at = Utc::now();
                                debug!(task_id = %task.id, "task unblocked");
                            }
                            Ok(())
                        }),
                    )
                    .await?;
            }
        }
        Ok(())
    }

    async fn adjust_agent_load(&self, agent_id: &AgentId, delta: i32) -> Result<()> {
        self.agents
            .update_performance_load(agent_id, delta)
            .await
    }
}
