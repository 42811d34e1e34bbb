//! Workflow progress monitoring.

use chrono::{DateTime, Duration, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use crate::agents::AgentId;
use crate::config::MaestroConfig;
use crate::error::Result;
use crate::tasks::{Task, TaskId, TaskService, TaskStatus};

/// A task stuck in progress past the configured threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bottleneck {
    pub task_id: TaskId,
    pub title: String,
    pub in_progress_secs: i64,
    pub assigned_agent_id: Option<AgentId>,
}

/// Snapshot of a workflow's execution state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowProgress {
    pub workflow_id: TaskId,
    pub status: TaskStatus,
    pub progress_percentage: f32,
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub in_progress_tasks: usize,
    pub bottlenecks: Vec<Bottleneck>,
    pub estimated_completion: Option<DateTime<Utc>>,
    pub active_agents: usize,
    pub last_updated: DateTime<Utc>,
}

/// Progress reporter over the task service.
pub struct WorkflowMonitor {
    tasks: Arc<TaskService>,
    config: Arc<MaestroConfig>,
}

impl WorkflowMonitor {
    pub fn new(tasks: Arc<TaskService>, config: Arc<MaestroConfig>) -> Self {
        Self { tasks, config }
    }

    /// Build a progress snapshot for a workflow's whole subtask tree.
    pub async fn monitor_workflow(&self, workflow_id: &TaskId) -> Result<WorkflowProgress> {
        let root = self.tasks.get_task(workflow_id).await?;
        let subtasks = self.collect_subtasks(workflow_id).await?;
        let now = Utc::now();

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

        let threshold = Duration::seconds(self.config.bottleneck_threshold_secs);
        let bottlenecks = subtasks
            .iter()
            .filter(|t| t.status == TaskStatus::InProgress)
            .filter_map(|t| {
                let started = t.started_at?;
                let elapsed = now - started;
                (elapsed > threshold).then(|| Bottleneck {
                    task_id: t.id.clone(),
                    title: t.title.clone(),
                    in_progress_secs: elapsed.num_seconds(),
                    assigned_agent_id: t.assigned_agent_id.clone(),
                })
            })
            .collect();

        // remaining estimated work, summed over open tasks that carry an estimate
        let remaining: Option<Duration> = subtasks
            .iter()
            .filter(|t| !t.status.is_terminal())
            .filter_map(|t| t.estimated_duration)
            .reduce(|a, b| a + b);
        let estimated_completion = remaining.map(|d| now + d);

        let active_agents = subtasks
            .iter()
            .filter(|t| t.status == TaskStatus::InProgress)
            .filter_map(|t| t.assigned_agent_id.clone())
            .collect::<HashSet<_>>()
            .len();

        Ok(WorkflowProgress {
            workflow_id: root.id,
            status: root.status,
            progress_percentage,
            total_tasks: total,
            completed_tasks: completed,
            failed_tasks: failed,
            in_progress_tasks: in_progress,
            bottlenecks,
            estimated_completion,
            active_agents,
            last_updated: now,
        })
    }

    /// All subtasks of a root, recursively, visited-set guarded.
    pub async fn collect_subtasks(&self, root_id: &TaskId) -> Result<Vec<Task>> {
        let mut visited = HashSet::new();
        visited.insert(root_id.clone());
        let mut collected = Vec::new();
        self.collect_inner(root_id.clone(), &mut visited, &mut collected)
            .await?;
        Ok(collected)
    }

    fn collect_inner<'a>(
        &'a self,
        task_id: TaskId,
        visited: &'a mut HashSet<TaskId>,
        collected: &'a mut Vec<Task>,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            let task = self.tasks.get_task(&task_id).await?;
            for child_id in task.subtask_ids {
                if !visited.insert(child_id.clone()) {
                    continue;
                }
                self.collect_inner(child_id.clone(), visited, collected)
                    .await?;
                collected.push(self.tasks.get_task(&child_id).await?);
            }
            Ok(())
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{AgentService, AgentSpec};
    use crate::memory::EpisodeJournal;
    use crate::storage::InMemoryStore;
    use crate::tasks::{SubtaskSpec, TaskSpec};
    use std::collections::HashMap;

    fn setup() -> (WorkflowMonitor, Arc<TaskService>, Arc<AgentService>) {
        let store = Arc::new(InMemoryStore::new());
        let sink = Arc::new(EpisodeJournal::new(store.clone()));
        let config = Arc::new(MaestroConfig::default());
        let agents = Arc::new(AgentService::new(
            store.clone(),
            store.clone(),
            sink,
            config.clone(),
        ));
        let tasks = Arc::new(TaskService::new(
            store.clone(),
            store,
            agents.clone(),
            config.clone(),
        ));
        (
            WorkflowMonitor::new(tasks.clone(), config),
            tasks,
            agents,
        )
    }

    #[tokio::test]
    async fn test_progress_snapshot() {
        let (monitor, tasks, agents) = setup();
        let agent = agents
            .create_agent(AgentSpec {
                name: "worker".to_string(),
                specialization: "general".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let root = tasks
            .create_task(TaskSpec {
                title: "workflow".to_string(),
                description: "d".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let specs: Vec<SubtaskSpec> = (0..3)
            .map(|i| SubtaskSpec {
                name: format!("part_{i}"),
                description: "d".to_string(),
                ..Default::default()
            })
            .collect();
        let subtasks = tasks.decompose_task(&root.id, &specs).await.unwrap();

        tasks.assign_task(&subtasks[0].id, &agent.id).await.unwrap();
        tasks.start_task(&subtasks[0].id).await.unwrap();
        tasks
            .complete_task(&subtasks[0].id, HashMap::new())
            .await
            .unwrap();
        tasks.assign_task(&subtasks[1].id, &agent.id).await.unwrap();
        tasks.start_task(&subtasks[1].id).await.unwrap();

        let progress = monitor.monitor_workflow(&root.id).await.unwrap();
        assert_eq!(progress.total_tasks, 3);
        assert_eq!(progress.completed_tasks, 1);
        assert_eq!(progress.in_progress_tasks, 1);
        assert!((progress.progress_percentage - 100.0 / 3.0).abs() < 0.01);
        assert_eq!(progress.active_agents, 1);
        // freshly started task is not a bottleneck at the default threshold
        assert!(progress.bottlenecks.is_empty());
    }

    #[tokio::test]
    async fn test_nested_subtask_collection() {
        let (monitor, tasks, _) = setup();
        let root = tasks
            .create_task(TaskSpec {
                title: "root".to_string(),
                description: "d".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let mid = tasks
            .create_task(TaskSpec {
                title: "mid".to_string(),
                description: "d".to_string(),
                parent_task_id: Some(root.id.clone()),
                ..Default::default()
            })
            .await
            .unwrap();
        tasks
            .create_task(TaskSpec {
                title: "leaf".to_string(),
                description: "d".to_string(),
                parent_task_id: Some(mid.id.clone()),
                ..Default::default()
            })
            .await
            .unwrap();

        let collected = monitor.collect_subtasks(&root.id).await.unwrap();
        assert_eq!(collected.len(), 2);
    }
}
