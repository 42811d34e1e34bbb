//! Optimal agent assignment.
//!
//! Candidates are filtered on capability and availability, then scored on a
//! weighted blend of capability match, inverse load, and historical success
//! rate. When no capable agent exists, the matching department head recruits
//! a specialist; if that also fails the task assignment is a `Capacity`
//! error.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::agents::{Agent, AgentId, AgentService, TaskRequirements};
use crate::config::MaestroConfig;
use crate::error::{MaestroError, Result};
use crate::tasks::{Task, TaskId, TaskService};

use super::analysis::GENERAL_DEPARTMENT;

/// Assignment engine over the agent and task services.
pub struct Assigner {
    agents: Arc<AgentService>,
    tasks: Arc<TaskService>,
    config: Arc<MaestroConfig>,
}

impl Assigner {
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

    /// Weighted suitability score for an agent against a capability set.
    ///
    /// score = w_cap * match_ratio + w_load * (1 - load/divisor)
    ///       + w_rate * success_rate
    pub fn score(&self, agent: &Agent, required: &[String]) -> f32 {
        let match_ratio = if required.is_empty() {
            1.0
        } else {
            let matched = required.iter().filter(|c| agent.has_capability(c)).count();
            matched as f32 / required.len() as f32
        };
        let load_factor =
            (1.0 - agent.current_load as f32 / self.config.load_divisor).max(0.0);

        let w = self.config.assignment;
        w.capability * match_ratio + w.load * load_factor + w.success_rate * agent.success_rate()
    }

    /// Pick the best candidate. Ties break toward the first-encountered
    /// candidate, so a stable input order gives deterministic selection.
    pub fn select_optimal<'a>(&self, task: &Task, candidates: &'a [Agent]) -> Option<&'a Agent> {
        let mut best: Option<(&Agent, f32)> = None;
        for agent in candidates {
            if !agent.is_available() || !agent.has_all_capabilities(&task.required_capabilities) {
                continue;
            }
            let score = self.score(agent, &task.required_capabilities);
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((agent, score)),
            }
        }
        best.map(|(agent, _)| agent)
    }

    /// Assign each task to its optimal agent, recruiting through department
    /// heads when no capable agent exists. Candidate records are re-read
    /// between assignments so workload changes feed later scores.
    pub async fn assign_optimal_agents(
        &self,
        open_tasks: &[Task],
    ) -> Result<Vec<(TaskId, AgentId)>> {
        let mut assignments = Vec::with_capacity(open_tasks.len());

        for task in open_tasks {
            let candidates = self.available_candidates().await?;
            let chosen = match self.select_optimal(task, &candidates) {
                Some(agent) => agent.id.clone(),
                None => self.recruit_for(task).await?,
            };

            self.tasks.assign_task(&task.id, &chosen).await?;
            debug!(task_id = %task.id, agent_id = %chosen, "assigned optimal agent");
            assignments.push((task.id.clone(), chosen));
        }

        info!(count = assignments.len(), "created task assignments");
        Ok(assignments)
    }

    async fn available_candidates(&self) -> Result<Vec<Agent>> {
        let mut agents: Vec<Agent> = self
            .agents
            .list_agents()
            .await?
            .into_iter()
            .filter(|a| a.is_available())
            .collect();
        // deterministic candidate order for tie-breaking
        agents.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(agents)
    }

    /// Recruit a specialist for a task through its department head.
    async fn recruit_for(&self, task: &Task) -> Result<AgentId> {
        let department = task
            .context
            .get("department")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| task.required_capabilities.first().cloned())
            .unwrap_or_else(|| GENERAL_DEPARTMENT.to_string());

        let head = self
            .agents
            .find_department_head(&department)
            .await?
            .ok_or_else(|| {
                warn!(task_id = %task.id, department, "no capable agent and no department head");
                MaestroError::capacity(format!(
                    "no capable agent for task {} and no {department} department head to recruit",
                    task.id
                ))
            })?;

        let requirements = TaskRequirements {
            required_capabilities: task.required_capabilities.clone(),
            complexity: task
                .context
                .get("complexity")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            domain: Some(department.clone()),
        };
        let specialist = self
            .agents
            .recruit_subordinate(&head.id, &department, &requirements)
            .await?;
        Ok(specialist.id)
    }
}
