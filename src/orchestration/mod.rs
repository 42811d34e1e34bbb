//! Hierarchical workflow orchestration.
//!
//! The orchestrator is the top of the agent hierarchy: a conductor agent owns
//! each workflow, department heads own domain subtrees, and specialists are
//! recruited on demand for leaf work.
//!
//! # Features
//!
//! - Complexity analysis mapping descriptions onto departments and strategy
//! - Recursive task decomposition bounded by delegation depth
//! - Weighted optimal-agent assignment with recruitment fallback
//! - Bottom-up result compilation with conflict resolution
//! - Failure classification and five-strategy recovery
//! - Workflow progress monitoring and bottleneck detection

pub mod analysis;
pub mod assignment;
pub mod compilation;
pub mod decomposition;
pub mod monitoring;
pub mod recovery;

pub use analysis::{analyze, Complexity, ComplexityAnalysis, GENERAL_DEPARTMENT};
pub use assignment::Assigner;
pub use compilation::{
    assess_quality, compile_hierarchical_results, CompiledWorkflow, LevelResult, TaskResult,
};
pub use decomposition::{
    build_plan, decompose_complex_task, should_decompose, DecompositionPlan,
    DecompositionStrategy,
};
pub use monitoring::{Bottleneck, WorkflowMonitor, WorkflowProgress};
pub use recovery::{
    classify_failure, select_strategy, FailureKind, RecoveryEngine, RecoveryReport,
    RecoveryStrategy,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::agents::{Agent, AgentId, AgentKindTag, AgentService, AgentSpec};
use crate::config::MaestroConfig;
use crate::error::Result;
use crate::memory::{EpisodeRecord, ExperienceSink};
use crate::tasks::{TaskId, TaskService, TaskSpec, TaskStatus};

/// Request to orchestrate a new workflow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowRequest {
    pub description: String,
    /// Complexity label: low, medium, high, or extreme
    pub complexity: Option<String>,
    pub required_expertise: Vec<String>,
    pub deadline: Option<DateTime<Utc>>,
    pub constraints: HashMap<String, Value>,
}

/// Handle for a running workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub workflow_id: TaskId,
    pub conductor_id: AgentId,
    pub analysis: ComplexityAnalysis,
    pub plan: DecompositionPlan,
    pub assignments: Vec<(TaskId, AgentId)>,
    pub started_at: DateTime<Utc>,
}

/// Top-level orchestration facade.
pub struct Orchestrator {
    agents: Arc<AgentService>,
    tasks: Arc<TaskService>,
    sink: Arc<dyn ExperienceSink>,
    config: Arc<MaestroConfig>,
    assigner: Assigner,
    monitor: WorkflowMonitor,
    recovery: RecoveryEngine,
    active: RwLock<HashMap<TaskId, WorkflowExecution>>,
}

impl Orchestrator {
    pub fn new(
        agents: Arc<AgentService>,
        tasks: Arc<TaskService>,
        sink: Arc<dyn ExperienceSink>,
        config: Arc<MaestroConfig>,
    ) -> Self {
        Self {
            assigner: Assigner::new(agents.clone(), tasks.clone(), config.clone()),
            monitor: WorkflowMonitor::new(tasks.clone(), config.clone()),
            recovery: RecoveryEngine::new(agents.clone(), tasks.clone(), config.clone()),
            config,
            agents,
            tasks,
            sink,
            active: RwLock::new(HashMap::new()),
        }
    }

    /// Orchestrate a workflow end to end: analyze it, decompose it under a
    /// root task owned by the conductor, provision department heads for the
    /// departments the analysis names, and assign the subtasks.
    pub async fn orchestrate_workflow(&self, request: WorkflowRequest) -> Result<WorkflowExecution> {
        let conductor = self.get_or_create_conductor().await?;

        let complexity = request
            .complexity
            .as_deref()
            .map(Complexity::from_label)
            .unwrap_or_default();
        let analysis = analyze(
            &request.description,
            complexity,
            &request.required_expertise,
            self.config.complexity_threshold,
        );
        info!(
            %complexity,
            departments = analysis.required_departments.len(),
            strategy = %analysis.recommended_strategy,
            "analyzed workflow"
        );

        let title = format!(
            "workflow_{}",
            &Uuid::new_v4().simple().to_string()[..8]
        );
        let mut context = HashMap::from([
            ("task_type".to_string(), json!("workflow")),
            ("complexity".to_string(), json!(complexity.to_string())),
        ]);
        context.extend(request.constraints.clone());
        let root = self
            .tasks
            .create_task(TaskSpec {
                title,
                description: request.description.clone(),
                priority: complexity.priority(),
                deadline: request.deadline,
                context,
                ..Default::default()
            })
            .await?;
        self.tasks.assign_task(&root.id, &conductor.id).await?;

        let plan = build_plan(&root, &analysis);
        let heads = self
            .provision_department_heads(&conductor.id, &analysis.required_departments)
            .await?;

        let subtasks = self.tasks.decompose_task(&root.id, &plan.subtask_specs).await?;

        // department-tagged subtasks route to their heads; the rest go
        // through optimal assignment. Parked subtasks wait for their
        // dependencies and are dispatched later.
        let mut assignments = Vec::new();
        let mut open = Vec::new();
        for subtask in subtasks {
            if !subtask.status.can_transition_to(TaskStatus::Assigned) {
                continue;
            }
            let department = subtask
                .context
                .get("department")
                .and_then(|v| v.as_str())
                .and_then(|d| heads.iter().find(|h| h.specialization == d));
            match department {
                Some(head) => {
                    self.tasks.assign_task(&subtask.id, &head.id).await?;
                    assignments.push((subtask.id.clone(), head.id.clone()));
                }
                None => open.push(subtask),
            }
        }
        assignments.extend(self.assigner.assign_optimal_agents(&open).await?);

        self.tasks.start_task(&root.id).await?;

        self.sink
            .process_experience(
                EpisodeRecord::new(
                    conductor.id.clone(),
                    format!(
                        "orchestrated workflow '{}' across {} departments",
                        root.title,
                        analysis.required_departments.len()
                    ),
                    "initiated",
                    0.7,
                )
                .with_participants(heads.iter().map(|h| h.id.clone()).collect()),
            )
            .await?;

        let execution = WorkflowExecution {
            workflow_id: root.id.clone(),
            conductor_id: conductor.id,
            analysis,
            plan,
            assignments,
            started_at: Utc::now(),
        };
        self.active
            .write()
            .await
            .insert(root.id.clone(), execution.clone());

        info!(workflow_id = %root.id, "workflow orchestrated");
        Ok(execution)
    }

    /// Assign every ready, unassigned task. Called after completions unblock
    /// dependent tasks.
    pub async fn dispatch_ready_tasks(&self) -> Result<Vec<(TaskId, AgentId)>> {
        let open: Vec<_> = self
            .tasks
            .get_ready_tasks()
            .await?
            .into_iter()
            .filter(|t| t.assigned_agent_id.is_none())
            .collect();
        if open.is_empty() {
            return Ok(Vec::new());
        }
        self.assigner.assign_optimal_agents(&open).await
    }

    /// Progress snapshot for a workflow
    pub async fn monitor_workflow(&self, workflow_id: &TaskId) -> Result<WorkflowProgress> {
        self.monitor.monitor_workflow(workflow_id).await
    }

    /// Classify and recover from a task failure
    pub async fn handle_task_failure(
        &self,
        task_id: &TaskId,
        error_context: &str,
    ) -> Result<RecoveryReport> {
        self.recovery.handle_task_failure(task_id, error_context).await
    }

    /// Compile the completed results of a workflow tree bottom-up.
    pub async fn compile_results(&self, workflow_id: &TaskId) -> Result<CompiledWorkflow> {
        let root = self.tasks.get_task(workflow_id).await?;
        let mut tree = self.monitor.collect_subtasks(workflow_id).await?;
        tree.push(root);

        let results: Vec<TaskResult> = tree
            .into_iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .map(|t| TaskResult {
                task_id: t.id,
                subject: t.title,
                delegation_level: t.delegation_level,
                agent_id: t.assigned_agent_id,
                output: t.output_data,
            })
            .collect();

        Ok(compile_hierarchical_results(workflow_id.clone(), results))
    }

    /// Cancel a workflow and its whole task tree
    pub async fn cancel_workflow(&self, workflow_id: &TaskId) -> Result<usize> {
        let cancelled = self.tasks.cancel_task_tree(workflow_id).await?;
        self.active.write().await.remove(workflow_id);
        info!(workflow_id = %workflow_id, cancelled, "cancelled workflow");
        Ok(cancelled)
    }

    /// Currently tracked workflow executions
    pub async fn active_workflows(&self) -> Vec<WorkflowExecution> {
        self.active.read().await.values().cloned().collect()
    }

    /// The conductor agent, created with its standard profile on first use.
    async fn get_or_create_conductor(&self) -> Result<Agent> {
        if let Some(conductor) = self.agents.get_conductor().await? {
            return Ok(conductor);
        }

        debug!("no conductor found, creating one");
        self.agents
            .create_agent(AgentSpec {
                name: "conductor_master".to_string(),
                kind: Some(AgentKindTag::Conductor),
                specialization: "workflow_orchestration".to_string(),
                description: "Master conductor coordinating all workflows".to_string(),
                capabilities: vec![
                    "task_decomposition".to_string(),
                    "agent_management".to_string(),
                    "workflow_coordination".to_string(),
                    "result_synthesis".to_string(),
                ],
                personality_traits: HashMap::from([
                    ("leadership".to_string(), 0.9),
                    ("analytical_thinking".to_string(), 0.9),
                    ("coordination".to_string(), 0.95),
                    ("decision_making".to_string(), 0.9),
                ]),
                core_memories: vec![
                    "I am the master conductor, responsible for orchestrating complex workflows."
                        .to_string(),
                    "My strength lies in breaking down complexity into manageable parts."
                        .to_string(),
                    "I coordinate department heads and ensure quality outcomes.".to_string(),
                    "Every workflow I conduct teaches me about effective delegation.".to_string(),
                ],
                ..Default::default()
            })
            .await
    }

    /// Ensure a department head exists for each required department,
    /// creating any missing ones under the conductor.
    async fn provision_department_heads(
        &self,
        conductor_id: &AgentId,
        departments: &[String],
    ) -> Result<Vec<Agent>> {
        let mut heads = Vec::with_capacity(departments.len());
        for dept in departments {
            if let Some(existing) = self.agents.find_department_head(dept).await? {
                heads.push(existing);
                continue;
            }

            debug!(department = %dept, "provisioning department head");
            let head = self
                .agents
                .create_agent(AgentSpec {
                    name: format!("head_{dept}"),
                    kind: Some(AgentKindTag::DepartmentHead),
                    specialization: dept.clone(),
                    description: format!("Department head for {dept}"),
                    parent_agent_id: Some(conductor_id.clone()),
                    capabilities: vec![
                        dept.clone(),
                        "management".to_string(),
                        "coordination".to_string(),
                        "quality_assessment".to_string(),
                    ],
                    personality_traits: HashMap::from([
                        ("leadership".to_string(), 0.8),
                        ("expertise".to_string(), 0.9),
                        (format!("{dept}_knowledge"), 0.95),
                        ("delegation".to_string(), 0.8),
                    ]),
                    core_memories: vec![
                        format!("I lead the {dept} department with deep domain expertise."),
                        format!("My team delivers excellent {dept} outcomes."),
                        "I recruit specialists when the work demands skills my team lacks."
                            .to_string(),
                        "I answer to the conductor for my department's results.".to_string(),
                    ],
                })
                .await?;
            heads.push(head);
        }
        Ok(heads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::EpisodeJournal;
    use crate::storage::InMemoryStore;

    fn orchestrator() -> (Orchestrator, Arc<AgentService>, Arc<TaskService>) {
        let store = Arc::new(InMemoryStore::new());
        let sink = Arc::new(EpisodeJournal::new(store.clone()));
        let config = Arc::new(MaestroConfig::default());
        let agents = Arc::new(AgentService::new(
            store.clone(),
            store.clone(),
            sink.clone(),
            config.clone(),
        ));
        let tasks = Arc::new(TaskService::new(
            store.clone(),
            store,
            agents.clone(),
            config.clone(),
        ));
        (
            Orchestrator::new(agents.clone(), tasks.clone(), sink, config),
            agents,
            tasks,
        )
    }

    fn request(description: &str, complexity: &str) -> WorkflowRequest {
        WorkflowRequest {
            description: description.to_string(),
            complexity: Some(complexity.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_orchestrate_provisions_hierarchy() {
        let (orch, agents, _) = orchestrator();
        let execution = orch
            .orchestrate_workflow(request(
                "Research the market and write documentation for the findings",
                "high",
            ))
            .await
            .unwrap();

        // conductor exists and owns the workflow
        let conductor = agents.get_conductor().await.unwrap().unwrap();
        assert_eq!(execution.conductor_id, conductor.id);
        assert_eq!(conductor.name, "conductor_master");

        // one head per detected department, parented to the conductor
        let heads = agents.get_department_heads().await.unwrap();
        assert_eq!(heads.len(), 2);
        assert!(heads
            .iter()
            .all(|h| h.parent_agent_id == Some(conductor.id.clone())));

        // high complexity maps to hierarchical decomposition with one
        // subtask per department, all assigned to their heads
        assert_eq!(
            execution.plan.strategy,
            DecompositionStrategy::Hierarchical
        );
        assert_eq!(execution.assignments.len(), 2);
    }

    #[tokio::test]
    async fn test_conductor_is_reused() {
        let (orch, agents, _) = orchestrator();
        orch.orchestrate_workflow(request("research task one", "high"))
            .await
            .unwrap();
        orch.orchestrate_workflow(request("research task two", "high"))
            .await
            .unwrap();

        let conductors: Vec<_> = agents
            .list_agents()
            .await
            .unwrap()
            .into_iter()
            .filter(|a| a.kind.tag() == AgentKindTag::Conductor)
            .collect();
        assert_eq!(conductors.len(), 1);

        // department heads are also reused across workflows
        assert_eq!(agents.get_department_heads().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sequential_workflow_dispatch() {
        let (orch, _, tasks) = orchestrator();
        let execution = orch
            .orchestrate_workflow(request("simple short job", "low"))
            .await
            .unwrap();

        // low complexity gives sequential phases; only the first is
        // assignable, the rest wait on their predecessor
        assert_eq!(execution.plan.strategy, DecompositionStrategy::Sequential);
        assert_eq!(execution.assignments.len(), 1);

        let (first_id, _) = &execution.assignments[0];
        tasks.start_task(first_id).await.unwrap();
        tasks
            .complete_task(first_id, HashMap::new())
            .await
            .unwrap();

        // completing the first phase unblocks exactly one successor
        let dispatched = orch.dispatch_ready_tasks().await.unwrap();
        assert_eq!(dispatched.len(), 1);
    }

    #[tokio::test]
    async fn test_compile_results_bottom_up() {
        let (orch, _, tasks) = orchestrator();
        let execution = orch
            .orchestrate_workflow(request("research the topic", "high"))
            .await
            .unwrap();

        for (task_id, _) in &execution.assignments {
            tasks.start_task(task_id).await.unwrap();
            tasks
                .complete_task(
                    task_id,
                    HashMap::from([("result".to_string(), json!("findings"))]),
                )
                .await
                .unwrap();
        }
        tasks
            .complete_task(&execution.workflow_id, HashMap::new())
            .await
            .unwrap();

        let compiled = orch.compile_results(&execution.workflow_id).await.unwrap();
        assert_eq!(compiled.status, "completed");
        // level 1 subtask results feed the level 0 root synthesis
        assert_eq!(compiled.levels.len(), 2);
        assert_eq!(compiled.levels[0].level, 1);
        assert_eq!(compiled.final_result["level"], json!(0));
        assert_eq!(
            compiled.final_result["parent_context"]["level"],
            json!(1)
        );
    }

    #[tokio::test]
    async fn test_cancel_workflow() {
        let (orch, _, tasks) = orchestrator();
        let execution = orch
            .orchestrate_workflow(request("research the topic", "high"))
            .await
            .unwrap();
        assert_eq!(orch.active_workflows().await.len(), 1);

        let cancelled = orch.cancel_workflow(&execution.workflow_id).await.unwrap();
        assert!(cancelled >= 2);
        assert!(orch.active_workflows().await.is_empty());

        let root = tasks.get_task(&execution.workflow_id).await.unwrap();
        assert_eq!(root.status, TaskStatus::Cancelled);
    }
}
