//! End-to-end workflow tests: orchestration through the full agent
//! hierarchy, from analysis to compiled results, including failure
//! recovery and cancellation.

use maestro::agents::{AgentKindTag, AgentService};
use maestro::config::MaestroConfig;
use maestro::memory::{EpisodeJournal, ExperienceSink};
use maestro::orchestration::{
    DecompositionStrategy, Orchestrator, RecoveryStrategy, WorkflowRequest,
};
use maestro::storage::InMemoryStore;
use maestro::tasks::{TaskService, TaskStatus};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

struct Harness {
    orchestrator: Orchestrator,
    agents: Arc<AgentService>,
    tasks: Arc<TaskService>,
    journal: Arc<EpisodeJournal>,
}

fn harness() -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let journal = Arc::new(EpisodeJournal::new(store.clone()));
    let sink: Arc<dyn ExperienceSink> = journal.clone();
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
    Harness {
        orchestrator: Orchestrator::new(agents.clone(), tasks.clone(), sink, config),
        agents,
        tasks,
        journal,
    }
}

fn request(description: &str, complexity: &str) -> WorkflowRequest {
    WorkflowRequest {
        description: description.to_string(),
        complexity: Some(complexity.to_string()),
        ..Default::default()
    }
}

// ============================================================================
// Full Pipeline Tests
// ============================================================================

#[tokio::test]
async fn test_hierarchical_workflow_end_to_end() {
    let h = harness();
    let execution = h
        .orchestrator
        .orchestrate_workflow(request(
            "Research competitor pricing, analyze the data, and write documentation",
            "high",
        ))
        .await
        .unwrap();

    // conductor at the top, one head per detected department below it
    let conductor = h.agents.get_conductor().await.unwrap().unwrap();
    let heads = h.agents.get_department_heads().await.unwrap();
    assert_eq!(execution.conductor_id, conductor.id);
    assert_eq!(heads.len(), 3);
    assert_eq!(
        execution.plan.strategy,
        DecompositionStrategy::Hierarchical
    );

    // freshly planned subtasks carry duration estimates for monitoring
    let progress = h
        .orchestrator
        .monitor_workflow(&execution.workflow_id)
        .await
        .unwrap();
    assert!(progress.estimated_completion.is_some());

    // every department subtask is assigned and executable
    assert_eq!(execution.assignments.len(), 3);
    for (task_id, agent_id) in &execution.assignments {
        let task = h.tasks.get_task(task_id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Assigned);
        assert_eq!(task.assigned_agent_id.as_ref(), Some(agent_id));
        assert_eq!(task.delegation_level, 1);

        h.tasks.start_task(task_id).await.unwrap();
        h.tasks
            .complete_task(
                task_id,
                HashMap::from([("result".to_string(), json!("department findings"))]),
            )
            .await
            .unwrap();
    }

    // all subtasks done, the root compiles bottom-up
    h.tasks
        .complete_task(&execution.workflow_id, HashMap::new())
        .await
        .unwrap();
    let compiled = h
        .orchestrator
        .compile_results(&execution.workflow_id)
        .await
        .unwrap();
    assert_eq!(compiled.levels.len(), 2);
    assert_eq!(compiled.levels[0].level, 1);
    assert_eq!(compiled.levels[0].result_count, 3);
    assert_eq!(compiled.final_result["parent_context"]["level"], json!(1));

    // the orchestration left an episode on the conductor
    let episodes = h.journal.episodes_for(&conductor.id).await;
    assert!(!episodes.is_empty());
    assert_eq!(episodes[0].outcome, "initiated");
}

#[tokio::test]
async fn test_sequential_workflow_runs_in_phase_order() {
    let h = harness();
    let execution = h
        .orchestrator
        .orchestrate_workflow(request("small chore", "low"))
        .await
        .unwrap();
    assert_eq!(execution.plan.strategy, DecompositionStrategy::Sequential);

    // only the first phase starts assignable; each completion unblocks
    // exactly the next phase
    let mut completed_titles = Vec::new();
    let mut frontier: Vec<_> = execution
        .assignments
        .iter()
        .map(|(t, _)| t.clone())
        .collect();
    assert_eq!(frontier.len(), 1);

    while let Some(task_id) = frontier.pop() {
        h.tasks.start_task(&task_id).await.unwrap();
        let done = h
            .tasks
            .complete_task(&task_id, HashMap::new())
            .await
            .unwrap();
        completed_titles.push(done.title);

        let next = h.orchestrator.dispatch_ready_tasks().await.unwrap();
        assert!(next.len() <= 1);
        frontier.extend(next.into_iter().map(|(t, _)| t));
    }

    let phases: Vec<&str> = completed_titles
        .iter()
        .map(|t| t.rsplit('_').next().unwrap())
        .collect();
    assert_eq!(phases, vec!["planning", "execution", "review"]);

    let progress = h
        .orchestrator
        .monitor_workflow(&execution.workflow_id)
        .await
        .unwrap();
    assert_eq!(progress.completed_tasks, progress.total_tasks);
    assert!((progress.progress_percentage - 100.0).abs() < f32::EPSILON);
}

// ============================================================================
// Failure Recovery Tests
// ============================================================================

#[tokio::test]
async fn test_transient_failure_retries_and_completes() {
    let h = harness();
    let execution = h
        .orchestrator
        .orchestrate_workflow(request("research the subject matter", "high"))
        .await
        .unwrap();
    let (task_id, _) = execution.assignments[0].clone();

    h.tasks.start_task(&task_id).await.unwrap();
    h.tasks
        .fail_task(&task_id, "connection timeout")
        .await
        .unwrap();

    let report = h
        .orchestrator
        .handle_task_failure(&task_id, "connection timeout")
        .await
        .unwrap();
    assert_eq!(report.strategy, RecoveryStrategy::Retry);

    // the retried task completes on the second attempt
    h.tasks.start_task(&task_id).await.unwrap();
    let done = h
        .tasks
        .complete_task(&task_id, HashMap::new())
        .await
        .unwrap();
    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(done.retry_count, 1);
}

#[tokio::test]
async fn test_fatal_failure_aborts_the_workflow_tree() {
    let h = harness();
    let execution = h
        .orchestrator
        .orchestrate_workflow(request("research the subject matter", "high"))
        .await
        .unwrap();
    let (task_id, _) = execution.assignments[0].clone();

    h.tasks.start_task(&task_id).await.unwrap();
    h.tasks.fail_task(&task_id, "hard crash").await.unwrap();

    let report = h
        .orchestrator
        .handle_task_failure(&task_id, "hard crash")
        .await
        .unwrap();
    assert_eq!(report.strategy, RecoveryStrategy::Abort);

    // the failure propagated up to the workflow root
    let root = h.tasks.get_task(&execution.workflow_id).await.unwrap();
    assert_eq!(root.status, TaskStatus::Failed);
}

// ============================================================================
// Cancellation and Agent Reuse Tests
// ============================================================================

#[tokio::test]
async fn test_cancellation_releases_agent_load() {
    let h = harness();
    let execution = h
        .orchestrator
        .orchestrate_workflow(request("research the subject matter", "high"))
        .await
        .unwrap();

    let (_, head_id) = execution.assignments[0].clone();
    assert!(h.agents.get_agent(&head_id).await.unwrap().current_load >= 1);

    h.orchestrator
        .cancel_workflow(&execution.workflow_id)
        .await
        .unwrap();

    assert_eq!(h.agents.get_agent(&head_id).await.unwrap().current_load, 0);
    for task in h.tasks.list_tasks().await.unwrap() {
        assert_eq!(task.status, TaskStatus::Cancelled);
    }
}

#[tokio::test]
async fn test_hierarchy_is_shared_across_workflows() {
    let h = harness();
    for _ in 0..3 {
        h.orchestrator
            .orchestrate_workflow(request("research the subject matter", "high"))
            .await
            .unwrap();
    }

    let conductors = h
        .agents
        .list_agents()
        .await
        .unwrap()
        .into_iter()
        .filter(|a| a.kind.tag() == AgentKindTag::Conductor)
        .count();
    assert_eq!(conductors, 1);
    assert_eq!(h.agents.get_department_heads().await.unwrap().len(), 1);
    assert_eq!(h.orchestrator.active_workflows().await.len(), 3);
}
