//! Task decomposition planning and recursive decomposition.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use tracing::info;

use crate::error::Result;
use crate::tasks::{SubtaskSpec, Task, TaskService};

use super::analysis::ComplexityAnalysis;

/// Sequential phases, chained finish-to-start
const SEQUENTIAL_PHASES: &[&str] = &["planning", "execution", "review", "finalization"];

/// How a task is broken into subtasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecompositionStrategy {
    Sequential,
    Parallel,
    Hierarchical,
    Hybrid,
}

impl fmt::Display for DecompositionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Sequential => "sequential",
            Self::Parallel => "parallel",
            Self::Hierarchical => "hierarchical",
            Self::Hybrid => "hybrid",
        };
        write!(f, "{s}")
    }
}

/// A concrete plan for decomposing one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecompositionPlan {
    pub strategy: DecompositionStrategy,
    pub subtask_specs: Vec<SubtaskSpec>,
    pub coordination_required: bool,
    pub estimated_duration_secs: i64,
}

/// Build a decomposition plan for a task from its analysis.
///
/// Sequential plans chain the phase subtasks finish-to-start; parallel plans
/// emit independent components; hierarchical and hybrid plans emit one
/// subtask per required department, tagged with the department so assignment
/// can route it to the right head.
pub fn build_plan(task: &Task, analysis: &ComplexityAnalysis) -> DecompositionPlan {
    let total_secs = task
        .estimated_duration
        .map(|d| d.num_seconds())
        .unwrap_or(3600);
    let mut specs = Vec::new();

    match analysis.recommended_strategy {
        DecompositionStrategy::Sequential => {
            let phases = &SEQUENTIAL_PHASES[..SEQUENTIAL_PHASES
                .len()
                .min(analysis.estimated_subtasks)];
            for (i, phase) in phases.iter().enumerate() {
                let mut spec = SubtaskSpec {
                    name: format!("{}_{phase}", task.title),
                    description: format!("{phase} phase for: {}", task.description),
                    priority: task.priority,
                    ..Default::default()
                };
                spec.context
                    .insert("task_type".to_string(), json!(format!("{phase}_task")));
                spec.context.insert("sequence_order".to_string(), json!(i));
                if i > 0 {
                    spec.depends_on = vec![format!("{}_{}", task.title, phases[i - 1])];
                }
                specs.push(spec);
            }
        }
        DecompositionStrategy::Parallel => {
            for i in 1..=analysis.estimated_subtasks {
                let mut spec = SubtaskSpec {
                    name: format!("{}_component_{i}", task.title),
                    description: format!("Component {i} of: {}", task.description),
                    priority: task.priority,
                    ..Default::default()
                };
                spec.context
                    .insert("task_type".to_string(), json!("component_task"));
                spec.context
                    .insert("parallel_group".to_string(), json!("main"));
                specs.push(spec);
            }
        }
        DecompositionStrategy::Hierarchical | DecompositionStrategy::Hybrid => {
            for dept in &analysis.required_departments {
                let mut spec = SubtaskSpec {
                    name: format!("{}_{dept}", task.title),
                    description: format!("{dept} work for: {}", task.description),
                    priority: task.priority,
                    required_capabilities: vec![dept.clone()],
                    ..Default::default()
                };
                spec.context
                    .insert("task_type".to_string(), json!(format!("{dept}_task")));
                spec.context.insert("department".to_string(), json!(dept));
                specs.push(spec);
            }
        }
    }

    // parent estimate spread evenly across the subtasks
    let share = total_secs / specs.len().max(1) as i64;
    for spec in &mut specs {
        spec.estimated_duration_secs = Some(share);
    }

    DecompositionPlan {
        strategy: analysis.recommended_strategy,
        subtask_specs: specs,
        coordination_required: analysis.requires_coordination,
        estimated_duration_secs: total_secs,
    }
}

/// Whether a task warrants further decomposition. Depth is the only hard
/// bound below the first level; the task-type and length checks are a cheap
/// first-pass heuristic.
pub fn should_decompose(task: &Task, max_depth: u32) -> bool {
    let task_type = task
        .context
        .get("task_type")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    task.delegation_level < max_depth
        && matches!(task_type, "workflow" | "complex_task")
        && task.description.len() > 100
}

/// Recursively decompose a task into leaf subtasks, bounded by
/// `max_depth`. Returns the task itself when no decomposition applies.
pub async fn decompose_complex_task(
    tasks: &TaskService,
    task: &Task,
    max_depth: u32,
    analysis: &ComplexityAnalysis,
) -> Result<Vec<Task>> {
    decompose_inner(tasks, task.clone(), max_depth, analysis).await
}

fn decompose_inner<'a>(
    tasks: &'a TaskService,
    task: Task,
    max_depth: u32,
    analysis: &'a ComplexityAnalysis,
) -> BoxFuture<'a, Result<Vec<Task>>> {
    async move {
        if !should_decompose(&task, max_depth) {
            return Ok(vec![task]);
        }

        let plan = build_plan(&task, analysis);
        let subtasks = tasks.decompose_task(&task.id, &plan.subtask_specs).await?;

        let mut leaves = Vec::new();
        for subtask in subtasks {
            if subtask.delegation_level < max_depth {
                leaves.extend(decompose_inner(tasks, subtask, max_depth, analysis).await?);
            } else {
                leaves.push(subtask);
            }
        }

        info!(
            task_id = %task.id,
            leaves = leaves.len(),
            strategy = %plan.strategy,
            "decomposed complex task"
        );
        Ok(leaves)
    }
    .boxed()
}
