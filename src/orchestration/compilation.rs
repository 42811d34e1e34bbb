//! Bottom-up compilation of hierarchical task results.
//!
//! Results are grouped by delegation level and compiled strictly from the
//! deepest level up to level 0: quality assessment, then conflict resolution
//! (highest quality wins per subject), then synthesis with the level above's
//! output threaded in as parent context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

use crate::agents::AgentId;
use crate::tasks::TaskId;

/// One task's contribution to compilation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: TaskId,
    /// Subject label used for conflict grouping (usually the task title)
    pub subject: String,
    pub delegation_level: u32,
    pub agent_id: Option<AgentId>,
    pub output: HashMap<String, Value>,
}

/// Synthesized output of one delegation level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelResult {
    pub level: u32,
    pub result_count: usize,
    pub mean_quality: f32,
    pub synthesized: Value,
}

/// Final compiled workflow output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompiledWorkflow {
    pub workflow_id: TaskId,
    pub status: String,
    pub final_result: Value,
    pub levels: Vec<LevelResult>,
    pub compiled_at: DateTime<Utc>,
}

/// Heuristic quality score for a result payload: starts at a neutral base,
/// rewarded for having content and a summary/result field, penalized for a
/// recorded error.
pub fn assess_quality(result: &TaskResult) -> f32 {
    let mut score: f32 = 0.5;
    if !result.output.is_empty() {
        score += 0.2;
    }
    if result.output.contains_key("result") || result.output.contains_key("summary") {
        score += 0.2;
    }
    if result.output.contains_key("error_message") {
        score -= 0.3;
    }
    score.clamp(0.0, 1.0)
}

/// Resolve conflicting results for the same subject: the highest-quality
/// result wins; ties keep the first encountered.
fn resolve_conflicts(results: Vec<(TaskResult, f32)>) -> Vec<(TaskResult, f32)> {
    let mut best_by_subject: Vec<(TaskResult, f32)> = Vec::new();
    for (result, quality) in results {
        match best_by_subject
            .iter_mut()
            .find(|(r, _)| r.subject == result.subject)
        {
            Some(existing) if quality > existing.1 => *existing = (result, quality),
            Some(_) => {}
            None => best_by_subject.push((result, quality)),
        }
    }
    best_by_subject
}

/// Compile hierarchical results bottom-up into one report.
pub fn compile_hierarchical_results(
    workflow_id: TaskId,
    task_results: Vec<TaskResult>,
) -> CompiledWorkflow {
    let mut level_groups: BTreeMap<u32, Vec<TaskResult>> = BTreeMap::new();
    for result in task_results {
        level_groups
            .entry(result.delegation_level)
            .or_default()
            .push(result);
    }

    let max_level = level_groups.keys().next_back().copied().unwrap_or(0);
    let mut levels: Vec<LevelResult> = Vec::new();
    let mut parent_context: Option<Value> = None;

    // deepest level first; each level sees the synthesis of the one below
    for level in (0..=max_level).rev() {
        let Some(results) = level_groups.remove(&level) else {
            continue;
        };

        let scored: Vec<(TaskResult, f32)> = results
            .into_iter()
            .map(|r| {
                let q = assess_quality(&r);
                (r, q)
            })
            .collect();
        let resolved = resolve_conflicts(scored);

        let result_count = resolved.len();
        let mean_quality =
            resolved.iter().map(|(_, q)| q).sum::<f32>() / result_count.max(1) as f32;

        let entries: Vec<Value> = resolved
            .iter()
            .map(|(r, q)| {
                json!({
                    "task_id": r.task_id.to_string(),
                    "subject": r.subject,
                    "agent_id": r.agent_id.as_ref().map(|a| a.to_string()),
                    "quality": q,
                    "output": r.output,
                })
            })
            .collect();

        let synthesized = json!({
            "level": level,
            "results": entries,
            "parent_context": parent_context,
        });
        debug!(level, result_count, mean_quality, "synthesized level");

        parent_context = Some(synthesized.clone());
        levels.push(LevelResult {
            level,
            result_count,
            mean_quality,
            synthesized,
        });
    }

    let final_result = levels
        .iter()
        .find(|l| l.level == 0)
        .map(|l| l.synthesized.clone())
        .unwrap_or_else(|| json!({}));

    info!(workflow_id = %workflow_id, levels = levels.len(), "compiled workflow results");
    CompiledWorkflow {
        workflow_id,
        status: "completed".to_string(),
        final_result,
        levels,
        compiled_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(subject: &str, level: u32, output: HashMap<String, Value>) -> TaskResult {
        TaskResult {
            task_id: TaskId::new(),
            subject: subject.to_string(),
            delegation_level: level,
            agent_id: None,
            output,
        }
    }

    #[test]
    fn test_quality_heuristics() {
        let empty = result("a", 0, HashMap::new());
        assert!((assess_quality(&empty) - 0.5).abs() < 1e-6);

        let good = result(
            "a",
            0,
            HashMap::from([("summary".to_string(), json!("done"))]),
        );
        assert!((assess_quality(&good) - 0.9).abs() < 1e-6);

        let failed = result(
            "a",
            0,
            HashMap::from([("error_message".to_string(), json!("boom"))]),
        );
        assert!((assess_quality(&failed) - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_conflict_resolution_highest_quality_wins() {
        let weak = result("report", 1, HashMap::new());
        let strong = result(
            "report",
            1,
            HashMap::from([("result".to_string(), json!("final"))]),
        );
        let strong_id = strong.task_id.clone();

        let compiled = compile_hierarchical_results(TaskId::new(), vec![weak, strong]);
        let level = &compiled.levels[0];
        assert_eq!(level.result_count, 1);
        assert_eq!(
            level.synthesized["results"][0]["task_id"],
            json!(strong_id.to_string())
        );
    }

    #[test]
    fn test_bottom_up_context_threading() {
        let leaf = result(
            "leaf",
            2,
            HashMap::from([("result".to_string(), json!("leaf output"))]),
        );
        let mid = result("mid", 1, HashMap::new());
        let root = result("root", 0, HashMap::new());

        let compiled = compile_hierarchical_results(TaskId::new(), vec![root, leaf, mid]);

        // levels are produced deepest-first
        let produced: Vec<u32> = compiled.levels.iter().map(|l| l.level).collect();
        assert_eq!(produced, vec![2, 1, 0]);

        // each level carries the deeper level as parent context
        let level1 = &compiled.levels[1].synthesized;
        assert_eq!(level1["parent_context"]["level"], json!(2));
        let level0 = &compiled.levels[2].synthesized;
        assert_eq!(level0["parent_context"]["level"], json!(1));
        assert_eq!(compiled.final_result["level"], json!(0));
    }

    #[test]
    fn test_empty_results() {
        let compiled = compile_hierarchical_results(TaskId::new(), vec![]);
        assert!(compiled.levels.is_empty());
        assert_eq!(compiled.final_result, json!({}));
    }
}
