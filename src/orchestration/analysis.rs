//! Workflow complexity analysis.
//!
//! Maps a workflow description and expertise hints onto a complexity score,
//! the set of departments the work touches, and a recommended decomposition
//! strategy.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::tasks::TaskPriority;

use super::decomposition::DecompositionStrategy;

/// Department names paired with the description/expertise keywords that
/// activate them.
pub const DEPARTMENT_KEYWORDS: &[(&str, &[&str])] = &[
    ("software_development", &["programming", "coding", "development"]),
    ("data_analysis", &["analysis", "data", "statistics"]),
    ("research", &["research", "investigation", "study"]),
    ("creative", &["creative", "design", "artistic"]),
    ("technical_writing", &["writing", "documentation"]),
    ("project_management", &["management", "coordination"]),
    ("quality_assurance", &["testing", "quality", "validation"]),
];

/// Department used when no keyword matches
pub const GENERAL_DEPARTMENT: &str = "general_specialist";

/// Coarse complexity classification of a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Low,
    #[default]
    Medium,
    High,
    Extreme,
}

impl Complexity {
    /// Parse a complexity label, defaulting to Medium for unknown labels
    pub fn from_label(label: &str) -> Self {
        match label {
            "low" => Self::Low,
            "high" => Self::High,
            "extreme" => Self::Extreme,
            _ => Self::Medium,
        }
    }

    /// Numeric complexity score
    pub fn score(&self) -> f32 {
        match self {
            Self::Low => 0.3,
            Self::Medium => 0.6,
            Self::High => 0.8,
            Self::Extreme => 0.95,
        }
    }

    /// Priority of a workflow at this complexity
    pub fn priority(&self) -> TaskPriority {
        match self {
            Self::Low => TaskPriority::Low,
            Self::Medium => TaskPriority::Normal,
            Self::High => TaskPriority::High,
            Self::Extreme => TaskPriority::Critical,
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Extreme => "extreme",
        };
        write!(f, "{s}")
    }
}

/// Output of complexity analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplexityAnalysis {
    pub complexity: Complexity,
    pub score: f32,
    pub required_departments: Vec<String>,
    pub estimated_subtasks: usize,
    pub recommended_strategy: DecompositionStrategy,
    pub parallelization_potential: bool,
    pub requires_coordination: bool,
}

/// Analyze a workflow description against the department keyword table.
/// `hierarchical_threshold` is the score at which the recommendation moves
/// from parallel to hierarchical decomposition.
pub fn analyze(
    description: &str,
    complexity: Complexity,
    required_expertise: &[String],
    hierarchical_threshold: f32,
) -> ComplexityAnalysis {
    let score = complexity.score();
    let description_lower = description.to_lowercase();

    let mut required_departments: Vec<String> = DEPARTMENT_KEYWORDS
        .iter()
        .filter(|(_, keywords)| {
            keywords.iter().any(|k| {
                description_lower.contains(k)
                    || required_expertise.iter().any(|e| e == k)
            })
        })
        .map(|(dept, _)| dept.to_string())
        .collect();

    if required_departments.is_empty() {
        required_departments.push(GENERAL_DEPARTMENT.to_string());
    }

    ComplexityAnalysis {
        complexity,
        score,
        requires_coordination: required_departments.len() > 1,
        estimated_subtasks: ((score * 10.0).round() as usize).max(2),
        recommended_strategy: recommend_strategy(score, hierarchical_threshold),
        parallelization_potential: score > 0.5,
        required_departments,
    }
}

/// Strategy recommendation by score band
pub fn recommend_strategy(score: f32, hierarchical_threshold: f32) -> DecompositionStrategy {
    if score < 0.4 {
        DecompositionStrategy::Sequential
    } else if score < hierarchical_threshold {
        DecompositionStrategy::Parallel
    } else {
        DecompositionStrategy::Hierarchical
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complexity_scores() {
        assert_eq!(Complexity::Low.score(), 0.3);
        assert_eq!(Complexity::Medium.score(), 0.6);
        assert_eq!(Complexity::High.score(), 0.8);
        assert_eq!(Complexity::Extreme.score(), 0.95);
        assert_eq!(Complexity::from_label("nonsense"), Complexity::Medium);
    }

    #[test]
    fn test_strategy_bands() {
        assert_eq!(
            recommend_strategy(0.3, 0.7),
            DecompositionStrategy::Sequential
        );
        assert_eq!(recommend_strategy(0.6, 0.7), DecompositionStrategy::Parallel);
        assert_eq!(
            recommend_strategy(0.8, 0.7),
            DecompositionStrategy::Hierarchical
        );
        // a lower threshold widens the hierarchical band
        assert_eq!(
            recommend_strategy(0.6, 0.5),
            DecompositionStrategy::Hierarchical
        );
    }

    #[test]
    fn test_department_detection() {
        let analysis = analyze(
            "Build and test a data pipeline with documentation",
            Complexity::High,
            &[],
            0.7,
        );
        assert!(analysis
            .required_departments
            .contains(&"data_analysis".to_string()));
        assert!(analysis
            .required_departments
            .contains(&"quality_assurance".to_string()));
        assert!(analysis
            .required_departments
            .contains(&"technical_writing".to_string()));
        assert!(analysis.requires_coordination);
    }

    #[test]
    fn test_expertise_hint_activates_department() {
        let analysis = analyze("do the thing", Complexity::Low, &["coding".to_string()], 0.7);
        assert_eq!(
            analysis.required_departments,
            vec!["software_development".to_string()]
        );
        assert!(!analysis.requires_coordination);
    }

    #[test]
    fn test_general_fallback_and_subtask_estimate() {
        let analysis = analyze("do the thing", Complexity::Low, &[], 0.7);
        assert_eq!(
            analysis.required_departments,
            vec![GENERAL_DEPARTMENT.to_string()]
        );
        // max(2, round(0.3 * 10)) = 3
        assert_eq!(analysis.estimated_subtasks, 3);

        let extreme = analyze("do the thing", Complexity::Extreme, &[], 0.7);
        // round(9.5) = 10
        assert_eq!(extreme.estimated_subtasks, 10);
    }
}
