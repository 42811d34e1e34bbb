//! Maestro configuration.
//!
//! One `MaestroConfig` is constructed at process start and handed by `Arc` to
//! every service constructor. There is no global configuration state.

use serde::{Deserialize, Serialize};

/// Top-level configuration for the orchestration engine and services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaestroConfig {
    /// Maximum delegation depth for recursive task decomposition
    pub max_delegation_depth: u32,

    /// Complexity score above which hierarchical decomposition is preferred
    pub complexity_threshold: f32,

    /// Default retry budget for new tasks
    pub default_max_retries: u32,

    /// Weights for optimal-agent scoring
    pub assignment: AssignmentWeights,

    /// Divisor normalizing an agent's in-flight task count into a load factor
    pub load_divisor: f32,

    /// Seconds a task may sit in-progress before it is flagged as a bottleneck
    pub bottleneck_threshold_secs: i64,

    /// Duration of the sleeping phase of an agent sleep cycle
    pub sleep_cycle_secs: u64,

    /// Duration of the dreaming phase of an agent sleep cycle
    pub dream_cycle_secs: u64,
}

/// Weights for the optimal-agent scoring function.
///
/// score = capability * match_ratio + load * (1 - current_load/divisor)
///       + success_rate * agent_success_rate
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AssignmentWeights {
    /// Weight for the capability match ratio
    pub capability: f32,

    /// Weight for the (inverted) load factor
    pub load: f32,

    /// Weight for the agent's historical success rate
    pub success_rate: f32,
}

impl Default for AssignmentWeights {
    fn default() -> Self {
        Self {
            capability: 0.5,
            load: 0.3,
            success_rate: 0.2,
        }
    }
}

impl Default for MaestroConfig {
    fn default() -> Self {
        Self {
            max_delegation_depth: 5,
            complexity_threshold: 0.7,
            default_max_retries: 3,
            assignment: AssignmentWeights::default(),
            load_divisor: 10.0,
            bottleneck_threshold_secs: 300,
            sleep_cycle_secs: 60,
            dream_cycle_secs: 30,
        }
    }
}
