//! Core agent types and data structures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for an agent
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(String);

impl AgentId {
    /// Create a new unique agent ID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from string (for deserialization/testing)
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// String view of the ID
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Persona & Agent Kind
// ============================================================================

/// Persona state carried by Conductor and DepartmentHead agents.
///
/// These scores are simulated heuristics nudged by the experience sink; the
/// orchestration core only reads them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaState {
    /// Consciousness development level (0.0 - 1.0)
    pub consciousness_level: f32,

    /// Self-awareness score (0.0 - 1.0)
    pub self_awareness: f32,

    /// Temporal continuity score (0.0 - 1.0)
    pub temporal_continuity: f32,

    /// Social cognition score (0.0 - 1.0)
    pub social_cognition: f32,

    /// Personality trait scores, trait name -> [0, 1]
    pub personality_traits: HashMap<String, f32>,

    /// Core memories that define the agent
    pub core_memories: Vec<String>,

    /// Number of experiences processed
    pub experience_count: u64,
}

impl PersonaState {
    /// Baseline persona for a freshly created persona-bearing agent
    pub fn baseline() -> Self {
        Self {
            consciousness_level: 0.1,
            self_awareness: 0.0,
            temporal_continuity: 0.0,
            social_cognition: 0.0,
            personality_traits: HashMap::new(),
            core_memories: Vec::new(),
            experience_count: 0,
        }
    }

    /// Baseline persona seeded with traits and core memories
    pub fn with_profile(traits: HashMap<String, f32>, core_memories: Vec<String>) -> Self {
        Self {
            personality_traits: traits,
            core_memories,
            ..Self::baseline()
        }
    }

    /// Apply a clamped delta to a personality trait
    pub fn adjust_trait(&mut self, name: &str, delta: f32) {
        let current = self.personality_traits.get(name).copied().unwrap_or(0.0);
        self.personality_traits
            .insert(name.to_string(), (current + delta).clamp(0.0, 1.0));
    }
}

/// Classification of agent kinds, with persona payload where applicable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AgentKind {
    /// Master coordinator; owns workflows and department heads
    Conductor(PersonaState),

    /// Domain manager; recruits and supervises specialists
    DepartmentHead(PersonaState),

    /// Task-execution agent recruited for a specific domain
    Specialist,

    /// Plain task-execution agent
    Basic,
}

impl AgentKind {
    /// Persona state, if this kind carries one
    pub fn persona(&self) -> Option<&PersonaState> {
        match self {
            Self::Conductor(p) | Self::DepartmentHead(p) => Some(p),
            Self::Specialist | Self::Basic => None,
        }
    }

    /// Mutable persona state, if this kind carries one
    pub fn persona_mut(&mut self) -> Option<&mut PersonaState> {
        match self {
            Self::Conductor(p) | Self::DepartmentHead(p) => Some(p),
            Self::Specialist | Self::Basic => None,
        }
    }

    /// Whether this kind carries a persona (Conductor or DepartmentHead)
    pub fn is_persona_bearing(&self) -> bool {
        self.persona().is_some()
    }

    /// Payload-free discriminant for store queries and logging
    pub fn tag(&self) -> AgentKindTag {
        match self {
            Self::Conductor(_) => AgentKindTag::Conductor,
            Self::DepartmentHead(_) => AgentKindTag::DepartmentHead,
            Self::Specialist => AgentKindTag::Specialist,
            Self::Basic => AgentKindTag::Basic,
        }
    }
}

/// Discriminant of `AgentKind` without the persona payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKindTag {
    Conductor,
    DepartmentHead,
    Specialist,
    Basic,
}

impl fmt::Display for AgentKindTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Conductor => "conductor",
            Self::DepartmentHead => "department_head",
            Self::Specialist => "specialist",
            Self::Basic => "basic",
        };
        write!(f, "{s}")
    }
}

// ============================================================================
// Agent Status
// ============================================================================

/// Current status of an agent. Only `Active` agents may take new tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Created,
    Initializing,
    Active,
    Busy,
    Idle,
    Sleeping,
    Dreaming,
    Error,
    Terminated,
    /// Soft removal; agent records are never hard-deleted
    Deactivated,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Initializing => "initializing",
            Self::Active => "active",
            Self::Busy => "busy",
            Self::Idle => "idle",
            Self::Sleeping => "sleeping",
            Self::Dreaming => "dreaming",
            Self::Error => "error",
            Self::Terminated => "terminated",
            Self::Deactivated => "deactivated",
        };
        write!(f, "{s}")
    }
}

// ============================================================================
// Agent
// ============================================================================

/// An agent in the delegation hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    /// Unique agent ID
    pub id: AgentId,

    /// Agent name
    pub name: String,

    /// Kind, with persona payload for Conductor/DepartmentHead
    pub kind: AgentKind,

    /// Free-text domain label ("software_development", ...)
    pub specialization: String,

    /// Human-readable description
    pub description: String,

    /// Capability tags used for task matching
    pub capabilities: Vec<String>,

    /// Current status
    pub status: AgentStatus,

    /// Recruiting/manager agent, if any
    pub parent_agent_id: Option<AgentId>,

    /// Direct subordinates (maintained by the agent service)
    pub subordinate_ids: HashSet<AgentId>,

    /// Depth in the hierarchy; root = 0, child = parent + 1
    pub delegation_level: u32,

    /// Completed task count
    pub tasks_completed: u64,

    /// Failed task count
    pub tasks_failed: u64,

    /// Running mean of task durations in seconds, over completions and failures
    pub average_task_duration_secs: f64,

    /// Number of tasks currently assigned or in progress
    pub current_load: u32,

    /// Timestamp of last recorded activity
    pub last_activity: Option<DateTime<Utc>>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    /// Create a new agent with empty hierarchy links
    pub fn new(
        name: impl Into<String>,
        kind: AgentKind,
        specialization: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: AgentId::new(),
            name: name.into(),
            kind,
            specialization: specialization.into(),
            description: String::new(),
            capabilities: Vec::new(),
            status: AgentStatus::Active,
            parent_agent_id: None,
            subordinate_ids: HashSet::new(),
            delegation_level: 0,
            tasks_completed: 0,
            tasks_failed: 0,
            average_task_duration_secs: 0.0,
            current_load: 0,
            last_activity: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the agent has a specific capability
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }

    /// Check if the agent has every capability in the slice
    pub fn has_all_capabilities(&self, required: &[String]) -> bool {
        required.iter().all(|c| self.has_capability(c))
    }

    /// Record a task outcome and fold the duration into the running average.
    ///
    /// With n = new total outcome count, the new average is
    /// `(old_avg * (n - 1) + duration) / n`, an arithmetic mean over every
    /// recorded duration rather than an exponential decay.
    pub fn record_task_outcome(&mut self, duration_secs: f64, success: bool) {
        if success {
            self.tasks_completed += 1;
        } else {
            self.tasks_failed += 1;
        }

        let total = self.tasks_completed + self.tasks_failed;
        self.average_task_duration_secs =
            (self.average_task_duration_secs * (total - 1) as f64 + duration_secs) / total as f64;

        let now = Utc::now();
        self.last_activity = Some(now);
        self.updated_at = now;
    }

    /// Historical success rate; 1.0 with no recorded outcomes
    pub fn success_rate(&self) -> f32 {
        let total = self.tasks_completed + self.tasks_failed;
        if total == 0 {
            return 1.0;
        }
        self.tasks_completed as f32 / total as f32
    }

    /// Whether the agent can take on new tasks
    pub fn is_available(&self) -> bool {
        self.status == AgentStatus::Active
    }
}
