//! Relationship edges between agents.
//!
//! Relationships track collaboration history between pairs of agents. The
//! assignment and recovery paths update them; nothing in the orchestration
//! core depends on their values yet beyond health reporting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::types::AgentId;

/// Unique identifier for a relationship edge
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationshipId(String);

impl RelationshipId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RelationshipId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RelationshipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of relationship between two agents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    Hierarchical,
    Peer,
    Collaboration,
    Mentorship,
    Dependency,
    Conflict,
    Alliance,
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Hierarchical => "hierarchical",
            Self::Peer => "peer",
            Self::Collaboration => "collaboration",
            Self::Mentorship => "mentorship",
            Self::Dependency => "dependency",
            Self::Conflict => "conflict",
            Self::Alliance => "alliance",
        };
        write!(f, "{s}")
    }
}

/// An undirected (or, for hierarchical edges, directed) relationship between
/// two agents, with collaboration bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRelationship {
    /// Edge ID
    pub id: RelationshipId,

    /// First participant
    pub agent_a_id: AgentId,

    /// Second participant
    pub agent_b_id: AgentId,

    /// Kind of relationship
    pub relationship_type: RelationshipType,

    /// Bond strength (0-1)
    pub strength: f32,

    /// Trust level (0-1)
    pub trust_level: f32,

    /// Compatibility between the agents (0-1)
    pub compatibility_score: f32,

    /// Whether the edge is directed
    pub is_directional: bool,

    /// Dominant agent for directed edges
    pub dominant_agent_id: Option<AgentId>,

    /// Total recorded interactions
    pub interaction_count: u64,

    /// Successful collaborations
    pub successful_collaborations: u64,

    /// Failed collaborations
    pub failed_collaborations: u64,

    /// Timestamp of the last interaction
    pub last_interaction: Option<DateTime<Utc>>,

    /// Context in which the relationship was formed
    pub formation_context: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl AgentRelationship {
    /// Create a new relationship with neutral starting scores
    pub fn new(
        agent_a_id: AgentId,
        agent_b_id: AgentId,
        relationship_type: RelationshipType,
    ) -> Self {
        let now = Utc::now();
        // Hierarchical edges are directed with agent_a dominant
        let is_hierarchical = relationship_type == RelationshipType::Hierarchical;
        Self {
            id: RelationshipId::new(),
            dominant_agent_id: is_hierarchical.then(|| agent_a_id.clone()),
            agent_a_id,
            agent_b_id,
            relationship_type,
            strength: 0.5,
            trust_level: 0.5,
            compatibility_score: 0.5,
            is_directional: is_hierarchical,
            interaction_count: 0,
            successful_collaborations: 0,
            failed_collaborations: 0,
            last_interaction: None,
            formation_context: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this edge connects the given pair, in either order
    pub fn connects(&self, a: &AgentId, b: &AgentId) -> bool {
        (&self.agent_a_id == a && &self.agent_b_id == b)
            || (&self.agent_a_id == b && &self.agent_b_id == a)
    }

    /// Whether the given agent participates in this edge
    pub fn involves(&self, agent_id: &AgentId) -> bool {
        &self.agent_a_id == agent_id || &self.agent_b_id == agent_id
    }

    /// Record an interaction. Success strengthens the bond (+0.01 strength,
    /// +0.005 trust); failure weakens it faster (-0.02 strength, -0.01 trust).
    pub fn record_interaction(&mut self, successful: bool) {
        self.interaction_count += 1;
        self.last_interaction = Some(Utc::now());

        if successful {
            self.successful_collaborations += 1;
            self.strength = (self.strength + 0.01).min(1.0);
            self.trust_level = (self.trust_level + 0.005).min(1.0);
        } else {
            self.failed_collaborations += 1;
            self.strength = (self.strength - 0.02).max(0.0);
            self.trust_level = (self.trust_level - 0.01).max(0.0);
        }

        self.updated_at = Utc::now();
    }

    /// Collaboration success rate; 1.0 with no history
    pub fn success_rate(&self) -> f32 {
        let total = self.successful_collaborations + self.failed_collaborations;
        if total == 0 {
            return 1.0;
        }
        self.successful_collaborations as f32 / total as f32
    }

    /// Weighted health score:
    /// 0.4 * strength + 0.3 * trust + 0.2 * success_rate + 0.1 * compatibility
    pub fn relationship_health(&self) -> f32 {
        self.strength * 0.4
            + self.trust_level * 0.3
            + self.success_rate() * 0.2
            + self.compatibility_score * 0.1
    }

    /// Whether the relationship is in good standing
    pub fn is_healthy(&self) -> bool {
        self.relationship_health() > 0.6
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> (AgentId, AgentId) {
        (AgentId::new(), AgentId::new())
    }

    #[test]
    fn test_hierarchical_edge_is_directed() {
        let (a, b) = pair();
        let rel = AgentRelationship::new(a.clone(), b, RelationshipType::Hierarchical);
        assert!(rel.is_directional);
        assert_eq!(rel.dominant_agent_id, Some(a));

        let (a, b) = pair();
        let rel = AgentRelationship::new(a, b, RelationshipType::Collaboration);
        assert!(!rel.is_directional);
        assert!(rel.dominant_agent_id.is_none());
    }

    #[test]
    fn test_interaction_arithmetic() {
        let (a, b) = pair();
        let mut rel = AgentRelationship::new(a, b, RelationshipType::Collaboration);

        rel.record_interaction(true);
        assert!((rel.strength - 0.51).abs() < 1e-6);
        assert!((rel.trust_level - 0.505).abs() < 1e-6);

        rel.record_interaction(false);
        assert!((rel.strength - 0.49).abs() < 1e-6);
        assert!((rel.trust_level - 0.495).abs() < 1e-6);
        assert_eq!(rel.interaction_count, 2);
    }

    #[test]
    fn test_scores_saturate() {
        let (a, b) = pair();
        let mut rel = AgentRelationship::new(a, b, RelationshipType::Peer);
        for _ in 0..100 {
            rel.record_interaction(false);
        }
        assert_eq!(rel.strength, 0.0);
        assert_eq!(rel.trust_level, 0.0);
    }

    #[test]
    fn test_relationship_health() {
        let (a, b) = pair();
        let rel = AgentRelationship::new(a, b, RelationshipType::Alliance);
        // 0.4*0.5 + 0.3*0.5 + 0.2*1.0 + 0.1*0.5 = 0.6
        assert!((rel.relationship_health() - 0.6).abs() < 1e-6);
        assert!(!rel.is_healthy());
    }

    #[test]
    fn test_connects_either_order() {
        let (a, b) = pair();
        let rel = AgentRelationship::new(a.clone(), b.clone(), RelationshipType::Peer);
        assert!(rel.connects(&a, &b));
        assert!(rel.connects(&b, &a));
        assert!(rel.involves(&a));
        assert!(!rel.involves(&AgentId::new()));
    }
}
