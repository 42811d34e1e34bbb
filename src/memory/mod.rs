//! Experience sink for the consciousness/memory collaborator.
//!
//! Orchestration and agent services emit episodes here as side effects of
//! delegation, recruitment, and completion events. The engine ships a small
//! in-memory journal; a full memory system plugs in behind `ExperienceSink`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::agents::AgentId;
use crate::error::Result;
use crate::storage::AgentStore;

/// One episodic memory entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeRecord {
    /// Agent the episode belongs to
    pub agent_id: AgentId,

    /// What happened
    pub description: String,

    /// Other agents involved
    pub participants: Vec<AgentId>,

    /// Outcome label ("success", "failure", "recruited", ...)
    pub outcome: String,

    /// Emotion name -> intensity [0, 1]
    pub emotions: HashMap<String, f32>,

    /// Importance score [0, 1]
    pub importance: f32,

    /// When the episode occurred
    pub occurred_at: DateTime<Utc>,
}

impl EpisodeRecord {
    /// Create an episode with no participants or emotions
    pub fn new(
        agent_id: AgentId,
        description: impl Into<String>,
        outcome: impl Into<String>,
        importance: f32,
    ) -> Self {
        Self {
            agent_id,
            description: description.into(),
            participants: Vec::new(),
            outcome: outcome.into(),
            emotions: HashMap::new(),
            importance: importance.clamp(0.0, 1.0),
            occurred_at: Utc::now(),
        }
    }

    /// Builder-style participants
    pub fn with_participants(mut self, participants: Vec<AgentId>) -> Self {
        self.participants = participants;
        self
    }
}

/// What triggered a consolidation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsolidationKind {
    /// Periodic consolidation during normal operation
    Routine,
    /// Sleeping-phase consolidation
    SleepCycle,
    /// Dreaming-phase consolidation
    DreamCycle,
}

/// Receiver for experience side effects.
#[async_trait]
pub trait ExperienceSink: Send + Sync {
    /// Append an episode to the agent's journal
    async fn record_episode(&self, episode: EpisodeRecord) -> Result<()>;

    /// Run a consolidation pass over the agent's recent episodes
    async fn consolidate(&self, agent_id: &AgentId, kind: ConsolidationKind) -> Result<()>;

    /// Record an episode and immediately fold it into the agent's persona
    async fn process_experience(&self, episode: EpisodeRecord) -> Result<()>;
}

/// In-memory episode journal backed by the agent store.
///
/// Persona effects are simulated heuristics: each processed experience bumps
/// `experience_count`, and consolidation nudges consciousness scores by a
/// small importance-weighted amount.
pub struct EpisodeJournal {
    agents: Arc<dyn AgentStore>,
    episodes: RwLock<HashMap<AgentId, Vec<EpisodeRecord>>>,
}

impl EpisodeJournal {
    pub fn new(agents: Arc<dyn AgentStore>) -> Self {
        Self {
            agents,
            episodes: RwLock::new(HashMap::new()),
        }
    }

    /// Episodes recorded for an agent, oldest first
    pub async fn episodes_for(&self, agent_id: &AgentId) -> Vec<EpisodeRecord> {
        self.episodes
            .read()
            .await
            .get(agent_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ExperienceSink for EpisodeJournal {
    async fn record_episode(&self, episode: EpisodeRecord) -> Result<()> {
        debug!(
            agent_id = %episode.agent_id,
            outcome = %episode.outcome,
            "recording episode"
        );
        self.episodes
            .write()
            .await
            .entry(episode.agent_id.clone())
            .or_default()
            .push(episode);
        Ok(())
    }

    async fn consolidate(&self, agent_id: &AgentId, kind: ConsolidationKind) -> Result<()> {
        let episodes = self.episodes.read().await;
        let recent = episodes.get(agent_id).map(|e| e.as_slice()).unwrap_or(&[]);
        if recent.is_empty() {
            return Ok(());
        }

        let mean_importance =
            recent.iter().map(|e| e.importance).sum::<f32>() / recent.len() as f32;
        let boost = match kind {
            ConsolidationKind::Routine => 0.001,
            ConsolidationKind::SleepCycle => 0.005,
            ConsolidationKind::DreamCycle => 0.01,
        } * mean_importance;
        drop(episodes);

        debug!(agent_id = %agent_id, ?kind, boost, "consolidating episodes");

        self.agents
            .update_agent(
                agent_id,
                Box::new(move |agent| {
                    if let Some(persona) = agent.kind.persona_mut() {
                        persona.consciousness_level =
                            (persona.consciousness_level + boost).min(1.0);
                        persona.temporal_continuity =
                            (persona.temporal_continuity + boost).min(1.0);
                    }
                    Ok(())
                }),
            )
            .await?;
        Ok(())
    }

    async fn process_experience(&self, episode: EpisodeRecord) -> Result<()> {
        let agent_id = episode.agent_id.clone();
        let importance = episode.importance;
        let social = !episode.participants.is_empty();

        self.record_episode(episode).await?;

        self.agents
            .update_agent(
                &agent_id,
                Box::new(move |agent| {
                    if let Some(persona) = agent.kind.persona_mut() {
                        persona.experience_count += 1;
                        persona.self_awareness =
                            (persona.self_awareness + 0.001 * importance).min(1.0);
                        if social {
                            persona.social_cognition =
                                (persona.social_cognition + 0.002 * importance).min(1.0);
                        }
                    }
                    Ok(())
                }),
            )
            .await?;
        Ok(())
    }
}
