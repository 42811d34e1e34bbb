//! In-memory storage backend.
//!
//! Each entity kind lives in its own `RwLock<HashMap>`; `update_*` runs the
//! caller's closure while holding the write lock, so concurrent updates to
//! the same record serialize instead of tearing. The closure mutates a copy
//! that is written back only on success, so a failed update never leaves a
//! half-modified record behind.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::agents::{Agent, AgentId, AgentKindTag, AgentRelationship, AgentStatus, RelationshipId};
use crate::error::{MaestroError, Result};
use crate::tasks::{DependencyId, Task, TaskDependency, TaskId, TaskStatus};

use super::{AgentStore, DependencyStore, RelationshipStore, TaskStore, UpdateFn};

/// In-memory backend for tests, demos, and single-process deployments.
#[derive(Default)]
pub struct InMemoryStore {
    agents: RwLock<HashMap<AgentId, Agent>>,
    tasks: RwLock<HashMap<TaskId, Task>>,
    dependencies: RwLock<HashMap<DependencyId, TaskDependency>>,
    relationships: RwLock<HashMap<RelationshipId, AgentRelationship>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AgentStore for InMemoryStore {
    async fn insert_agent(&self, agent: Agent) -> Result<()> {
        self.agents.write().await.insert(agent.id.clone(), agent);
        Ok(())
    }

    async fn get_agent(&self, id: &AgentId) -> Result<Agent> {
        self.agents
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| MaestroError::not_found("agent", id))
    }

    async fn update_agent(&self, id: &AgentId, f: UpdateFn<Agent>) -> Result<Agent> {
        let mut agents = self.agents.write().await;
        let agent = agents
            .get_mut(id)
            .ok_or_else(|| MaestroError::not_found("agent", id))?;
        let mut candidate = agent.clone();
        f(&mut candidate)?;
        *agent = candidate.clone();
        Ok(candidate)
    }

    async fn list_agents(&self) -> Result<Vec<Agent>> {
        Ok(self.agents.read().await.values().cloned().collect())
    }

    async fn find_agents_by_kind(&self, kind: AgentKindTag) -> Result<Vec<Agent>> {
        Ok(self
            .agents
            .read()
            .await
            .values()
            .filter(|a| a.kind.tag() == kind)
            .cloned()
            .collect())
    }

    async fn find_agents_by_status(&self, status: AgentStatus) -> Result<Vec<Agent>> {
        Ok(self
            .agents
            .read()
            .await
            .values()
            .filter(|a| a.status == status)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl TaskStore for InMemoryStore {
    async fn insert_task(&self, task: Task) -> Result<()> {
        self.tasks.write().await.insert(task.id.clone(), task);
        Ok(())
    }

    async fn get_task(&self, id: &TaskId) -> Result<Task> {
        self.tasks
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| MaestroError::not_found("task", id))
    }

    async fn update_task(&self, id: &TaskId, f: UpdateFn<Task>) -> Result<Task> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| MaestroError::not_found("task", id))?;
        let mut candidate = task.clone();
        f(&mut candidate)?;
        *task = candidate.clone();
        Ok(candidate)
    }

    async fn list_tasks(&self) -> Result<Vec<Task>> {
        Ok(self.tasks.read().await.values().cloned().collect())
    }

    async fn find_tasks_by_status(&self, status: TaskStatus) -> Result<Vec<Task>> {
        Ok(self
            .tasks
            .read()
            .await
            .values()
            .filter(|t| t.status == status)
            .cloned()
            .collect())
    }

    async fn find_tasks_by_agent(&self, agent_id: &AgentId) -> Result<Vec<Task>> {
        Ok(self
            .tasks
            .read()
            .await
            .values()
            .filter(|t| t.assigned_agent_id.as_ref() == Some(agent_id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl DependencyStore for InMemoryStore {
    async fn insert_dependency(&self, dependency: TaskDependency) -> Result<()> {
        self.dependencies
            .write()
            .await
            .insert(dependency.id.clone(), dependency);
        Ok(())
    }

    async fn get_dependency(&self, id: &DependencyId) -> Result<TaskDependency> {
        self.dependencies
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| MaestroError::not_found("dependency", id))
    }

    async fn update_dependency(
        &self,
        id: &DependencyId,
        f: UpdateFn<TaskDependency>,
    ) -> Result<TaskDependency> {
        let mut dependencies = self.dependencies.write().await;
        let dependency = dependencies
            .get_mut(id)
            .ok_or_else(|| MaestroError::not_found("dependency", id))?;
        let mut candidate = dependency.clone();
        f(&mut candidate)?;
        *dependency = candidate.clone();
        Ok(candidate)
    }

    async fn dependencies_of(&self, dependent_task_id: &TaskId) -> Result<Vec<TaskDependency>> {
        Ok(self
            .dependencies
            .read()
            .await
            .values()
            .filter(|d| &d.dependent_task_id == dependent_task_id)
            .cloned()
            .collect())
    }

    async fn dependents_of(&self, dependency_task_id: &TaskId) -> Result<Vec<TaskDependency>> {
        Ok(self
            .dependencies
            .read()
            .await
            .values()
            .filter(|d| &d.dependency_task_id == dependency_task_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RelationshipStore for InMemoryStore {
    async fn insert_relationship(&self, relationship: AgentRelationship) -> Result<()> {
        self.relationships
            .write()
            .await
            .insert(relationship.id.clone(), relationship);
        Ok(())
    }

    async fn get_relationship(&self, id: &RelationshipId) -> Result<AgentRelationship> {
        self.relationships
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| MaestroError::not_found("relationship", id))
    }

    async fn update_relationship(
        &self,
        id: &RelationshipId,
        f: UpdateFn<AgentRelationship>,
    ) -> Result<AgentRelationship> {
        let mut relationships = self.relationships.write().await;
        let relationship = relationships
            .get_mut(id)
            .ok_or_else(|| MaestroError::not_found("relationship", id))?;
        let mut candidate = relationship.clone();
        f(&mut candidate)?;
        *relationship = candidate.clone();
        Ok(candidate)
    }

    async fn find_relationship_between(
        &self,
        a: &AgentId,
        b: &AgentId,
    ) -> Result<Option<AgentRelationship>> {
        Ok(self
            .relationships
            .read()
            .await
            .values()
            .find(|r| r.connects(a, b))
            .cloned())
    }

    async fn find_relationships_for(&self, agent_id: &AgentId) -> Result<Vec<AgentRelationship>> {
        Ok(self
            .relationships
            .read()
            .await
            .values()
            .filter(|r| r.involves(agent_id))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::AgentKind;

    #[tokio::test]
    async fn test_agent_roundtrip() {
        let store = InMemoryStore::new();
        let agent = Agent::new("a1", AgentKind::Basic, "general");
        let id = agent.id.clone();

        store.insert_agent(agent).await.unwrap();
        let fetched = store.get_agent(&id).await.unwrap();
        assert_eq!(fetched.name, "a1");

        let missing = store.get_agent(&AgentId::new()).await;
        assert!(missing.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_closure_update_is_applied() {
        let store = InMemoryStore::new();
        let agent = Agent::new("a1", AgentKind::Basic, "general");
        let id = agent.id.clone();
        store.insert_agent(agent).await.unwrap();

        let updated = store
            .update_agent(
                &id,
                Box::new(|a| {
                    a.current_load += 1;
                    Ok(())
                }),
            )
            .await
            .unwrap();
        assert_eq!(updated.current_load, 1);

        let fetched = store.get_agent(&id).await.unwrap();
        assert_eq!(fetched.current_load, 1);
    }

    #[tokio::test]
    async fn test_failing_closure_leaves_record_unchanged() {
        let store = InMemoryStore::new();
        let agent = Agent::new("a1", AgentKind::Basic, "general");
        let id = agent.id.clone();
        store.insert_agent(agent).await.unwrap();

        let err = store
            .update_agent(
                &id,
                Box::new(|a| {
                    a.current_load += 1;
                    Err(MaestroError::validation("rejected"))
                }),
            )
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(store.get_agent(&id).await.unwrap().current_load, 0);
    }

    #[tokio::test]
    async fn test_task_status_query() {
        let store = InMemoryStore::new();
        let mut t1 = Task::new("t1", "d");
        t1.status = TaskStatus::Queued;
        let t2 = Task::new("t2", "d");
        store.insert_task(t1).await.unwrap();
        store.insert_task(t2).await.unwrap();

        let queued = store.find_tasks_by_status(TaskStatus::Queued).await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].title, "t1");
    }

    #[tokio::test]
    async fn test_dependency_edge_queries() {
        let store = InMemoryStore::new();
        let a = TaskId::new();
        let b = TaskId::new();
        let dep = TaskDependency::new(b.clone(), a.clone());
        store.insert_dependency(dep).await.unwrap();

        let waiting = store.dependencies_of(&b).await.unwrap();
        assert_eq!(waiting.len(), 1);

        let blocking = store.dependents_of(&a).await.unwrap();
        assert_eq!(blocking.len(), 1);
        assert_eq!(blocking[0].dependent_task_id, b);
    }

    #[tokio::test]
    async fn test_relationship_lookup_either_order() {
        let store = InMemoryStore::new();
        let a = AgentId::new();
        let b = AgentId::new();
        let rel = AgentRelationship::new(
            a.clone(),
            b.clone(),
            crate::agents::RelationshipType::Collaboration,
        );
        store.insert_relationship(rel).await.unwrap();

        assert!(store
            .find_relationship_between(&b, &a)
            .await
            .unwrap()
            .is_some());
        assert_eq!(store.find_relationships_for(&a).await.unwrap().len(), 1);
    }
}
