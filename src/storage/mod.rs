//! Storage traits for agents, tasks, dependencies and relationships.
//!
//! Services talk to storage only through these traits; the engine ships an
//! in-memory backend and leaves durable backends to implementers. The
//! `update_*` methods take a closure so that check-and-mutate happens
//! atomically inside the backend, never as a get/put pair in the caller; a
//! closure that returns an error leaves the record untouched.

pub mod memory;

use async_trait::async_trait;

use crate::agents::{Agent, AgentId, AgentKindTag, AgentRelationship, AgentStatus, RelationshipId};
use crate::error::Result;
use crate::tasks::{DependencyId, Task, TaskDependency, TaskId, TaskStatus};

pub use memory::InMemoryStore;

/// Mutation closure applied under the backend's write lock. Returning an
/// error aborts the update without modifying the record.
pub type UpdateFn<T> = Box<dyn FnOnce(&mut T) -> Result<()> + Send>;

/// Agent persistence.
#[async_trait]
pub trait AgentStore: Send + Sync {
    /// Insert a new agent record
    async fn insert_agent(&self, agent: Agent) -> Result<()>;

    /// Fetch an agent by ID
    async fn get_agent(&self, id: &AgentId) -> Result<Agent>;

    /// Apply a mutation to an agent atomically, returning the updated record
    async fn update_agent(&self, id: &AgentId, f: UpdateFn<Agent>) -> Result<Agent>;

    /// All agent records
    async fn list_agents(&self) -> Result<Vec<Agent>>;

    /// Agents of a given kind
    async fn find_agents_by_kind(&self, kind: AgentKindTag) -> Result<Vec<Agent>>;

    /// Agents in a given status
    async fn find_agents_by_status(&self, status: AgentStatus) -> Result<Vec<Agent>>;
}

/// Task persistence.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a new task record
    async fn insert_task(&self, task: Task) -> Result<()>;

    /// Fetch a task by ID
    async fn get_task(&self, id: &TaskId) -> Result<Task>;

    /// Apply a mutation to a task atomically, returning the updated record
    async fn update_task(&self, id: &TaskId, f: UpdateFn<Task>) -> Result<Task>;

    /// All task records
    async fn list_tasks(&self) -> Result<Vec<Task>>;

    /// Tasks in a given status
    async fn find_tasks_by_status(&self, status: TaskStatus) -> Result<Vec<Task>>;

    /// Tasks assigned to a given agent
    async fn find_tasks_by_agent(&self, agent_id: &AgentId) -> Result<Vec<Task>>;
}

/// Dependency-edge persistence.
#[async_trait]
pub trait DependencyStore: Send + Sync {
    /// Insert a new dependency edge
    async fn insert_dependency(&self, dependency: TaskDependency) -> Result<()>;

    /// Fetch an edge by ID
    async fn get_dependency(&self, id: &DependencyId) -> Result<TaskDependency>;

    /// Apply a mutation to an edge atomically, returning the updated record
    async fn update_dependency(
        &self,
        id: &DependencyId,
        f: UpdateFn<TaskDependency>,
    ) -> Result<TaskDependency>;

    /// Edges on which the given task waits
    async fn dependencies_of(&self, dependent_task_id: &TaskId) -> Result<Vec<TaskDependency>>;

    /// Edges waiting on the given task
    async fn dependents_of(&self, dependency_task_id: &TaskId) -> Result<Vec<TaskDependency>>;
}

/// Relationship-edge persistence.
#[async_trait]
pub trait RelationshipStore: Send + Sync {
    /// Insert a new relationship edge
    async fn insert_relationship(&self, relationship: AgentRelationship) -> Result<()>;

    /// Fetch an edge by ID
    async fn get_relationship(&self, id: &RelationshipId) -> Result<AgentRelationship>;

    /// Apply a mutation to an edge atomically, returning the updated record
    async fn update_relationship(
        &self,
        id: &RelationshipId,
        f: UpdateFn<AgentRelationship>,
    ) -> Result<AgentRelationship>;

    /// The edge between two agents, in either order, if one exists
    async fn find_relationship_between(
        &self,
        a: &AgentId,
        b: &AgentId,
    ) -> Result<Option<AgentRelationship>>;

    /// All edges the given agent participates in
    async fn find_relationships_for(&self, agent_id: &AgentId) -> Result<Vec<AgentRelationship>>;
}
