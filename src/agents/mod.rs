//! Agent hierarchy: types, relationships, and the agent service.
//!
//! # Features
//!
//! - **Tagged agent kinds**: Conductor and DepartmentHead carry a persona
//!   payload; Specialist and Basic agents do not
//! - **Hierarchy bookkeeping**: parent links, subordinate indexes, and
//!   delegation levels maintained by the service
//! - **Relationships**: typed edges with collaboration history and health
//! - **Performance metrics**: running-average durations and success rates

pub mod relationship;
pub mod service;
pub mod types;

pub use relationship::{AgentRelationship, RelationshipId, RelationshipType};
pub use service::{AgentHierarchy, AgentService, AgentSpec, TaskRequirements};
pub use types::{Agent, AgentId, AgentKind, AgentKindTag, AgentStatus, PersonaState};
