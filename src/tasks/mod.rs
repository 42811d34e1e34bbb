//! Tasks: types, dependency graph, and the task service.
//!
//! # Features
//!
//! - **Lifecycle state machine**: eleven statuses with explicit legal
//!   transitions and terminal-state protection
//! - **Dependency graph**: blocking finish-to-start edges with idempotent
//!   satisfaction and exact-match criteria
//! - **Delegation**: chain and level bookkeeping as tasks move down the
//!   hierarchy
//! - **Retry budget**: failed tasks re-queue until `max_retries` is spent

pub mod dependency;
pub mod service;
pub mod types;

pub use dependency::{DependencyId, DependencyType, TaskDependency};
pub use service::{SubtaskSpec, TaskProgress, TaskService, TaskSpec};
pub use types::{Task, TaskId, TaskPriority, TaskStatus};
