//! Maestro - Hierarchical Multi-Agent Orchestration
//!
//! Maestro coordinates workflows through a three-tier agent hierarchy: a
//! conductor agent analyzes and decomposes each workflow, department heads
//! own domain subtrees, and specialists are recruited on demand for leaf
//! work. Task state, dependencies, agent relationships, and experience
//! consolidation all flow through pluggable stores.
//!
//! # Architecture
//!
//! - `agents` - Agent entities, relationships, and the agent lifecycle service
//! - `tasks` - Task entities, dependency edges, and the task lifecycle service
//! - `orchestration` - Analysis, decomposition, assignment, compilation, and recovery
//! - `memory` - Experience episodes and consolidation cycles
//! - `storage` - Store traits and the in-memory backend
//! - `config` - Tunable orchestration parameters

pub mod agents;
pub mod config;
pub mod error;
pub mod memory;
pub mod orchestration;
pub mod storage;
pub mod tasks;

pub use agents::{Agent, AgentService};
pub use config::MaestroConfig;
pub use error::{MaestroError, Result};
pub use orchestration::{Orchestrator, WorkflowRequest};
pub use tasks::{Task, TaskService};

/// Maestro version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
