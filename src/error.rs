//! Error types for the Maestro system.

/// Result type alias for Maestro operations.
pub type Result<T> = std::result::Result<T, MaestroError>;

/// Main error type for the Maestro system.
#[derive(Debug, thiserror::Error)]
pub enum MaestroError {
    /// Referenced entity does not exist
    #[error("Not found: {resource} with id {id}")]
    NotFound { resource: String, id: String },

    /// Invalid input or illegal operation (self-dependency, non-active
    /// assignee, enum mismatch)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Illegal task status transition
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// Retry requested beyond the task's retry budget
    #[error("Retry limit exceeded for task {task_id} (max_retries: {max_retries})")]
    RetryLimitExceeded { task_id: String, max_retries: u32 },

    /// No capable agent found and recruitment also failed
    #[error("Capacity error: {0}")]
    Capacity(String),

    /// Storage layer errors, opaque beyond the message
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Wrapped anyhow errors for compatibility
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MaestroError {
    /// Create a new not found error
    pub fn not_found(resource: impl Into<String>, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.to_string(),
        }
    }

    /// Create a new validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new invalid transition error
    pub fn invalid_transition(from: impl std::fmt::Display, to: impl std::fmt::Display) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Create a new capacity error
    pub fn capacity(msg: impl Into<String>) -> Self {
        Self::Capacity(msg.into())
    }

    /// Create a new storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is a validation-class error
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::InvalidTransition { .. })
    }

    /// Check if this is a retry limit error
    pub fn is_retry_limit(&self) -> bool {
        matches!(self, Self::RetryLimitExceeded { .. })
    }

    /// Check if this is a storage error
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}
