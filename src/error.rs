//! Error types for forum moderation operations.

use thiserror::Error;

/// Result type alias for forum moderation operations.
pub type Result<T> = std::result::Result<T, ForumError>;

/// Main error type for forum moderation operations.
///
/// The first four variants form the caller-facing taxonomy: a privileged
/// operation that returns any of them has mutated nothing and appended no
/// audit entry.
#[derive(Error, Debug)]
pub enum ForumError {
    /// The access evaluator or the state machine refused the action
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The target is not in a state that allows the transition
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    /// A precondition went stale between read and commit
    #[error("Concurrent modification: {0}")]
    ConcurrentModification(String),

    /// The target id does not resolve
    #[error("Not found: {0}")]
    NotFound(String),

    /// Input validation errors (size limits, malformed identifiers)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Storage backend errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ForumError {
    /// Creates a new permission denied error.
    pub fn permission_denied<T: ToString>(msg: T) -> Self {
        Self::PermissionDenied(msg.to_string())
    }

    /// Creates a new invalid state transition error.
    pub fn invalid_transition<T: ToString>(msg: T) -> Self {
        Self::InvalidStateTransition(msg.to_string())
    }

    /// Creates a new concurrent modification error.
    pub fn conflict<T: ToString>(msg: T) -> Self {
        Self::ConcurrentModification(msg.to_string())
    }

    /// Creates a new not found error.
    pub fn not_found<T: ToString>(msg: T) -> Self {
        Self::NotFound(msg.to_string())
    }

    /// Creates a new validation error.
    pub fn validation<T: ToString>(msg: T) -> Self {
        Self::Validation(msg.to_string())
    }

    /// Creates a new storage error.
    pub fn storage<T: ToString>(msg: T) -> Self {
        Self::Storage(msg.to_string())
    }

    /// Creates a new serialization error.
    pub fn serialization<T: ToString>(msg: T) -> Self {
        Self::Serialization(msg.to_string())
    }

    /// Creates a new configuration error.
    pub fn config<T: ToString>(msg: T) -> Self {
        Self::Config(msg.to_string())
    }

    /// Returns true if re-reading state and retrying once may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentModification(_))
    }

    /// Returns true if the error means the caller was not allowed to act.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied(_))
    }
}
