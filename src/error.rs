//! Error types for the MessageRequest Operator

use thiserror::Error;

/// Result type alias using the operator's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Operator error types
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Resource not found in the store
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Resource with the same identity already exists
    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    /// A resource with the expected name belongs to someone else
    #[error("Foreign resource: {0}")]
    Foreign(String),

    /// Conditional update lost against a newer resource version
    #[error("Version conflict on {0}")]
    Conflict(String),

    /// Reconcile was cancelled before it finished
    #[error("Reconcile cancelled")]
    Cancelled,

    /// Reconcile ran past its deadline
    #[error("Reconcile deadline exceeded")]
    DeadlineExceeded,

    /// Resource is missing a field the operator relies on
    #[error("Invalid resource: {0}")]
    InvalidResource(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a not found error
    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound(what.into())
    }

    /// Create an already exists error
    pub fn already_exists(what: impl Into<String>) -> Self {
        Error::AlreadyExists(what.into())
    }

    /// Create a foreign resource error
    pub fn foreign(what: impl Into<String>) -> Self {
        Error::Foreign(what.into())
    }

    /// Create a version conflict error
    pub fn conflict(what: impl Into<String>) -> Self {
        Error::Conflict(what.into())
    }

    /// Create an invalid resource error
    pub fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidResource(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Whether redelivering the same key can make progress.
    ///
    /// Malformed resources stay malformed until someone edits them, which
    /// produces a fresh watch event anyway.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Error::InvalidResource(_) | Error::Config(_))
    }
}
