//! Projection error types.

use domain::DomainError;
use thiserror::Error;

/// Errors that can occur during projection processing.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// An error occurred in the event store.
    #[error("Event store error: {0}")]
    EventStore(#[from] event_store::EventStoreError),

    /// Failed to deserialize an event payload.
    #[error("Event deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),
}

impl From<ProjectionError> for DomainError {
    fn from(err: ProjectionError) -> Self {
        match err {
            ProjectionError::EventStore(e) => DomainError::EventStore(e),
            ProjectionError::Deserialization(e) => DomainError::Serialization(e),
        }
    }
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;
