//! Domain error types.

use event_store::EventStoreError;
use thiserror::Error;

use crate::catalog::CatalogError;
use crate::command::ConflictAware;
use crate::order::OrderError;
use crate::payment::PaymentError;
use crate::review::ReviewError;
use crate::shipment::ShipmentError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An error occurred in the event store.
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error(transparent)]
    Shipment(#[from] ShipmentError),

    #[error(transparent)]
    Review(#[from] ReviewError),

    /// Aggregate not found.
    #[error("{aggregate_type} not found: {aggregate_id}")]
    AggregateNotFound {
        aggregate_type: &'static str,
        aggregate_id: String,
    },

    /// The actor is not allowed to perform the operation.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    pub fn not_found(aggregate_type: &'static str, aggregate_id: impl ToString) -> Self {
        DomainError::AggregateNotFound {
            aggregate_type,
            aggregate_id: aggregate_id.to_string(),
        }
    }
}

impl ConflictAware for DomainError {
    fn is_conflict(&self) -> bool {
        matches!(self, DomainError::EventStore(e) if e.is_conflict())
    }
}
