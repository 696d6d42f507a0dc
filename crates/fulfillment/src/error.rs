//! Fulfilment error types.

use common::AggregateId;
use domain::order::{OrderError, OrderStatus};
use domain::payment::PaymentError;
use domain::shipment::{ShipmentError, ShipmentStatus};
use domain::{ConflictAware, DomainError};
use event_store::EventStoreError;
use thiserror::Error;

/// Errors that can occur while coordinating payments and shipments.
#[derive(Debug, Error)]
pub enum FulfillmentError {
    /// The payment callback signature did not match.
    #[error("Payment signature is invalid")]
    SignatureInvalid,

    /// The order is in the wrong status for the requested step.
    #[error("Order is not ready: status is {status}")]
    OrderNotReady { status: OrderStatus },

    #[error("Order not found: {0}")]
    OrderNotFound(AggregateId),

    #[error("Payment not found: {0}")]
    PaymentNotFound(String),

    /// The gateway order belongs to a different order.
    #[error("Payment {0} does not belong to this order")]
    PaymentMismatch(String),

    /// The order was already settled by another payment.
    #[error("Order is already paid")]
    AlreadyPaid,

    #[error("Shipment not found: {0}")]
    ShipmentNotFound(String),

    #[error("Shipment cannot be cancelled in {status} status")]
    ShipmentNotCancellable { status: ShipmentStatus },

    #[error("Order already has active shipment {awb}")]
    ShipmentAlreadyActive { awb: String },

    /// No courier delivers to the destination.
    #[error("No courier services postcode {postcode}")]
    NotServiceable { postcode: String },

    /// The upstream could not be reached or timed out. Safe to retry.
    #[error("{service} is unavailable: {reason}")]
    UpstreamUnavailable {
        service: &'static str,
        reason: String,
    },

    /// The upstream answered but refused the request.
    #[error("{service} rejected the request: {reason}")]
    UpstreamRejected {
        service: &'static str,
        reason: String,
    },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Domain error.
    #[error(transparent)]
    Domain(DomainError),

    /// Event store error.
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),
}

impl FulfillmentError {
    pub(crate) fn unavailable(service: &'static str, reason: impl ToString) -> Self {
        FulfillmentError::UpstreamUnavailable {
            service,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn rejected(service: &'static str, reason: impl ToString) -> Self {
        FulfillmentError::UpstreamRejected {
            service,
            reason: reason.to_string(),
        }
    }

    /// Returns true if the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FulfillmentError::UpstreamUnavailable { .. })
    }
}

impl From<DomainError> for FulfillmentError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Order(OrderError::NotReadyForShipment { status }) => {
                FulfillmentError::OrderNotReady { status }
            }
            DomainError::Order(OrderError::ShipmentAlreadyActive { awb }) => {
                FulfillmentError::ShipmentAlreadyActive { awb }
            }
            DomainError::Shipment(ShipmentError::NotCancellable { status }) => {
                FulfillmentError::ShipmentNotCancellable { status }
            }
            DomainError::Payment(PaymentError::AlreadyVerified { .. }) => {
                FulfillmentError::AlreadyPaid
            }
            DomainError::Forbidden(reason) => FulfillmentError::Forbidden(reason),
            other => FulfillmentError::Domain(other),
        }
    }
}

impl From<OrderError> for FulfillmentError {
    fn from(err: OrderError) -> Self {
        DomainError::from(err).into()
    }
}

impl From<PaymentError> for FulfillmentError {
    fn from(err: PaymentError) -> Self {
        DomainError::from(err).into()
    }
}

impl From<ShipmentError> for FulfillmentError {
    fn from(err: ShipmentError) -> Self {
        DomainError::from(err).into()
    }
}

impl ConflictAware for FulfillmentError {
    fn is_conflict(&self) -> bool {
        match self {
            FulfillmentError::Domain(e) => e.is_conflict(),
            FulfillmentError::EventStore(e) => e.is_conflict(),
            _ => false,
        }
    }
}

/// Convenience type alias for fulfilment results.
pub type Result<T> = std::result::Result<T, FulfillmentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_are_normalized() {
        let err: FulfillmentError = OrderError::NotReadyForShipment {
            status: OrderStatus::Pending,
        }
        .into();
        assert!(matches!(
            err,
            FulfillmentError::OrderNotReady {
                status: OrderStatus::Pending
            }
        ));

        let err: FulfillmentError = ShipmentError::NotCancellable {
            status: ShipmentStatus::InTransit,
        }
        .into();
        assert!(matches!(err, FulfillmentError::ShipmentNotCancellable { .. }));
    }

    #[test]
    fn conflicts_are_detected_through_domain_errors() {
        let conflict = EventStoreError::ConcurrencyConflict {
            aggregate_id: AggregateId::new(),
            expected: event_store::Version::new(1),
            actual: event_store::Version::new(2),
        };
        let err: FulfillmentError = DomainError::from(conflict).into();
        assert!(err.is_conflict());
        assert!(!FulfillmentError::SignatureInvalid.is_conflict());
    }

    #[test]
    fn only_unavailability_is_retryable() {
        assert!(FulfillmentError::unavailable("razorpay", "timed out").is_retryable());
        assert!(!FulfillmentError::rejected("razorpay", "bad request").is_retryable());
    }
}
