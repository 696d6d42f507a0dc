//! API error types with HTTP response mapping.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::DomainError;
use domain::catalog::CatalogError;
use domain::order::OrderError;
use domain::payment::PaymentError;
use domain::review::ReviewError;
use domain::shipment::ShipmentError;
use event_store::EventStoreError;
use fulfillment::FulfillmentError;
use projections::ProjectionError;
use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;

/// Failures while bringing the server up.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("upstream client: {0}")]
    Upstream(#[from] FulfillmentError),

    #[error("event store: {0}")]
    EventStore(#[from] EventStoreError),

    #[error("read model replay: {0}")]
    Replay(#[from] ProjectionError),

    #[error("payment signature key: {0}")]
    Signature(String),

    #[error("metrics recorder: {0}")]
    Metrics(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// No valid session on the request.
    Unauthorized(String),
    Forbidden(String),
    /// Domain logic error.
    Domain(DomainError),
    /// Payment or shipment coordination error.
    Fulfillment(FulfillmentError),
    /// Read model error.
    Projection(ProjectionError),
    /// Internal server error.
    Internal(String),
}

/// JSON body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: &'static str,
    pub retryable: bool,
}

/// How an error is reported: status, stable code and whether the client
/// may retry unchanged.
struct Classified {
    status: StatusCode,
    code: &'static str,
    retryable: bool,
}

impl Classified {
    fn new(status: StatusCode, code: &'static str) -> Self {
        Self {
            status,
            code,
            retryable: false,
        }
    }

    fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }

    fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal")
    }
}

impl ApiError {
    fn classify(&self) -> Classified {
        match self {
            ApiError::NotFound(_) => Classified::new(StatusCode::NOT_FOUND, "not_found"),
            ApiError::BadRequest(_) => Classified::new(StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::Unauthorized(_) => {
                Classified::new(StatusCode::UNAUTHORIZED, "unauthenticated")
            }
            ApiError::Forbidden(_) => Classified::new(StatusCode::FORBIDDEN, "forbidden"),
            ApiError::Domain(err) => classify_domain(err),
            ApiError::Fulfillment(err) => classify_fulfillment(err),
            ApiError::Projection(ProjectionError::EventStore(err)) => classify_store(err),
            ApiError::Projection(_) | ApiError::Internal(_) => Classified::internal(),
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::NotFound(msg)
            | ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::Internal(msg) => msg.clone(),
            ApiError::Domain(err) => err.to_string(),
            ApiError::Fulfillment(err) => err.to_string(),
            ApiError::Projection(err) => err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let classified = self.classify();
        let message = if classified.status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.message(), "internal server error");
            "internal server error".to_string()
        } else {
            self.message()
        };

        let body = ErrorBody {
            error: message,
            code: classified.code,
            retryable: classified.retryable,
        };
        (classified.status, axum::Json(body)).into_response()
    }
}

fn classify_domain(err: &DomainError) -> Classified {
    use StatusCode as S;
    match err {
        DomainError::Order(err) => match err {
            OrderError::EmptyOrder => Classified::new(S::BAD_REQUEST, "empty_order"),
            OrderError::InvalidItem { .. } => Classified::new(S::BAD_REQUEST, "invalid_item"),
            OrderError::InvalidAddress(_) => Classified::new(S::BAD_REQUEST, "invalid_address"),
            OrderError::InvalidTransition { .. } => {
                Classified::new(S::CONFLICT, "invalid_transition")
            }
            OrderError::PaymentRequired => Classified::new(S::CONFLICT, "payment_required"),
            OrderError::Immutable { .. } => Classified::new(S::CONFLICT, "immutable"),
            OrderError::NotReadyForShipment { .. } => {
                Classified::new(S::CONFLICT, "order_not_ready")
            }
            OrderError::ShipmentAlreadyActive { .. } => {
                Classified::new(S::CONFLICT, "shipment_already_active")
            }
            OrderError::AlreadyPlaced => Classified::new(S::CONFLICT, "already_placed"),
            OrderError::NotPlaced => Classified::new(S::NOT_FOUND, "not_found"),
        },
        DomainError::Catalog(err) => match err {
            CatalogError::InvalidProduct(_) => Classified::new(S::BAD_REQUEST, "invalid_product"),
            CatalogError::NotListed(_) => Classified::new(S::BAD_REQUEST, "invalid_item"),
            CatalogError::OutOfStock { .. } => Classified::new(S::CONFLICT, "out_of_stock"),
            CatalogError::NegativeStock { .. } => {
                Classified::new(S::BAD_REQUEST, "negative_stock")
            }
        },
        DomainError::Payment(err) => match err {
            PaymentError::AlreadyOpened(_) => Classified::new(S::CONFLICT, "conflict"),
            PaymentError::NotOpened => Classified::new(S::NOT_FOUND, "payment_not_found"),
            PaymentError::AlreadyVerified { .. } => Classified::new(S::CONFLICT, "already_paid"),
            PaymentError::OrderMismatch => Classified::new(S::BAD_REQUEST, "payment_mismatch"),
        },
        DomainError::Shipment(err) => match err {
            ShipmentError::AlreadyRegistered(_) => {
                Classified::new(S::CONFLICT, "shipment_already_active")
            }
            ShipmentError::NotRegistered => Classified::new(S::NOT_FOUND, "shipment_not_found"),
            ShipmentError::NotCancellable { .. } => {
                Classified::new(S::CONFLICT, "shipment_not_cancellable")
            }
        },
        DomainError::Review(err) => match err {
            ReviewError::NotEligible { .. } => Classified::new(S::FORBIDDEN, "not_eligible"),
            ReviewError::InvalidRating(_) => Classified::new(S::BAD_REQUEST, "invalid_rating"),
            ReviewError::DuplicateReview { .. } => {
                Classified::new(S::CONFLICT, "duplicate_review")
            }
            ReviewError::NotSubmitted => Classified::new(S::NOT_FOUND, "not_found"),
        },
        DomainError::AggregateNotFound { .. } => Classified::new(S::NOT_FOUND, "not_found"),
        DomainError::Forbidden(_) => Classified::new(S::FORBIDDEN, "forbidden"),
        DomainError::EventStore(err) => classify_store(err),
        DomainError::Serialization(_) => Classified::internal(),
    }
}

fn classify_fulfillment(err: &FulfillmentError) -> Classified {
    use StatusCode as S;
    match err {
        FulfillmentError::SignatureInvalid => Classified::new(S::BAD_REQUEST, "signature_invalid"),
        FulfillmentError::OrderNotReady { .. } => Classified::new(S::CONFLICT, "order_not_ready"),
        FulfillmentError::OrderNotFound(_) => Classified::new(S::NOT_FOUND, "not_found"),
        FulfillmentError::PaymentNotFound(_) => Classified::new(S::NOT_FOUND, "payment_not_found"),
        FulfillmentError::PaymentMismatch(_) => {
            Classified::new(S::BAD_REQUEST, "payment_mismatch")
        }
        FulfillmentError::AlreadyPaid => Classified::new(S::CONFLICT, "already_paid"),
        FulfillmentError::ShipmentNotFound(_) => {
            Classified::new(S::NOT_FOUND, "shipment_not_found")
        }
        FulfillmentError::ShipmentNotCancellable { .. } => {
            Classified::new(S::CONFLICT, "shipment_not_cancellable")
        }
        FulfillmentError::ShipmentAlreadyActive { .. } => {
            Classified::new(S::CONFLICT, "shipment_already_active")
        }
        FulfillmentError::NotServiceable { .. } => {
            Classified::new(S::UNPROCESSABLE_ENTITY, "not_serviceable")
        }
        FulfillmentError::UpstreamUnavailable { .. } => {
            Classified::new(S::SERVICE_UNAVAILABLE, "upstream_unavailable").retryable()
        }
        FulfillmentError::UpstreamRejected { .. } => {
            Classified::new(S::BAD_GATEWAY, "upstream_rejected")
        }
        FulfillmentError::Forbidden(_) => Classified::new(S::FORBIDDEN, "forbidden"),
        FulfillmentError::Domain(err) => classify_domain(err),
        FulfillmentError::EventStore(err) => classify_store(err),
    }
}

fn classify_store(err: &EventStoreError) -> Classified {
    if err.is_conflict() {
        // Retries were exhausted; a fresh request reads the new state.
        Classified::new(StatusCode::CONFLICT, "conflict").retryable()
    } else {
        Classified::internal()
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<FulfillmentError> for ApiError {
    fn from(err: FulfillmentError) -> Self {
        ApiError::Fulfillment(err)
    }
}

impl From<ProjectionError> for ApiError {
    fn from(err: ProjectionError) -> Self {
        ApiError::Projection(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}
