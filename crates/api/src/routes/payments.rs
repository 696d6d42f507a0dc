//! Payment intent and callback verification endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::Money;
use domain::payment::{PaymentRecord, PaymentStatus};
use event_store::EventStore;
use fulfillment::{PaymentIntent, VerifyPayment};
use serde::{Deserialize, Serialize};

use super::orders::OrderResponse;
use super::{parse_id, require_admin};
use crate::error::ApiError;
use crate::extract::Payload;
use crate::session::Session;
use crate::state::AppState;

#[derive(Deserialize, Default)]
pub struct InitiateRequest {
    /// Amount the client believes it owes; the order total always wins.
    #[serde(default)]
    pub amount_minor: Option<i64>,
}

/// The gateway callback as relayed by the client. Accepts the gateway's
/// own field names.
#[derive(Deserialize)]
pub struct VerifyRequest {
    #[serde(alias = "razorpay_order_id")]
    pub gateway_order_id: String,
    #[serde(alias = "razorpay_payment_id")]
    pub gateway_payment_id: String,
    #[serde(alias = "razorpay_signature")]
    pub signature: String,
}

#[derive(Serialize)]
pub struct PaymentResponse {
    pub gateway_order_id: String,
    pub order_id: Option<AggregateId>,
    pub amount: Money,
    pub currency: String,
    pub receipt: String,
    pub status: PaymentStatus,
    pub gateway_payment_id: Option<String>,
    pub rejected_attempts: u32,
    pub opened_at: Option<DateTime<Utc>>,
    pub verified_at: Option<DateTime<Utc>>,
}

impl From<&PaymentRecord> for PaymentResponse {
    fn from(record: &PaymentRecord) -> Self {
        Self {
            gateway_order_id: record.gateway_order_id().to_string(),
            order_id: record.order_id(),
            amount: record.amount(),
            currency: record.currency().to_string(),
            receipt: record.receipt().to_string(),
            status: record.status(),
            gateway_payment_id: record.gateway_payment_id().map(str::to_string),
            rejected_attempts: record.rejected_attempts(),
            opened_at: record.opened_at(),
            verified_at: record.verified_at(),
        }
    }
}

/// POST /orders/{id}/payments: opens a gateway payment for a pending order.
#[tracing::instrument(skip(state, session, req))]
pub async fn initiate<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    session: Session,
    Path(id): Path<String>,
    Payload(req): Payload<InitiateRequest>,
) -> Result<(StatusCode, Json<PaymentIntent>), ApiError> {
    let intent = state
        .payments
        .initiate_payment(
            parse_id(&id)?,
            &session.actor,
            req.amount_minor.map(Money::from_minor),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(intent)))
}

/// POST /orders/{id}/payments/verify: settles the order from a signed
/// callback.
#[tracing::instrument(skip(state, session, req))]
pub async fn verify<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    session: Session,
    Path(id): Path<String>,
    Payload(req): Payload<VerifyRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state
        .payments
        .verify_payment(VerifyPayment {
            order_id: parse_id(&id)?,
            actor: session.actor,
            gateway_order_id: req.gateway_order_id,
            gateway_payment_id: req.gateway_payment_id,
            signature: req.signature,
        })
        .await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// GET /admin/payments/{gateway_order_id}
pub async fn get<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    session: Session,
    Path(gateway_order_id): Path<String>,
) -> Result<Json<PaymentResponse>, ApiError> {
    require_admin(&session.actor)?;
    let record = state
        .payments
        .get_payment(&gateway_order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("payment {gateway_order_id} not found")))?;
    Ok(Json(PaymentResponse::from(&record)))
}
