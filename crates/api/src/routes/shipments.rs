//! Shipment registration, tracking and cancellation endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::shipment::{PackageDetails, Shipment, ShipmentStatus};
use event_store::EventStore;
use fulfillment::{CancelShipment, TrackingUpdate};
use serde::{Deserialize, Serialize};

use super::orders::OrderResponse;
use super::{parse_id, require_admin};
use crate::error::ApiError;
use crate::extract::Payload;
use crate::session::{Session, TrackingCaller};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct TrackingRequest {
    /// Carrier status label, e.g. `"OUT FOR DELIVERY"`.
    #[serde(alias = "current_status")]
    pub status: String,
}

#[derive(Deserialize, Default)]
pub struct CancelShipmentRequest {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub cancel_order: bool,
}

#[derive(Serialize)]
pub struct ShipmentResponse {
    pub awb: String,
    pub order_id: Option<AggregateId>,
    pub courier: String,
    pub aggregator_order_id: String,
    pub aggregator_shipment_id: String,
    pub pickup_location: String,
    pub package: PackageDetails,
    pub status: ShipmentStatus,
    pub carrier_status: Option<String>,
    pub registered_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
}

impl From<&Shipment> for ShipmentResponse {
    fn from(shipment: &Shipment) -> Self {
        Self {
            awb: shipment.awb().to_string(),
            order_id: shipment.order_id(),
            courier: shipment.courier().to_string(),
            aggregator_order_id: shipment.aggregator_order_id().to_string(),
            aggregator_shipment_id: shipment.aggregator_shipment_id().to_string(),
            pickup_location: shipment.pickup_location().to_string(),
            package: shipment.package(),
            status: shipment.status(),
            carrier_status: shipment.carrier_status().map(str::to_string),
            registered_at: shipment.registered_at(),
            updated_at: shipment.updated_at(),
            cancellation_reason: shipment.cancellation_reason().map(str::to_string),
        }
    }
}

#[derive(Serialize)]
pub struct CancelShipmentResponse {
    pub shipment: ShipmentResponse,
    pub order: OrderResponse,
}

/// POST /orders/{id}/shipment: registers the parcel with the aggregator.
#[tracing::instrument(skip(state, session))]
pub async fn register<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    session: Session,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<ShipmentResponse>), ApiError> {
    let shipment = state
        .shipments
        .register_shipment(parse_id(&id)?, &session.actor)
        .await?;
    Ok((StatusCode::CREATED, Json(ShipmentResponse::from(&shipment))))
}

/// GET /shipments/{awb}
pub async fn get<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    session: Session,
    Path(awb): Path<String>,
) -> Result<Json<ShipmentResponse>, ApiError> {
    require_admin(&session.actor)?;
    let shipment = state
        .shipments
        .get_shipment(&awb)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("shipment {awb} not found")))?;
    Ok(Json(ShipmentResponse::from(&shipment)))
}

/// POST /shipments/{awb}/tracking: carrier status report from an admin or
/// the aggregator webhook.
#[tracing::instrument(skip(state, actor, req))]
pub async fn tracking<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    TrackingCaller(actor): TrackingCaller,
    Path(awb): Path<String>,
    Payload(req): Payload<TrackingRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state
        .shipments
        .update_tracking_status(TrackingUpdate {
            awb,
            carrier_status: req.status,
            actor,
        })
        .await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// POST /shipments/{awb}/cancel: withdraws a parcel before pickup.
#[tracing::instrument(skip(state, session, req))]
pub async fn cancel<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    session: Session,
    Path(awb): Path<String>,
    Payload(req): Payload<CancelShipmentRequest>,
) -> Result<Json<CancelShipmentResponse>, ApiError> {
    let (shipment, order) = state
        .shipments
        .cancel_shipment(CancelShipment {
            awb,
            actor: session.actor,
            reason: req
                .reason
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| "cancelled by merchant".to_string()),
            cancel_order: req.cancel_order,
        })
        .await?;
    Ok(Json(CancelShipmentResponse {
        shipment: ShipmentResponse::from(&shipment),
        order: OrderResponse::from(&order),
    }))
}
