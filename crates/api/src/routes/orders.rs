//! Order placement, listing and status endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::order::{
    CancelOrder, CartItem, ChangeAddress, HistoryEntry, Order, OrderLine, OrderStatus,
    PaymentReference, PlaceOrder, UpdateStatus,
};
use domain::{Aggregate, Money, ShippingAddress, UserId};
use event_store::EventStore;
use projections::OrderFilter;
use serde::{Deserialize, Serialize};

use super::{parse_id, require_admin};
use crate::error::ApiError;
use crate::extract::{Params, Payload};
use crate::session::Session;
use crate::state::AppState;

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub items: Vec<CartItem>,
    pub address: ShippingAddress,
}

#[derive(Deserialize, Default)]
pub struct ListQuery {
    pub user_id: Option<String>,
    pub status: Option<OrderStatus>,
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
}

#[derive(Deserialize)]
pub struct StatusRequest {
    pub status: OrderStatus,
}

#[derive(Deserialize, Default)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct ShipmentSummary {
    pub awb: String,
    pub courier: String,
}

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: Option<AggregateId>,
    pub user_id: Option<UserId>,
    pub status: OrderStatus,
    pub lines: Vec<OrderLine>,
    pub subtotal: Money,
    pub amount_paid: Money,
    pub address: Option<ShippingAddress>,
    pub placed_at: Option<DateTime<Utc>>,
    pub payment: Option<PaymentReference>,
    pub shipment: Option<ShipmentSummary>,
    pub tracking_status: Option<String>,
    pub cancellation_reason: Option<String>,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id(),
            user_id: order.user_id().cloned(),
            status: order.status(),
            lines: order.lines().to_vec(),
            subtotal: order.subtotal(),
            amount_paid: order.amount_paid(),
            address: order.address().cloned(),
            placed_at: order.placed_at(),
            payment: order.payment().cloned(),
            shipment: order.active_shipment().map(|s| ShipmentSummary {
                awb: s.awb.clone(),
                courier: s.courier.clone(),
            }),
            tracking_status: order.tracking_status().map(str::to_string),
            cancellation_reason: order.cancellation_reason().map(str::to_string),
        }
    }
}

fn filter_from(query: ListQuery, user_id: Option<UserId>) -> OrderFilter {
    OrderFilter {
        user_id,
        status: query.status,
        limit: query.limit,
        offset: query.offset,
    }
}

// -- Handlers --

/// POST /orders: places an order priced from the catalog.
#[tracing::instrument(skip(state, session, req), fields(user_id = %session.actor.user_id))]
pub async fn create<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    session: Session,
    Payload(req): Payload<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let order = state
        .orders
        .place_order(PlaceOrder::new(session.actor, req.items, req.address))
        .await?;
    Ok((StatusCode::CREATED, Json(OrderResponse::from(&order))))
}

/// GET /orders: the caller's orders, newest first.
pub async fn list_mine<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    session: Session,
    Params(query): Params<ListQuery>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let filter = filter_from(query, Some(session.actor.user_id));
    let orders = state.queries.list_orders(&filter).await?;
    Ok(Json(orders.iter().map(OrderResponse::from).collect()))
}

/// GET /admin/orders: every order, optionally filtered by customer.
pub async fn list_all<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    session: Session,
    Params(mut query): Params<ListQuery>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    require_admin(&session.actor)?;
    let user_id = query.user_id.take().map(UserId::new);
    let orders = state
        .queries
        .list_orders(&filter_from(query, user_id))
        .await?;
    Ok(Json(orders.iter().map(OrderResponse::from).collect()))
}

/// GET /orders/{id}
#[tracing::instrument(skip(state, session))]
pub async fn get<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    session: Session,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state.orders.order_for(parse_id(&id)?, &session.actor).await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// GET /orders/{id}/history: recorded events, oldest first.
pub async fn history<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    session: Session,
    Path(id): Path<String>,
) -> Result<Json<Vec<HistoryEntry>>, ApiError> {
    let entries = state
        .orders
        .order_history(parse_id(&id)?, &session.actor)
        .await?;
    Ok(Json(entries))
}

/// POST /orders/{id}/status: merchant status change.
#[tracing::instrument(skip(state, session, req))]
pub async fn update_status<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    session: Session,
    Path(id): Path<String>,
    Payload(req): Payload<StatusRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state
        .orders
        .update_status(UpdateStatus {
            order_id: parse_id(&id)?,
            status: req.status,
            actor: session.actor,
        })
        .await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// POST /orders/{id}/cancel
#[tracing::instrument(skip(state, session, req))]
pub async fn cancel<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    session: Session,
    Path(id): Path<String>,
    Payload(req): Payload<CancelRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let reason = req
        .reason
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| "cancelled on request".to_string());
    let order = state
        .orders
        .cancel_order(CancelOrder {
            order_id: parse_id(&id)?,
            actor: session.actor,
            reason,
        })
        .await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// PUT /orders/{id}/address: allowed until the order ships.
#[tracing::instrument(skip(state, session, address))]
pub async fn change_address<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    session: Session,
    Path(id): Path<String>,
    Payload(address): Payload<ShippingAddress>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state
        .orders
        .change_address(ChangeAddress {
            order_id: parse_id(&id)?,
            actor: session.actor,
            address,
        })
        .await?;
    Ok(Json(OrderResponse::from(&order)))
}
