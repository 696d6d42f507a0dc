//! Order domain events.

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::value_objects::{Money, ShippingAddress, UserId};

use super::{OrderLine, OrderStatus, PaymentReference};

/// Events that can occur on an order aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    /// Order was placed with server-priced lines.
    OrderPlaced(OrderPlacedData),

    /// A verified payment settled the order.
    OrderPaid(OrderPaidData),

    /// Status moved along the fulfilment path.
    OrderStatusChanged(OrderStatusChangedData),

    /// Order was cancelled and its stock returned.
    OrderCancelled(OrderCancelledData),

    /// Delivery address was replaced before shipping.
    AddressChanged(AddressChangedData),

    /// A carrier shipment became the order's active shipment.
    ShipmentAttached(ShipmentAttachedData),

    /// The active shipment was cancelled before pickup.
    ShipmentWithdrawn(ShipmentWithdrawnData),

    /// Latest raw carrier status for the active shipment.
    TrackingUpdated(TrackingUpdatedData),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced(_) => "OrderPlaced",
            OrderEvent::OrderPaid(_) => "OrderPaid",
            OrderEvent::OrderStatusChanged(_) => "OrderStatusChanged",
            OrderEvent::OrderCancelled(_) => "OrderCancelled",
            OrderEvent::AddressChanged(_) => "AddressChanged",
            OrderEvent::ShipmentAttached(_) => "ShipmentAttached",
            OrderEvent::ShipmentWithdrawn(_) => "ShipmentWithdrawn",
            OrderEvent::TrackingUpdated(_) => "TrackingUpdated",
        }
    }
}

impl OrderEvent {
    /// The status an order is in right after this event, when the event
    /// changes it.
    pub fn status_after(&self) -> Option<OrderStatus> {
        match self {
            OrderEvent::OrderPlaced(_) => Some(OrderStatus::Pending),
            OrderEvent::OrderPaid(_) => Some(OrderStatus::Paid),
            OrderEvent::OrderStatusChanged(data) => Some(data.to),
            OrderEvent::OrderCancelled(_) => Some(OrderStatus::Cancelled),
            OrderEvent::ShipmentWithdrawn(data) => data.status_after,
            OrderEvent::AddressChanged(_)
            | OrderEvent::ShipmentAttached(_)
            | OrderEvent::TrackingUpdated(_) => None,
        }
    }

    /// Creates a status change event stamped now.
    pub fn status_changed(from: OrderStatus, to: OrderStatus, changed_by: &UserId) -> Self {
        OrderEvent::OrderStatusChanged(OrderStatusChangedData {
            from,
            to,
            changed_by: changed_by.clone(),
            changed_at: Utc::now(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPlacedData {
    pub order_id: AggregateId,
    pub user_id: UserId,
    pub lines: Vec<OrderLine>,
    pub subtotal: Money,
    pub address: ShippingAddress,
    pub placed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPaidData {
    pub payment: PaymentReference,
    pub amount: Money,
    pub paid_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatusChangedData {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub changed_by: UserId,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCancelledData {
    pub from: OrderStatus,
    pub reason: String,
    pub cancelled_by: UserId,
    pub cancelled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressChangedData {
    pub address: ShippingAddress,
    pub changed_by: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipmentAttachedData {
    pub awb: String,
    pub courier: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipmentWithdrawnData {
    pub awb: String,
    pub reason: String,
    /// Set when withdrawing the shipment moved the order back to `paid`.
    pub status_after: Option<OrderStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingUpdatedData {
    pub awb: String,
    pub carrier_status: String,
    pub updated_at: DateTime<Utc>,
}
