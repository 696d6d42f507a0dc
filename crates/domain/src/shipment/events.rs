//! Shipment domain events.

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::value_objects::UserId;

use super::{PackageDetails, ShipmentStatus};

/// Events that can occur on a shipment aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ShipmentEvent {
    /// An AWB was assigned by the aggregator.
    ShipmentRegistered(ShipmentRegisteredData),

    /// The carrier reported progress.
    ShipmentStatusUpdated(ShipmentStatusUpdatedData),

    /// The merchant cancelled the shipment before pickup.
    ShipmentCancelled(ShipmentCancelledData),
}

impl DomainEvent for ShipmentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ShipmentEvent::ShipmentRegistered(_) => "ShipmentRegistered",
            ShipmentEvent::ShipmentStatusUpdated(_) => "ShipmentStatusUpdated",
            ShipmentEvent::ShipmentCancelled(_) => "ShipmentCancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipmentRegisteredData {
    pub id: AggregateId,
    pub awb: String,
    pub order_id: AggregateId,
    pub courier: String,
    pub aggregator_order_id: String,
    pub aggregator_shipment_id: String,
    pub pickup_location: String,
    pub package: PackageDetails,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipmentStatusUpdatedData {
    pub from: ShipmentStatus,
    pub to: ShipmentStatus,
    /// Status label exactly as the carrier sent it.
    pub carrier_status: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipmentCancelledData {
    pub from: ShipmentStatus,
    pub reason: String,
    pub cancelled_by: UserId,
    pub cancelled_at: DateTime<Utc>,
}
