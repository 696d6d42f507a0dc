//! Shipment tracking statuses and the carrier vocabulary.

use serde::{Deserialize, Serialize};

use crate::order::OrderStatus;

/// Tracking status of a shipment.
///
/// Statuses only move forward. `Cancelled` is reachable before pickup and
/// `Returned` (return to origin) after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentStatus {
    #[default]
    AwbAssigned,
    PickupScheduled,
    PickedUp,
    InTransit,
    OutForDelivery,
    Delivered,
    Cancelled,
    Returned,
}

impl ShipmentStatus {
    /// Maps an aggregator status label onto a tracking status.
    ///
    /// Labels are matched case-insensitively with `_`/`-` treated as spaces.
    /// Unknown labels return None.
    pub fn from_carrier(label: &str) -> Option<ShipmentStatus> {
        let normalized = label
            .trim()
            .to_ascii_uppercase()
            .replace(['_', '-'], " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");

        let status = match normalized.as_str() {
            "AWB ASSIGNED" | "NEW" | "READY TO SHIP" => ShipmentStatus::AwbAssigned,
            "PICKUP SCHEDULED" | "PICKUP GENERATED" | "PICKUP QUEUED" | "OUT FOR PICKUP"
            | "PICKUP RESCHEDULED" => ShipmentStatus::PickupScheduled,
            "PICKED UP" | "SHIPPED" => ShipmentStatus::PickedUp,
            "IN TRANSIT" | "REACHED AT DESTINATION HUB" | "REACHED DESTINATION HUB"
            | "UNDELIVERED" | "DELAYED" => ShipmentStatus::InTransit,
            "OUT FOR DELIVERY" => ShipmentStatus::OutForDelivery,
            "DELIVERED" => ShipmentStatus::Delivered,
            "CANCELED" | "CANCELLED" | "CANCELLATION REQUESTED" => ShipmentStatus::Cancelled,
            "RTO INITIATED" | "RTO IN TRANSIT" | "RTO DELIVERED" | "RTO OFD" => {
                ShipmentStatus::Returned
            }
            _ => return None,
        };
        Some(status)
    }

    /// The order status a shipment in this status implies, if any.
    pub fn order_status(&self) -> Option<OrderStatus> {
        match self {
            ShipmentStatus::AwbAssigned | ShipmentStatus::PickupScheduled => {
                Some(OrderStatus::Processing)
            }
            ShipmentStatus::PickedUp | ShipmentStatus::InTransit | ShipmentStatus::OutForDelivery => {
                Some(OrderStatus::Shipped)
            }
            ShipmentStatus::Delivered => Some(OrderStatus::Delivered),
            ShipmentStatus::Cancelled | ShipmentStatus::Returned => None,
        }
    }

    /// Position along the delivery path; None for the off-path statuses.
    fn rank(&self) -> Option<u8> {
        match self {
            ShipmentStatus::AwbAssigned => Some(0),
            ShipmentStatus::PickupScheduled => Some(1),
            ShipmentStatus::PickedUp => Some(2),
            ShipmentStatus::InTransit => Some(3),
            ShipmentStatus::OutForDelivery => Some(4),
            ShipmentStatus::Delivered => Some(5),
            ShipmentStatus::Cancelled | ShipmentStatus::Returned => None,
        }
    }

    /// Returns true if the shipment has not left the merchant yet.
    pub fn is_cancellable(&self) -> bool {
        matches!(
            self,
            ShipmentStatus::AwbAssigned | ShipmentStatus::PickupScheduled
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ShipmentStatus::Delivered | ShipmentStatus::Cancelled | ShipmentStatus::Returned
        )
    }

    /// Returns true if moving to `next` is forward progress.
    pub fn can_advance_to(&self, next: ShipmentStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            ShipmentStatus::Cancelled => self.is_cancellable(),
            ShipmentStatus::Returned => !self.is_cancellable(),
            _ => matches!((self.rank(), next.rank()), (Some(a), Some(b)) if b > a),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ShipmentStatus::AwbAssigned => "awb_assigned",
            ShipmentStatus::PickupScheduled => "pickup_scheduled",
            ShipmentStatus::PickedUp => "picked_up",
            ShipmentStatus::InTransit => "in_transit",
            ShipmentStatus::OutForDelivery => "out_for_delivery",
            ShipmentStatus::Delivered => "delivered",
            ShipmentStatus::Cancelled => "cancelled",
            ShipmentStatus::Returned => "returned",
        }
    }
}

impl std::fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
