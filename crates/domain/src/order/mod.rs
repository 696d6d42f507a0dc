//! Order aggregate and related types.

mod aggregate;
mod commands;
mod events;
mod service;
mod status;
mod value_objects;

pub use aggregate::{ActiveShipment, Order};
pub use commands::*;
pub use events::{
    AddressChangedData, OrderCancelledData, OrderEvent, OrderPaidData, OrderPlacedData,
    OrderStatusChangedData, ShipmentAttachedData, ShipmentWithdrawnData, TrackingUpdatedData,
};
pub use service::{HistoryEntry, OrderService};
pub use status::OrderStatus;
pub use value_objects::{CartItem, OrderLine, PaymentReference, merge_cart};

use thiserror::Error;

use crate::value_objects::ProductId;

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Order has no items.
    #[error("Order has no items")]
    EmptyOrder,

    /// A cart line names an unknown product or a zero quantity.
    #[error("Invalid item {product_id}: {reason}")]
    InvalidItem {
        product_id: ProductId,
        reason: String,
    },

    #[error("Invalid shipping address: {0}")]
    InvalidAddress(String),

    /// The requested status change is not in the transition table.
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// Only a verified payment can move an order to paid.
    #[error("Orders become paid only through payment verification")]
    PaymentRequired,

    #[error("Order can no longer be modified in {status} status")]
    Immutable { status: OrderStatus },

    #[error("Order is {status}; a shipment needs a paid order")]
    NotReadyForShipment { status: OrderStatus },

    #[error("Order already has active shipment {awb}")]
    ShipmentAlreadyActive { awb: String },

    /// Order is already placed.
    #[error("Order already placed")]
    AlreadyPlaced,

    #[error("Order has not been placed")]
    NotPlaced,
}
