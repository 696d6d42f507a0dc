//! Order commands.

use common::AggregateId;

use crate::actor::Actor;
use crate::command::Command;
use crate::value_objects::ShippingAddress;

use super::{CartItem, Order, OrderStatus};

/// Command to place an order from a cart.
#[derive(Debug, Clone)]
pub struct PlaceOrder {
    /// The order ID to create.
    pub order_id: AggregateId,

    /// The customer placing the order.
    pub actor: Actor,

    /// Requested lines; prices are looked up server-side.
    pub items: Vec<CartItem>,

    pub address: ShippingAddress,
}

impl PlaceOrder {
    /// Creates a new PlaceOrder command with a generated order ID.
    pub fn new(actor: Actor, items: Vec<CartItem>, address: ShippingAddress) -> Self {
        Self {
            order_id: AggregateId::new(),
            actor,
            items,
            address,
        }
    }
}

impl Command for PlaceOrder {
    type Aggregate = Order;

    fn aggregate_id(&self) -> AggregateId {
        self.order_id
    }
}

/// Command to move an order along the status table.
#[derive(Debug, Clone)]
pub struct UpdateStatus {
    pub order_id: AggregateId,
    pub status: OrderStatus,
    pub actor: Actor,
}

impl Command for UpdateStatus {
    type Aggregate = Order;

    fn aggregate_id(&self) -> AggregateId {
        self.order_id
    }
}

/// Command to cancel an order and return its stock.
#[derive(Debug, Clone)]
pub struct CancelOrder {
    pub order_id: AggregateId,
    pub actor: Actor,
    pub reason: String,
}

impl Command for CancelOrder {
    type Aggregate = Order;

    fn aggregate_id(&self) -> AggregateId {
        self.order_id
    }
}

/// Command to replace the delivery address.
#[derive(Debug, Clone)]
pub struct ChangeAddress {
    pub order_id: AggregateId,
    pub actor: Actor,
    pub address: ShippingAddress,
}

impl Command for ChangeAddress {
    type Aggregate = Order;

    fn aggregate_id(&self) -> AggregateId {
        self.order_id
    }
}
