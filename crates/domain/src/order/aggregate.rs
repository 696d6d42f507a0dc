//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::AggregateId;
use event_store::Version;

use crate::aggregate::Aggregate;
use crate::value_objects::{Money, ShippingAddress, UserId};

use super::{
    OrderError, OrderEvent, OrderLine, OrderStatus, PaymentReference,
    events::{
        AddressChangedData, OrderCancelledData, OrderPaidData, OrderPlacedData,
        ShipmentAttachedData, ShipmentWithdrawnData, TrackingUpdatedData,
    },
};

/// The carrier shipment currently attached to an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveShipment {
    pub awb: String,
    pub courier: String,
}

/// Order aggregate root.
///
/// Represents an order from placement through payment, shipping and
/// delivery, or its cancellation.
#[derive(Debug, Clone, Default)]
pub struct Order {
    id: Option<AggregateId>,
    version: Version,
    user_id: Option<UserId>,
    status: OrderStatus,
    lines: Vec<OrderLine>,
    subtotal: Money,
    address: Option<ShippingAddress>,
    placed_at: Option<DateTime<Utc>>,
    payment: Option<PaymentReference>,
    amount_paid: Money,
    active_shipment: Option<ActiveShipment>,
    tracking_status: Option<String>,
    cancellation_reason: Option<String>,
}

impl Aggregate for Order {
    type Event = OrderEvent;
    type Error = OrderError;

    fn aggregate_type() -> &'static str {
        "Order"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            OrderEvent::OrderPlaced(data) => self.apply_order_placed(data),
            OrderEvent::OrderPaid(data) => {
                self.payment = Some(data.payment);
                self.amount_paid = data.amount;
                self.status = OrderStatus::Paid;
            }
            OrderEvent::OrderStatusChanged(data) => self.status = data.to,
            OrderEvent::OrderCancelled(data) => {
                self.status = OrderStatus::Cancelled;
                self.cancellation_reason = Some(data.reason);
            }
            OrderEvent::AddressChanged(data) => self.address = Some(data.address),
            OrderEvent::ShipmentAttached(data) => {
                self.active_shipment = Some(ActiveShipment {
                    awb: data.awb,
                    courier: data.courier,
                });
            }
            OrderEvent::ShipmentWithdrawn(data) => {
                self.active_shipment = None;
                if let Some(status) = data.status_after {
                    self.status = status;
                }
            }
            OrderEvent::TrackingUpdated(data) => self.tracking_status = Some(data.carrier_status),
        }
    }
}

// Query methods
impl Order {
    pub fn user_id(&self) -> Option<&UserId> {
        self.user_id.as_ref()
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    /// Sum of line totals, computed from catalog prices at placement.
    pub fn subtotal(&self) -> Money {
        self.subtotal
    }

    pub fn address(&self) -> Option<&ShippingAddress> {
        self.address.as_ref()
    }

    pub fn placed_at(&self) -> Option<DateTime<Utc>> {
        self.placed_at
    }

    pub fn payment(&self) -> Option<&PaymentReference> {
        self.payment.as_ref()
    }

    pub fn amount_paid(&self) -> Money {
        self.amount_paid
    }

    pub fn active_shipment(&self) -> Option<&ActiveShipment> {
        self.active_shipment.as_ref()
    }

    pub fn tracking_status(&self) -> Option<&str> {
        self.tracking_status.as_deref()
    }

    pub fn cancellation_reason(&self) -> Option<&str> {
        self.cancellation_reason.as_deref()
    }

    /// Total shipping weight of all lines.
    pub fn total_weight_grams(&self) -> u32 {
        self.lines
            .iter()
            .map(|l| l.weight_grams.saturating_mul(l.quantity))
            .sum()
    }

    /// Returns true if the order is in a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn ensure_placed(&self) -> Result<(), OrderError> {
        if self.exists() {
            Ok(())
        } else {
            Err(OrderError::NotPlaced)
        }
    }
}

// Command methods (return events)
impl Order {
    /// Places a new order from already-priced lines.
    pub fn place(
        &self,
        order_id: AggregateId,
        user_id: UserId,
        lines: Vec<OrderLine>,
        address: ShippingAddress,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        if self.exists() {
            return Err(OrderError::AlreadyPlaced);
        }
        if lines.is_empty() {
            return Err(OrderError::EmptyOrder);
        }
        address.validate().map_err(OrderError::InvalidAddress)?;

        let subtotal = subtotal_of(&lines)?;
        Ok(vec![OrderEvent::OrderPlaced(OrderPlacedData {
            order_id,
            user_id,
            lines,
            subtotal,
            address,
            placed_at: Utc::now(),
        })])
    }

    /// Moves the order to `target` on an operator's request.
    ///
    /// `paid` is only reachable through payment verification and
    /// `cancelled` through [`Order::cancel`].
    pub fn request_status(
        &self,
        target: OrderStatus,
        requested_by: &UserId,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_placed()?;
        if target == OrderStatus::Paid {
            return Err(OrderError::PaymentRequired);
        }
        if !self.status.can_transition_to(target) || target == OrderStatus::Cancelled {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to: target,
            });
        }
        Ok(vec![OrderEvent::status_changed(
            self.status,
            target,
            requested_by,
        )])
    }

    /// Records a verified payment. Repeating the same payment is a no-op.
    pub fn mark_paid(
        &self,
        payment: PaymentReference,
        amount: Money,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_placed()?;
        if self.payment.as_ref() == Some(&payment) {
            return Ok(vec![]);
        }
        if self.status != OrderStatus::Pending {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to: OrderStatus::Paid,
            });
        }
        Ok(vec![OrderEvent::OrderPaid(OrderPaidData {
            payment,
            amount,
            paid_at: Utc::now(),
        })])
    }

    /// Cancels the order. The caller returns the reserved stock in the same
    /// commit.
    pub fn cancel(
        &self,
        reason: impl Into<String>,
        cancelled_by: &UserId,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_placed()?;
        if !self.status.can_cancel() {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to: OrderStatus::Cancelled,
            });
        }
        Ok(vec![OrderEvent::OrderCancelled(OrderCancelledData {
            from: self.status,
            reason: reason.into(),
            cancelled_by: cancelled_by.clone(),
            cancelled_at: Utc::now(),
        })])
    }

    /// Replaces the delivery address while the order has not been handed to
    /// a carrier.
    pub fn change_address(
        &self,
        address: ShippingAddress,
        changed_by: &UserId,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_placed()?;
        if !self.status.is_mutable() || self.active_shipment.is_some() {
            return Err(OrderError::Immutable {
                status: self.status,
            });
        }
        address.validate().map_err(OrderError::InvalidAddress)?;
        if self.address.as_ref() == Some(&address) {
            return Ok(vec![]);
        }
        Ok(vec![OrderEvent::AddressChanged(AddressChangedData {
            address,
            changed_by: changed_by.clone(),
        })])
    }

    /// Attaches a registered carrier shipment, moving a paid order to
    /// processing.
    pub fn attach_shipment(
        &self,
        awb: &str,
        courier: &str,
        attached_by: &UserId,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_shippable()?;

        let mut events = vec![OrderEvent::ShipmentAttached(ShipmentAttachedData {
            awb: awb.to_string(),
            courier: courier.to_string(),
        })];
        if self.status == OrderStatus::Paid {
            events.push(OrderEvent::status_changed(
                OrderStatus::Paid,
                OrderStatus::Processing,
                attached_by,
            ));
        }
        Ok(events)
    }

    /// Checks that a shipment may be registered for this order.
    pub fn ensure_shippable(&self) -> Result<(), OrderError> {
        self.ensure_placed()?;
        if !matches!(self.status, OrderStatus::Paid | OrderStatus::Processing) {
            return Err(OrderError::NotReadyForShipment {
                status: self.status,
            });
        }
        if let Some(active) = &self.active_shipment {
            return Err(OrderError::ShipmentAlreadyActive {
                awb: active.awb.clone(),
            });
        }
        Ok(())
    }

    /// Detaches the shipment `awb` after it was cancelled before pickup.
    /// A processing order goes back to paid; the order itself stays open.
    pub fn withdraw_shipment(
        &self,
        awb: &str,
        reason: impl Into<String>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_placed()?;
        let is_active = self.active_shipment.as_ref().is_some_and(|s| s.awb == awb);
        if !is_active {
            return Ok(vec![]);
        }
        if matches!(self.status, OrderStatus::Shipped | OrderStatus::Delivered) {
            return Err(OrderError::Immutable {
                status: self.status,
            });
        }

        let status_after = (self.status == OrderStatus::Processing).then_some(OrderStatus::Paid);
        Ok(vec![OrderEvent::ShipmentWithdrawn(ShipmentWithdrawnData {
            awb: awb.to_string(),
            reason: reason.into(),
            status_after,
        })])
    }

    /// Follows a carrier update for `awb`: records the raw status and walks
    /// the order forward, one table step at a time, up to `target`.
    ///
    /// Updates for a shipment that is not the active one, and targets behind
    /// the current status, change nothing but the tracking note.
    pub fn follow_carrier(
        &self,
        awb: &str,
        carrier_status: &str,
        target: Option<OrderStatus>,
        updated_by: &UserId,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_placed()?;
        let is_active = self.active_shipment.as_ref().is_some_and(|s| s.awb == awb);
        if !is_active {
            return Ok(vec![]);
        }

        let mut events = Vec::new();
        if self.tracking_status.as_deref() != Some(carrier_status) {
            events.push(OrderEvent::TrackingUpdated(TrackingUpdatedData {
                awb: awb.to_string(),
                carrier_status: carrier_status.to_string(),
                updated_at: Utc::now(),
            }));
        }

        if let Some(target) = target {
            let mut current = self.status;
            while current >= OrderStatus::Processing && current < target {
                let Some(next) = current.next_in_fulfilment() else {
                    break;
                };
                events.push(OrderEvent::status_changed(current, next, updated_by));
                current = next;
            }
        }

        Ok(events)
    }

    fn apply_order_placed(&mut self, data: OrderPlacedData) {
        self.id = Some(data.order_id);
        self.user_id = Some(data.user_id);
        self.lines = data.lines;
        self.subtotal = data.subtotal;
        self.address = Some(data.address);
        self.placed_at = Some(data.placed_at);
        self.status = OrderStatus::Pending;
    }
}

fn subtotal_of(lines: &[OrderLine]) -> Result<Money, OrderError> {
    lines.iter().try_fold(Money::zero(), |acc, line| {
        line.total_price()
            .and_then(|total| acc.checked_add(total))
            .ok_or_else(|| OrderError::InvalidItem {
                product_id: line.product_id.clone(),
                reason: "order total is too large".to_string(),
            })
    })
}
