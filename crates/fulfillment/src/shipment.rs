//! Shipment coordination with the shipping aggregator.

use std::time::Duration;

use chrono::Utc;
use common::AggregateId;
use domain::order::{CancelOrder, Order, OrderService};
use domain::shipment::{PackageDetails, Shipment, ShipmentStatus};
use domain::{Actor, Aggregate, CommandHandler, UnitOfWork, retry_on_conflict};
use event_store::EventStore;

use crate::apply_committed;
use crate::error::{FulfillmentError, Result};
use crate::services::{
    AdhocItem, AdhocOrderRequest, AwbAssignment, ServiceabilityQuery, ShippingAggregator,
};
use crate::upstream;

const SERVICE: &str = "shipping_aggregator";

/// Where parcels are collected from.
#[derive(Debug, Clone)]
pub struct PickupConfig {
    /// Pickup location name as registered with the aggregator.
    pub location: String,
    pub postcode: String,
}

/// A carrier status report for one AWB.
#[derive(Debug, Clone)]
pub struct TrackingUpdate {
    pub awb: String,
    pub carrier_status: String,
    pub actor: Actor,
}

#[derive(Debug, Clone)]
pub struct CancelShipment {
    pub awb: String,
    pub actor: Actor,
    pub reason: String,
    /// Also cancel the order once the shipment is withdrawn.
    pub cancel_order: bool,
}

/// Registers parcels for paid orders and keeps orders in step with the
/// carrier.
pub struct ShipmentCoordinator<S, A>
where
    S: EventStore + Clone,
    A: ShippingAggregator,
{
    orders: CommandHandler<S, Order>,
    order_service: OrderService<S>,
    shipments: CommandHandler<S, Shipment>,
    aggregator: A,
    pickup: PickupConfig,
    timeout: Duration,
}

impl<S, A> ShipmentCoordinator<S, A>
where
    S: EventStore + Clone,
    A: ShippingAggregator,
{
    pub fn new(store: S, aggregator: A, pickup: PickupConfig, timeout: Duration) -> Self {
        Self {
            orders: CommandHandler::new(store.clone()),
            order_service: OrderService::new(store.clone()),
            shipments: CommandHandler::new(store),
            aggregator,
            pickup,
            timeout,
        }
    }

    /// Books a parcel for a paid order and attaches its AWB.
    ///
    /// If the local commit fails after the AWB was assigned, the AWB is
    /// cancelled at the aggregator before the error is returned.
    #[tracing::instrument(skip(self, actor), fields(order_id = %order_id))]
    pub async fn register_shipment(&self, order_id: AggregateId, actor: &Actor) -> Result<Shipment> {
        require_merchant(actor)?;
        let order = self.require_order(order_id).await?;
        order.ensure_shippable()?;
        let address = order
            .address()
            .cloned()
            .ok_or(FulfillmentError::OrderNotFound(order_id))?;

        let package = PackageDetails::standard_box(order.total_weight_grams());
        let query = ServiceabilityQuery {
            pickup_postcode: self.pickup.postcode.clone(),
            delivery_postcode: address.postcode.clone(),
            weight_kg: package.weight_kg(),
            cash_on_delivery: false,
        };
        let courier = self
            .upstream("check_serviceability", self.aggregator.check_serviceability(&query))
            .await?
            .ok_or_else(|| FulfillmentError::NotServiceable {
                postcode: address.postcode.clone(),
            })?;

        let request = AdhocOrderRequest {
            order_ref: order_id.to_string(),
            order_date: order.placed_at().unwrap_or_else(Utc::now),
            pickup_location: self.pickup.location.clone(),
            address,
            items: order
                .lines()
                .iter()
                .map(|line| AdhocItem {
                    name: line.name.clone(),
                    sku: line.product_id.to_string(),
                    units: line.quantity,
                    unit_price_minor: line.unit_price.minor(),
                })
                .collect(),
            subtotal_minor: order.subtotal().minor(),
            package,
        };
        let booked = self
            .upstream("create_adhoc_order", self.aggregator.create_adhoc_order(&request))
            .await?;
        let assignment = self
            .upstream(
                "assign_awb",
                self.aggregator.assign_awb(&booked.shipment_id, courier.courier_id),
            )
            .await?;

        let committed = retry_on_conflict("register_shipment", || {
            self.try_register(order_id, actor, &booked.order_id, &booked.shipment_id, &assignment, package)
        })
        .await;

        match committed {
            Ok(shipment) => {
                tracing::info!(awb = %shipment.awb(), courier = %shipment.courier(), "shipment registered");
                metrics::counter!("shipments_registered_total").increment(1);
                Ok(shipment)
            }
            Err(err) => {
                self.cancel_orphan(&assignment.awb).await;
                Err(err)
            }
        }
    }

    async fn try_register(
        &self,
        order_id: AggregateId,
        actor: &Actor,
        aggregator_order_id: &str,
        aggregator_shipment_id: &str,
        assignment: &AwbAssignment,
        package: PackageDetails,
    ) -> Result<Shipment> {
        let order = self.require_order(order_id).await?;
        let shipment_id = Shipment::stream_id(&assignment.awb);
        let mut shipment = self.shipments.load(shipment_id).await?;

        let order_events =
            order.attach_shipment(&assignment.awb, &assignment.courier_name, &actor.user_id)?;
        let shipment_events = shipment.register(
            &assignment.awb,
            order_id,
            &assignment.courier_name,
            aggregator_order_id,
            aggregator_shipment_id,
            &self.pickup.location,
            package,
        )?;

        let mut uow = UnitOfWork::new();
        uow.record::<Shipment>(shipment_id, shipment.version(), &shipment_events)?;
        uow.record::<Order>(order_id, order.version(), &order_events)?;
        uow.commit(self.orders.store()).await?;

        apply_committed(&mut shipment, shipment_events);
        Ok(shipment)
    }

    async fn cancel_orphan(&self, awb: &str) {
        let awbs = [awb.to_string()];
        match self
            .upstream("cancel_awbs", self.aggregator.cancel_awbs(&awbs))
            .await
        {
            Ok(()) => tracing::warn!(awb, "cancelled AWB that could not be attached"),
            Err(e) => tracing::error!(awb, error = %e, "orphan AWB left at aggregator"),
        }
        metrics::counter!("shipments_orphaned_total").increment(1);
    }

    /// Applies a carrier status to the shipment and its order.
    ///
    /// Unknown statuses and regressions are logged and leave everything
    /// unchanged. A cancellation reported by the carrier withdraws the
    /// shipment without cancelling the order.
    #[tracing::instrument(skip(self, update), fields(awb = %update.awb, carrier_status = %update.carrier_status))]
    pub async fn update_tracking_status(&self, update: TrackingUpdate) -> Result<Order> {
        require_merchant(&update.actor)?;
        let shipment = self.require_shipment(&update.awb).await?;
        let order_id = shipment
            .order_id()
            .ok_or_else(|| FulfillmentError::ShipmentNotFound(update.awb.clone()))?;

        let Some(next) = ShipmentStatus::from_carrier(&update.carrier_status) else {
            tracing::warn!("ignoring unrecognised carrier status");
            metrics::counter!("carrier_statuses_ignored_total").increment(1);
            return self.require_order(order_id).await;
        };

        let order = retry_on_conflict("update_tracking_status", || {
            self.try_track(order_id, &update, next)
        })
        .await?;

        metrics::counter!("carrier_status_updates_total", "status" => next.as_str()).increment(1);
        Ok(order)
    }

    async fn try_track(
        &self,
        order_id: AggregateId,
        update: &TrackingUpdate,
        next: ShipmentStatus,
    ) -> Result<Order> {
        let shipment_id = Shipment::stream_id(&update.awb);
        let shipment = self.shipments.load(shipment_id).await?;
        let mut order = self.require_order(order_id).await?;

        let shipment_events = shipment.record_carrier_status(next, &update.carrier_status)?;
        if shipment_events.is_empty() {
            tracing::debug!(current = %shipment.status(), "carrier status does not advance shipment");
            return Ok(order);
        }

        let order_events = if next == ShipmentStatus::Cancelled {
            order.withdraw_shipment(&update.awb, "cancelled by carrier")?
        } else {
            order.follow_carrier(
                &update.awb,
                &update.carrier_status,
                next.order_status(),
                &update.actor.user_id,
            )?
        };

        let mut uow = UnitOfWork::new();
        uow.record::<Shipment>(shipment_id, shipment.version(), &shipment_events)?;
        uow.record::<Order>(order_id, order.version(), &order_events)?;
        uow.commit(self.orders.store()).await?;

        tracing::info!(from = %shipment.status(), to = %next, "shipment status updated");
        apply_committed(&mut order, order_events);
        Ok(order)
    }

    /// Cancels a shipment that has not been picked up yet.
    ///
    /// The order goes back to paid; it is cancelled too only when the
    /// command asks for it.
    #[tracing::instrument(skip(self, cmd), fields(awb = %cmd.awb, cancel_order = cmd.cancel_order))]
    pub async fn cancel_shipment(&self, cmd: CancelShipment) -> Result<(Shipment, Order)> {
        require_merchant(&cmd.actor)?;
        let shipment = self.require_shipment(&cmd.awb).await?;
        if !shipment.status().is_cancellable() {
            return Err(FulfillmentError::ShipmentNotCancellable {
                status: shipment.status(),
            });
        }
        let order_id = shipment
            .order_id()
            .ok_or_else(|| FulfillmentError::ShipmentNotFound(cmd.awb.clone()))?;

        // Both streams must accept the cancellation before the carrier is told.
        let order = self.require_order(order_id).await?;
        shipment.cancel(&cmd.reason, &cmd.actor.user_id)?;
        if let Err(e) = order.withdraw_shipment(&cmd.awb, cmd.reason.clone()) {
            tracing::warn!(order_status = %order.status(), error = %e, "order cannot release shipment");
            return Err(FulfillmentError::ShipmentNotCancellable {
                status: shipment.status(),
            });
        }

        let awbs = [cmd.awb.clone()];
        self.upstream("cancel_awbs", self.aggregator.cancel_awbs(&awbs))
            .await?;

        let (shipment, mut order) =
            retry_on_conflict("cancel_shipment", || self.try_cancel(order_id, &cmd)).await?;
        tracing::info!(reason = %cmd.reason, "shipment cancelled");
        metrics::counter!("shipments_cancelled_total").increment(1);

        if cmd.cancel_order {
            order = self
                .order_service
                .cancel_order(CancelOrder {
                    order_id,
                    actor: cmd.actor.clone(),
                    reason: cmd.reason.clone(),
                })
                .await?;
        }
        Ok((shipment, order))
    }

    async fn try_cancel(
        &self,
        order_id: AggregateId,
        cmd: &CancelShipment,
    ) -> Result<(Shipment, Order)> {
        let shipment_id = Shipment::stream_id(&cmd.awb);
        let mut shipment = self.shipments.load(shipment_id).await?;
        let mut order = self.require_order(order_id).await?;

        let shipment_events = shipment.cancel(&cmd.reason, &cmd.actor.user_id)?;
        let order_events = order.withdraw_shipment(&cmd.awb, cmd.reason.clone())?;

        let mut uow = UnitOfWork::new();
        uow.record::<Shipment>(shipment_id, shipment.version(), &shipment_events)?;
        uow.record::<Order>(order_id, order.version(), &order_events)?;
        uow.commit(self.orders.store()).await?;

        apply_committed(&mut shipment, shipment_events);
        apply_committed(&mut order, order_events);
        Ok((shipment, order))
    }

    pub async fn get_shipment(&self, awb: &str) -> Result<Option<Shipment>> {
        Ok(self.shipments.load_existing(Shipment::stream_id(awb)).await?)
    }

    async fn require_shipment(&self, awb: &str) -> Result<Shipment> {
        self.get_shipment(awb)
            .await?
            .ok_or_else(|| FulfillmentError::ShipmentNotFound(awb.to_string()))
    }

    async fn require_order(&self, order_id: AggregateId) -> Result<Order> {
        self.orders
            .load_existing(order_id)
            .await?
            .ok_or(FulfillmentError::OrderNotFound(order_id))
    }

    async fn upstream<T>(
        &self,
        operation: &'static str,
        request: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        upstream::call(SERVICE, operation, self.timeout, request).await
    }
}

fn require_merchant(actor: &Actor) -> Result<()> {
    if actor.is_merchant() {
        Ok(())
    } else {
        Err(FulfillmentError::Forbidden(
            "only merchants may manage shipments".to_string(),
        ))
    }
}
