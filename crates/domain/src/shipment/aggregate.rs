//! Shipment aggregate, one stream per AWB.

use chrono::{DateTime, Utc};
use common::{AggregateId, IdNamespace};
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;
use crate::value_objects::UserId;

use super::{
    ShipmentCancelledData, ShipmentError, ShipmentEvent, ShipmentRegisteredData, ShipmentStatus,
    ShipmentStatusUpdatedData,
};

/// Parcel dimensions sent to the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PackageDetails {
    pub length_cm: u32,
    pub breadth_cm: u32,
    pub height_cm: u32,
    pub weight_grams: u32,
}

impl PackageDetails {
    /// Default box for herbal products, weighed by the order's lines.
    pub fn standard_box(weight_grams: u32) -> Self {
        Self {
            length_cm: 20,
            breadth_cm: 15,
            height_cm: 10,
            weight_grams: weight_grams.max(100),
        }
    }

    /// Weight in kilograms as the aggregator expects it.
    pub fn weight_kg(&self) -> f64 {
        f64::from(self.weight_grams) / 1000.0
    }
}

#[derive(Debug, Clone, Default)]
pub struct Shipment {
    id: Option<AggregateId>,
    version: Version,
    awb: String,
    order_id: Option<AggregateId>,
    courier: String,
    aggregator_order_id: String,
    aggregator_shipment_id: String,
    pickup_location: String,
    package: PackageDetails,
    status: ShipmentStatus,
    carrier_status: Option<String>,
    registered_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    cancellation_reason: Option<String>,
}

impl Shipment {
    /// Stream id of the shipment carrying an AWB.
    pub fn stream_id(awb: &str) -> AggregateId {
        AggregateId::derived(IdNamespace::Shipment, awb)
    }
}

impl Aggregate for Shipment {
    type Event = ShipmentEvent;
    type Error = ShipmentError;

    fn aggregate_type() -> &'static str {
        "Shipment"
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
            ShipmentEvent::ShipmentRegistered(data) => {
                self.id = Some(data.id);
                self.awb = data.awb;
                self.order_id = Some(data.order_id);
                self.courier = data.courier;
                self.aggregator_order_id = data.aggregator_order_id;
                self.aggregator_shipment_id = data.aggregator_shipment_id;
                self.pickup_location = data.pickup_location;
                self.package = data.package;
                self.status = ShipmentStatus::AwbAssigned;
                self.registered_at = Some(data.registered_at);
                self.updated_at = Some(data.registered_at);
            }
            ShipmentEvent::ShipmentStatusUpdated(data) => {
                self.status = data.to;
                self.carrier_status = Some(data.carrier_status);
                self.updated_at = Some(data.updated_at);
            }
            ShipmentEvent::ShipmentCancelled(data) => {
                self.status = ShipmentStatus::Cancelled;
                self.cancellation_reason = Some(data.reason);
                self.updated_at = Some(data.cancelled_at);
            }
        }
    }
}

// Query methods
impl Shipment {
    /// Returns the air waybill number.
    pub fn awb(&self) -> &str {
        &self.awb
    }

    /// Returns the order this parcel belongs to.
    pub fn order_id(&self) -> Option<AggregateId> {
        self.order_id
    }

    /// Returns the courier name.
    pub fn courier(&self) -> &str {
        &self.courier
    }

    /// Returns the aggregator's order ID.
    pub fn aggregator_order_id(&self) -> &str {
        &self.aggregator_order_id
    }

    /// Returns the aggregator's shipment ID.
    pub fn aggregator_shipment_id(&self) -> &str {
        &self.aggregator_shipment_id
    }

    /// Returns the pickup location name.
    pub fn pickup_location(&self) -> &str {
        &self.pickup_location
    }

    /// Returns the package dimensions and weight.
    pub fn package(&self) -> PackageDetails {
        self.package
    }

    /// Returns the current shipment status.
    pub fn status(&self) -> ShipmentStatus {
        self.status
    }

    /// Last raw status label received from the carrier.
    pub fn carrier_status(&self) -> Option<&str> {
        self.carrier_status.as_deref()
    }

    /// Returns when the AWB was assigned.
    pub fn registered_at(&self) -> Option<DateTime<Utc>> {
        self.registered_at
    }

    /// Returns when the shipment last changed.
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// Returns why the shipment was cancelled, if it was.
    pub fn cancellation_reason(&self) -> Option<&str> {
        self.cancellation_reason.as_deref()
    }
}

// Command methods (return events)
impl Shipment {
    #[allow(clippy::too_many_arguments)]
    pub fn register(
        &self,
        awb: &str,
        order_id: AggregateId,
        courier: &str,
        aggregator_order_id: &str,
        aggregator_shipment_id: &str,
        pickup_location: &str,
        package: PackageDetails,
    ) -> Result<Vec<ShipmentEvent>, ShipmentError> {
        if self.exists() {
            return Err(ShipmentError::AlreadyRegistered(awb.to_string()));
        }
        Ok(vec![ShipmentEvent::ShipmentRegistered(
            ShipmentRegisteredData {
                id: Shipment::stream_id(awb),
                awb: awb.to_string(),
                order_id,
                courier: courier.to_string(),
                aggregator_order_id: aggregator_order_id.to_string(),
                aggregator_shipment_id: aggregator_shipment_id.to_string(),
                pickup_location: pickup_location.to_string(),
                package,
                registered_at: Utc::now(),
            },
        )])
    }

    /// Records a carrier status. Regressions, repeats and updates after a
    /// terminal status produce no events.
    pub fn record_carrier_status(
        &self,
        next: ShipmentStatus,
        carrier_status: &str,
    ) -> Result<Vec<ShipmentEvent>, ShipmentError> {
        if !self.exists() {
            return Err(ShipmentError::NotRegistered);
        }
        if !self.status.can_advance_to(next) {
            return Ok(vec![]);
        }
        Ok(vec![ShipmentEvent::ShipmentStatusUpdated(
            ShipmentStatusUpdatedData {
                from: self.status,
                to: next,
                carrier_status: carrier_status.to_string(),
                updated_at: Utc::now(),
            },
        )])
    }

    pub fn cancel(
        &self,
        reason: &str,
        cancelled_by: &UserId,
    ) -> Result<Vec<ShipmentEvent>, ShipmentError> {
        if !self.exists() {
            return Err(ShipmentError::NotRegistered);
        }
        if !self.status.is_cancellable() {
            return Err(ShipmentError::NotCancellable {
                status: self.status,
            });
        }
        Ok(vec![ShipmentEvent::ShipmentCancelled(ShipmentCancelledData {
            from: self.status,
            reason: reason.to_string(),
            cancelled_by: cancelled_by.clone(),
            cancelled_at: Utc::now(),
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registered() -> Shipment {
        let mut shipment = Shipment::default();
        let events = shipment
            .register(
                "AWB123",
                AggregateId::new(),
                "Delhivery",
                "SR-1",
                "SHP-1",
                "Primary",
                PackageDetails::standard_box(450),
            )
            .unwrap();
        shipment.apply_events(events);
        shipment
    }

    #[test]
    fn register_sets_awb_assigned() {
        let shipment = registered();
        assert_eq!(shipment.status(), ShipmentStatus::AwbAssigned);
        assert_eq!(shipment.id(), Some(Shipment::stream_id("AWB123")));
        assert_eq!(shipment.package().weight_grams, 450);
        assert!(matches!(
            shipment.register(
                "AWB123",
                AggregateId::new(),
                "Delhivery",
                "SR-1",
                "SHP-1",
                "Primary",
                PackageDetails::default()
            ),
            Err(ShipmentError::AlreadyRegistered(_))
        ));
    }

    #[test]
    fn regressions_are_ignored() {
        let mut shipment = registered();
        shipment.apply_events(
            shipment
                .record_carrier_status(ShipmentStatus::InTransit, "IN TRANSIT")
                .unwrap(),
        );
        assert_eq!(shipment.carrier_status(), Some("IN TRANSIT"));

        let events = shipment
            .record_carrier_status(ShipmentStatus::PickedUp, "PICKED UP")
            .unwrap();
        assert!(events.is_empty());
        assert_eq!(shipment.status(), ShipmentStatus::InTransit);
    }

    #[test]
    fn cancel_only_before_pickup() {
        let mut shipment = registered();
        let by = UserId::new("admin");
        let events = shipment.cancel("customer request", &by).unwrap();
        assert_eq!(events.len(), 1);

        shipment.apply_events(
            shipment
                .record_carrier_status(ShipmentStatus::PickedUp, "PICKED UP")
                .unwrap(),
        );
        assert!(matches!(
            shipment.cancel("too late", &by),
            Err(ShipmentError::NotCancellable {
                status: ShipmentStatus::PickedUp
            })
        ));
    }

    #[test]
    fn unregistered_shipment_rejects_commands() {
        let shipment = Shipment::default();
        assert!(matches!(
            shipment.record_carrier_status(ShipmentStatus::Delivered, "DELIVERED"),
            Err(ShipmentError::NotRegistered)
        ));
    }

    #[test]
    fn standard_box_has_minimum_weight() {
        assert_eq!(PackageDetails::standard_box(20).weight_grams, 100);
        assert!((PackageDetails::standard_box(1500).weight_kg() - 1.5).abs() < f64::EPSILON);
    }
}
