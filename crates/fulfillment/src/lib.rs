//! Order fulfilment against third-party services.
//!
//! This crate coordinates the two steps of the order workflow that talk to
//! the outside world:
//! 1. Payment capture: open a gateway payment intent, then verify the
//!    signed callback and mark the order paid
//! 2. Shipment: register a parcel with the shipping aggregator, follow
//!    carrier tracking updates, cancel before pickup
//!
//! Upstream calls are bounded by a timeout and never retried internally;
//! local commits are atomic across the streams they touch.

pub mod error;
pub mod payment;
pub mod services;
pub mod shipment;
pub mod token;
mod upstream;

pub use error::{FulfillmentError, Result};
pub use payment::{PaymentCoordinator, PaymentIntent, VerifyPayment};
pub use services::{
    AdhocItem, AdhocOrder, AdhocOrderRequest, AwbAssignment, CourierOption, GatewayOrder,
    InMemoryPaymentGateway, InMemoryShippingAggregator, PaymentGateway, RazorpayConfig,
    RazorpayGateway, ServiceabilityQuery, ShippingAggregator, ShiprocketAggregator,
    ShiprocketConfig,
};
pub use shipment::{CancelShipment, PickupConfig, ShipmentCoordinator, TrackingUpdate};
pub use token::TokenCache;

use domain::Aggregate;
use event_store::Version;

/// Applies events that were just committed and advances the version.
pub(crate) fn apply_committed<A: Aggregate>(aggregate: &mut A, events: Vec<A::Event>) {
    if events.is_empty() {
        return;
    }
    let version = Version::new(aggregate.version().as_i64() + events.len() as i64);
    aggregate.apply_events(events);
    aggregate.set_version(version);
}
