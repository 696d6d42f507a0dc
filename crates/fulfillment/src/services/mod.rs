//! Upstream service traits with sandbox and HTTP implementations.

pub mod gateway;
pub mod shipping;

pub use gateway::{
    GatewayOrder, InMemoryPaymentGateway, PaymentGateway, RazorpayConfig, RazorpayGateway,
};
pub use shipping::{
    AdhocItem, AdhocOrder, AdhocOrderRequest, AwbAssignment, CourierOption, InMemoryShippingAggregator,
    ServiceabilityQuery, ShippingAggregator, ShiprocketAggregator, ShiprocketConfig,
};
