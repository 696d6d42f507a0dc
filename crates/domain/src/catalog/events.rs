//! Product domain events.

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::value_objects::{Money, ProductId};

/// Events that can occur on a product aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ProductEvent {
    ProductListed(ProductListedData),
    ProductRevised(ProductRevisedData),
    StockAdjusted(StockAdjustedData),
    /// Units taken for an order at checkout.
    StockReserved(StockMovementData),
    /// Units returned when an order is cancelled.
    StockReleased(StockMovementData),
}

impl DomainEvent for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::ProductListed(_) => "ProductListed",
            ProductEvent::ProductRevised(_) => "ProductRevised",
            ProductEvent::StockAdjusted(_) => "StockAdjusted",
            ProductEvent::StockReserved(_) => "StockReserved",
            ProductEvent::StockReleased(_) => "StockReleased",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductListedData {
    pub id: AggregateId,
    pub product_id: ProductId,
    pub name: String,
    pub price: Money,
    pub image: Option<String>,
    pub weight_grams: u32,
    pub listed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductRevisedData {
    pub name: String,
    pub price: Money,
    pub image: Option<String>,
    pub weight_grams: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockAdjustedData {
    pub delta: i64,
    pub stock_after: u32,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockMovementData {
    pub order_id: AggregateId,
    pub quantity: u32,
    pub stock_after: u32,
}
