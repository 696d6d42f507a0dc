//! Value objects for the order domain.

use serde::{Deserialize, Serialize};

use crate::value_objects::{Money, ProductId};

/// A line as requested by the client at checkout. Prices are never taken
/// from the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl CartItem {
    pub fn new(product_id: impl Into<ProductId>, quantity: u32) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
        }
    }
}

/// An order line with the catalog details captured at order time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub name: String,
    pub image: Option<String>,
    pub unit_price: Money,
    pub quantity: u32,
    pub weight_grams: u32,
}

impl OrderLine {
    /// Returns the total price for this line (quantity * unit_price), or
    /// None when it does not fit in minor units.
    pub fn total_price(&self) -> Option<Money> {
        self.unit_price.checked_multiply(self.quantity)
    }
}

/// Gateway references of the payment that settled an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReference {
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
}

/// Merges duplicate cart lines for the same product, keeping first-seen
/// order.
pub fn merge_cart(items: &[CartItem]) -> Vec<CartItem> {
    let mut merged: Vec<CartItem> = Vec::with_capacity(items.len());
    for item in items {
        match merged.iter_mut().find(|m| m.product_id == item.product_id) {
            Some(existing) => existing.quantity = existing.quantity.saturating_add(item.quantity),
            None => merged.push(item.clone()),
        }
    }
    merged
}
