//! Sellable products and their stock.
//!
//! Stock lives on the product's own stream, so reserving units for an order
//! is a conditional append against the product's version: two checkouts
//! racing for the last unit cannot both commit.

mod events;
mod product;
mod service;

pub use events::{
    ProductEvent, ProductListedData, ProductRevisedData, StockAdjustedData, StockMovementData,
};
pub use product::{Product, ProductDetails};
pub use service::{AdjustStock, CatalogService, UpsertProduct};

use thiserror::Error;

use crate::value_objects::ProductId;

/// Errors that can occur during catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Invalid product: {0}")]
    InvalidProduct(String),

    #[error("Product {0} is not listed")]
    NotListed(ProductId),

    #[error("Out of stock: {product_id} has {available} available, {requested} requested")]
    OutOfStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    #[error("Stock for {product_id} cannot go below zero (stock {stock}, change {delta})")]
    NegativeStock {
        product_id: ProductId,
        stock: u32,
        delta: i64,
    },
}
