//! Read models for the storefront query side.
//!
//! This crate provides:
//! - [`Projection`] trait for processing events into read models
//! - [`ReadModel`] trait for query access to denormalized data
//! - [`ProjectionProcessor`] paging the global event log into projections
//! - [`OrdersView`] for order listings and delivered-purchase lookups
//! - [`ProductReviewsView`] for per-product reviews and rating summaries
//! - [`QueryService`] tying the views to a store

pub mod error;
pub mod processor;
pub mod projection;
pub mod query;
pub mod read_model;
pub mod views;

pub use error::{ProjectionError, Result};
pub use processor::ProjectionProcessor;
pub use projection::{Projection, ProjectionPosition};
pub use query::QueryService;
pub use read_model::ReadModel;
pub use views::{
    OrderFilter, OrdersView, ProductReviews, ProductReviewsView, RatingSummary,
};
