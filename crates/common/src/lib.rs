//! Shared identifier types used across the storefront crates.

mod types;

pub use types::{AggregateId, IdNamespace};
