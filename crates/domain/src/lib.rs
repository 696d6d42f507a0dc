//! Domain layer for the storefront.
//!
//! This crate provides the event-sourced aggregates behind the order
//! workflow:
//! - Aggregate trait, command handler and multi-stream unit of work
//! - Order aggregate with its status table
//! - Product aggregate holding sellable stock
//! - Payment record and signature verification
//! - Shipment aggregate and carrier status vocabulary
//! - Review aggregate and like policy

pub mod actor;
pub mod aggregate;
pub mod catalog;
pub mod command;
pub mod error;
pub mod order;
pub mod payment;
pub mod review;
pub mod shipment;
pub mod value_objects;

pub use actor::{Actor, Role};
pub use aggregate::{Aggregate, DomainEvent};
pub use command::{
    Command, CommandHandler, CommandResult, ConflictAware, MAX_COMMIT_ATTEMPTS, UnitOfWork,
    retry_on_conflict,
};
pub use error::DomainError;
pub use value_objects::{Money, ProductId, ShippingAddress, UserId};
