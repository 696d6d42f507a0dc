//! HTTP handlers, one module per resource.

pub mod catalog;
pub mod orders;
pub mod payments;
pub mod reviews;
pub mod sessions;
pub mod shipments;
pub mod system;

use common::AggregateId;
use domain::{Actor, Role};

use crate::error::ApiError;

fn parse_id(id: &str) -> Result<AggregateId, ApiError> {
    id.parse()
        .map_err(|e| ApiError::BadRequest(format!("invalid id {id:?}: {e}")))
}

fn require_admin(actor: &Actor) -> Result<(), ApiError> {
    if actor.role == Role::Admin {
        Ok(())
    } else {
        Err(ApiError::Forbidden("admin session required".to_string()))
    }
}
