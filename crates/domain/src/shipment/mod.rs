//! Carrier shipments registered through the shipping aggregator.

mod aggregate;
mod events;
mod status;

pub use aggregate::{PackageDetails, Shipment};
pub use events::{
    ShipmentCancelledData, ShipmentEvent, ShipmentRegisteredData, ShipmentStatusUpdatedData,
};
pub use status::ShipmentStatus;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShipmentError {
    #[error("Shipment {0} is already registered")]
    AlreadyRegistered(String),

    #[error("Shipment has not been registered")]
    NotRegistered,

    /// Only shipments that have not been picked up can be cancelled.
    #[error("Shipment cannot be cancelled in {status} status")]
    NotCancellable { status: ShipmentStatus },
}
