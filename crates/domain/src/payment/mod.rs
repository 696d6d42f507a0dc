//! Gateway payment records and signature verification.

mod events;
mod record;
mod signature;

pub use events::{
    PaymentEvent, PaymentIntentOpenedData, PaymentRejectedData, PaymentVerifiedData,
};
pub use record::{PaymentRecord, PaymentStatus};
pub use signature::SignatureVerifier;

use thiserror::Error;

/// Errors that can occur on a payment record.
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("Payment intent {0} already opened")]
    AlreadyOpened(String),

    #[error("No payment intent has been opened")]
    NotOpened,

    /// A different payment already settled this intent.
    #[error("Payment intent already verified with payment {gateway_payment_id}")]
    AlreadyVerified { gateway_payment_id: String },

    #[error("Payment intent belongs to a different order")]
    OrderMismatch,
}
