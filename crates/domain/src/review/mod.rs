//! Customer reviews and likes.

mod aggregate;
mod events;
mod policy;
mod service;

pub use aggregate::Review;
pub use events::{ReviewEvent, ReviewLikedData, ReviewSubmittedData};
pub use policy::{LikePolicy, Rating};
pub use service::{ReviewService, SubmitReview};

use async_trait::async_trait;
use thiserror::Error;

use crate::error::DomainError;
use crate::value_objects::{ProductId, UserId};

#[derive(Debug, Error)]
pub enum ReviewError {
    /// Only customers with a delivered order line may review a product.
    #[error("User {user_id} has no delivered order for product {product_id}")]
    NotEligible {
        user_id: UserId,
        product_id: ProductId,
    },

    #[error("Rating must be between 1 and 5, got {0}")]
    InvalidRating(u8),

    #[error("User {user_id} already reviewed product {product_id}")]
    DuplicateReview {
        user_id: UserId,
        product_id: ProductId,
    },

    #[error("Review has not been submitted")]
    NotSubmitted,
}

/// Answers whether a customer received a product.
#[async_trait]
pub trait PurchaseHistory: Send + Sync {
    async fn has_delivered(
        &self,
        user_id: &UserId,
        product_id: &ProductId,
    ) -> Result<bool, DomainError>;
}
