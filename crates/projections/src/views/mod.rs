//! Read model views for the query side.

pub mod orders;
pub mod reviews;

pub use orders::{OrderFilter, OrdersView};
pub use reviews::{ProductReviews, ProductReviewsView, RatingSummary};
