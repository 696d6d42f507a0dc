//! Product reviews view: reviews per product with a rating summary.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::AggregateId;
use domain::review::{Review, ReviewEvent};
use domain::{Aggregate, ProductId};
use event_store::EventEnvelope;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::Result;
use crate::projection::{Projection, ProjectionPosition};
use crate::read_model::ReadModel;

/// Count and mean of a product's ratings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RatingSummary {
    pub count: u64,
    /// Mean rating rounded to one decimal, 0.0 without reviews.
    pub average: f64,
}

impl RatingSummary {
    fn from_total(count: u64, total: u64) -> Self {
        if count == 0 {
            return Self::default();
        }
        let average = total as f64 / count as f64;
        Self {
            count,
            average: (average * 10.0).round() / 10.0,
        }
    }
}

/// Reviews of one product, newest first.
#[derive(Debug, Clone)]
pub struct ProductReviews {
    pub product_id: ProductId,
    pub reviews: Vec<Review>,
    pub summary: RatingSummary,
}

#[derive(Debug, Default)]
struct ReviewsState {
    reviews: HashMap<AggregateId, Review>,
    by_product: HashMap<ProductId, Vec<AggregateId>>,
    position: ProjectionPosition,
}

/// Reviews rebuilt from their event streams and grouped by product.
#[derive(Debug, Clone, Default)]
pub struct ProductReviewsView {
    state: Arc<RwLock<ReviewsState>>,
}

impl ProductReviewsView {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn product_reviews(&self, product_id: &ProductId) -> ProductReviews {
        let state = self.state.read().await;
        let mut reviews: Vec<Review> = state
            .by_product
            .get(product_id)
            .into_iter()
            .flatten()
            .filter_map(|id| state.reviews.get(id))
            .cloned()
            .collect();
        reviews.sort_by(|a, b| b.submitted_at().cmp(&a.submitted_at()));

        let total: u64 = reviews
            .iter()
            .filter_map(|r| r.rating())
            .map(|r| u64::from(r.value()))
            .sum();
        let summary = RatingSummary::from_total(reviews.len() as u64, total);

        ProductReviews {
            product_id: product_id.clone(),
            reviews,
            summary,
        }
    }
}

#[async_trait]
impl Projection for ProductReviewsView {
    fn name(&self) -> &'static str {
        "ProductReviewsView"
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        let mut state = self.state.write().await;
        if event.aggregate_type == Review::aggregate_type() {
            let review_event: ReviewEvent = serde_json::from_value(event.payload.clone())?;
            if let ReviewEvent::ReviewSubmitted(data) = &review_event {
                state
                    .by_product
                    .entry(data.product_id.clone())
                    .or_default()
                    .push(event.aggregate_id);
            }
            let review = state.reviews.entry(event.aggregate_id).or_default();
            review.apply(review_event);
            review.set_version(event.version);
        }
        state.position = state.position.advance_to(event.position);
        Ok(())
    }

    async fn position(&self) -> ProjectionPosition {
        self.state.read().await.position
    }

    async fn reset(&self) -> Result<()> {
        *self.state.write().await = ReviewsState::default();
        Ok(())
    }
}

impl ReadModel for ProductReviewsView {
    fn name(&self) -> &'static str {
        "ProductReviewsView"
    }

    fn count(&self) -> usize {
        self.state.try_read().map(|s| s.reviews.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use domain::review::{Rating, ReviewLikedData, ReviewSubmittedData};
    use domain::{DomainEvent, UserId};
    use event_store::Version;

    async fn push(
        view: &ProductReviewsView,
        position: i64,
        id: AggregateId,
        version: i64,
        event: ReviewEvent,
    ) {
        let mut envelope = EventEnvelope::builder()
            .aggregate_id(id)
            .aggregate_type("Review")
            .event_type(event.event_type())
            .version(Version::new(version))
            .payload(&event)
            .unwrap()
            .build()
            .unwrap();
        envelope.position = position;
        view.handle(&envelope).await.unwrap();
    }

    fn submitted(
        user: &str,
        sku: &str,
        rating: u8,
        minutes_ago: i64,
    ) -> (AggregateId, ReviewEvent) {
        let user_id = UserId::new(user);
        let product_id = ProductId::new(sku);
        let id = Review::stream_id(&user_id, &product_id);
        let event = ReviewEvent::ReviewSubmitted(ReviewSubmittedData {
            id,
            user_id,
            product_id,
            rating: Rating::try_from(rating).unwrap(),
            comment: "Calming before sleep".to_string(),
            verified_purchase: true,
            submitted_at: Utc::now() - Duration::minutes(minutes_ago),
        });
        (id, event)
    }

    #[tokio::test]
    async fn summarises_ratings_per_product() {
        let view = ProductReviewsView::new();
        let (a, event) = submitted("asha", "ASHWA-90", 5, 20);
        push(&view, 1, a, 1, event).await;
        let (b, event) = submitted("ravi", "ASHWA-90", 4, 10);
        push(&view, 2, b, 1, event).await;
        let (c, event) = submitted("ravi", "TULSI-50", 1, 5);
        push(&view, 3, c, 1, event).await;

        let listing = view.product_reviews(&ProductId::new("ASHWA-90")).await;
        assert_eq!(listing.summary, RatingSummary { count: 2, average: 4.5 });
        assert_eq!(listing.reviews[0].id(), Some(b));
        assert_eq!(listing.reviews[1].id(), Some(a));
    }

    #[tokio::test]
    async fn likes_update_the_listed_review() {
        let view = ProductReviewsView::new();
        let (id, event) = submitted("asha", "ASHWA-90", 3, 1);
        push(&view, 1, id, 1, event).await;
        push(
            &view,
            2,
            id,
            2,
            ReviewEvent::ReviewLiked(ReviewLikedData {
                user_id: UserId::new("ravi"),
                liked_at: Utc::now(),
            }),
        )
        .await;

        let listing = view.product_reviews(&ProductId::new("ASHWA-90")).await;
        assert_eq!(listing.reviews[0].likes(), 1);
    }

    #[tokio::test]
    async fn unknown_product_has_empty_summary() {
        let view = ProductReviewsView::new();
        let listing = view.product_reviews(&ProductId::new("NONE")).await;
        assert!(listing.reviews.is_empty());
        assert_eq!(listing.summary, RatingSummary::default());
    }

    #[test]
    fn average_is_rounded_to_one_decimal() {
        assert_eq!(RatingSummary::from_total(3, 13).average, 4.3);
    }
}
