//! Review service: eligibility-checked submissions and likes.

use std::sync::Arc;

use common::AggregateId;
use event_store::EventStore;

use crate::actor::Actor;
use crate::command::{Command, CommandHandler, ConflictAware};
use crate::error::DomainError;
use crate::value_objects::ProductId;

use super::{LikePolicy, PurchaseHistory, Rating, Review, ReviewError};

/// Command to review a delivered product.
#[derive(Debug, Clone)]
pub struct SubmitReview {
    pub actor: Actor,
    pub product_id: ProductId,
    pub rating: u8,
    pub comment: String,
}

impl Command for SubmitReview {
    type Aggregate = Review;

    fn aggregate_id(&self) -> AggregateId {
        Review::stream_id(&self.actor.user_id, &self.product_id)
    }
}

pub struct ReviewService<S: EventStore> {
    handler: CommandHandler<S, Review>,
    purchases: Arc<dyn PurchaseHistory>,
    like_policy: LikePolicy,
}

impl<S: EventStore> ReviewService<S> {
    pub fn new(store: S, purchases: Arc<dyn PurchaseHistory>, like_policy: LikePolicy) -> Self {
        Self {
            handler: CommandHandler::new(store),
            purchases,
            like_policy,
        }
    }

    pub fn like_policy(&self) -> LikePolicy {
        self.like_policy
    }

    #[tracing::instrument(skip(self, cmd), fields(user_id = %cmd.actor.user_id, product_id = %cmd.product_id))]
    pub async fn submit_review(&self, cmd: SubmitReview) -> Result<Review, DomainError> {
        let rating = Rating::try_from(cmd.rating)?;
        let user_id = &cmd.actor.user_id;

        if !self.purchases.has_delivered(user_id, &cmd.product_id).await? {
            return Err(ReviewError::NotEligible {
                user_id: user_id.clone(),
                product_id: cmd.product_id.clone(),
            }
            .into());
        }

        // Both submissions of a race expect a new stream; the loser conflicts.
        let result = self
            .handler
            .execute(cmd.aggregate_id(), |review| {
                review.submit(user_id, &cmd.product_id, rating, &cmd.comment)
            })
            .await
            .map_err(|e| {
                if e.is_conflict() {
                    ReviewError::DuplicateReview {
                        user_id: user_id.clone(),
                        product_id: cmd.product_id.clone(),
                    }
                    .into()
                } else {
                    e
                }
            })?;

        tracing::info!(rating = rating.value(), "review submitted");
        metrics::counter!("reviews_submitted_total").increment(1);
        Ok(result.aggregate)
    }

    #[tracing::instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn like_review(
        &self,
        review_id: AggregateId,
        actor: &Actor,
    ) -> Result<Review, DomainError> {
        if self.handler.load_existing(review_id).await?.is_none() {
            return Err(DomainError::not_found("Review", review_id));
        }

        let policy = self.like_policy;
        let result = self
            .handler
            .execute_with_retry("like_review", review_id, |review| {
                review.like(&actor.user_id, policy)
            })
            .await?;

        if !result.events.is_empty() {
            metrics::counter!("review_likes_total").increment(1);
        }
        Ok(result.aggregate)
    }

    pub async fn get_review(&self, review_id: AggregateId) -> Result<Option<Review>, DomainError> {
        self.handler.load_existing(review_id).await
    }
}
