//! Review aggregate, one stream per (customer, product).

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use common::{AggregateId, IdNamespace};
use event_store::Version;

use crate::aggregate::Aggregate;
use crate::value_objects::{ProductId, UserId};

use super::{LikePolicy, Rating, ReviewError, ReviewEvent, ReviewLikedData, ReviewSubmittedData};

#[derive(Debug, Clone, Default)]
pub struct Review {
    id: Option<AggregateId>,
    version: Version,
    user_id: Option<UserId>,
    product_id: Option<ProductId>,
    rating: Option<Rating>,
    comment: String,
    verified_purchase: bool,
    likes: u64,
    likers: BTreeSet<UserId>,
    submitted_at: Option<DateTime<Utc>>,
}

impl Review {
    /// Stream id of a customer's review of a product. Two submissions for
    /// the same pair collide on this stream.
    pub fn stream_id(user_id: &UserId, product_id: &ProductId) -> AggregateId {
        AggregateId::derived(IdNamespace::Review, &format!("{user_id}:{product_id}"))
    }
}

impl Aggregate for Review {
    type Event = ReviewEvent;
    type Error = ReviewError;

    fn aggregate_type() -> &'static str {
        "Review"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            ReviewEvent::ReviewSubmitted(data) => {
                self.id = Some(data.id);
                self.user_id = Some(data.user_id);
                self.product_id = Some(data.product_id);
                self.rating = Some(data.rating);
                self.comment = data.comment;
                self.verified_purchase = data.verified_purchase;
                self.submitted_at = Some(data.submitted_at);
            }
            ReviewEvent::ReviewLiked(data) => {
                self.likes += 1;
                self.likers.insert(data.user_id);
            }
        }
    }
}

// Query methods
impl Review {
    pub fn user_id(&self) -> Option<&UserId> {
        self.user_id.as_ref()
    }

    pub fn product_id(&self) -> Option<&ProductId> {
        self.product_id.as_ref()
    }

    pub fn rating(&self) -> Option<Rating> {
        self.rating
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn verified_purchase(&self) -> bool {
        self.verified_purchase
    }

    pub fn likes(&self) -> u64 {
        self.likes
    }

    pub fn likers(&self) -> impl Iterator<Item = &UserId> {
        self.likers.iter()
    }

    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        self.submitted_at
    }
}

// Command methods (return events)
impl Review {
    /// Submits the review. Eligibility is checked by the caller.
    pub fn submit(
        &self,
        user_id: &UserId,
        product_id: &ProductId,
        rating: Rating,
        comment: &str,
    ) -> Result<Vec<ReviewEvent>, ReviewError> {
        if self.exists() {
            return Err(ReviewError::DuplicateReview {
                user_id: user_id.clone(),
                product_id: product_id.clone(),
            });
        }
        Ok(vec![ReviewEvent::ReviewSubmitted(ReviewSubmittedData {
            id: Review::stream_id(user_id, product_id),
            user_id: user_id.clone(),
            product_id: product_id.clone(),
            rating,
            comment: comment.trim().to_string(),
            verified_purchase: true,
            submitted_at: Utc::now(),
        })])
    }

    pub fn like(&self, user_id: &UserId, policy: LikePolicy) -> Result<Vec<ReviewEvent>, ReviewError> {
        if !self.exists() {
            return Err(ReviewError::NotSubmitted);
        }
        if policy == LikePolicy::OnePerUser && self.likers.contains(user_id) {
            return Ok(vec![]);
        }
        Ok(vec![ReviewEvent::ReviewLiked(ReviewLikedData {
            user_id: user_id.clone(),
            liked_at: Utc::now(),
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submitted() -> Review {
        let mut review = Review::default();
        let events = review
            .submit(
                &UserId::new("asha"),
                &ProductId::new("ASHWA-100"),
                Rating::try_from(4).unwrap(),
                "  calming  ",
            )
            .unwrap();
        review.apply_events(events);
        review
    }

    #[test]
    fn submit_records_review() {
        let review = submitted();
        assert_eq!(review.rating(), Some(Rating::try_from(4).unwrap()));
        assert_eq!(review.comment(), "calming");
        assert!(review.verified_purchase());
        assert_eq!(
            review.id(),
            Some(Review::stream_id(
                &UserId::new("asha"),
                &ProductId::new("ASHWA-100")
            ))
        );
    }

    #[test]
    fn second_submission_is_duplicate() {
        let review = submitted();
        assert!(matches!(
            review.submit(
                &UserId::new("asha"),
                &ProductId::new("ASHWA-100"),
                Rating::try_from(5).unwrap(),
                "again"
            ),
            Err(ReviewError::DuplicateReview { .. })
        ));
    }

    #[test]
    fn like_policies() {
        let mut review = submitted();
        let fan = UserId::new("ravi");
        review.apply_events(review.like(&fan, LikePolicy::AllowMultiple).unwrap());
        review.apply_events(review.like(&fan, LikePolicy::AllowMultiple).unwrap());
        assert_eq!(review.likes(), 2);

        assert!(review.like(&fan, LikePolicy::OnePerUser).unwrap().is_empty());
        let other = UserId::new("meera");
        assert_eq!(review.like(&other, LikePolicy::OnePerUser).unwrap().len(), 1);
    }

    #[test]
    fn liking_missing_review_fails() {
        assert!(matches!(
            Review::default().like(&UserId::new("ravi"), LikePolicy::AllowMultiple),
            Err(ReviewError::NotSubmitted)
        ));
    }
}
