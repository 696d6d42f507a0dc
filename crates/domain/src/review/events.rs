//! Review domain events.

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::value_objects::{ProductId, UserId};

use super::Rating;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ReviewEvent {
    ReviewSubmitted(ReviewSubmittedData),
    ReviewLiked(ReviewLikedData),
}

impl DomainEvent for ReviewEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ReviewEvent::ReviewSubmitted(_) => "ReviewSubmitted",
            ReviewEvent::ReviewLiked(_) => "ReviewLiked",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewSubmittedData {
    pub id: AggregateId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub rating: Rating,
    pub comment: String,
    pub verified_purchase: bool,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewLikedData {
    pub user_id: UserId,
    pub liked_at: DateTime<Utc>,
}
