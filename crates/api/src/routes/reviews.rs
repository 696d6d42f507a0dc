//! Product reviews and likes.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::review::{Review, SubmitReview};
use domain::{Aggregate, ProductId, UserId};
use event_store::EventStore;
use projections::RatingSummary;
use serde::{Deserialize, Serialize};

use super::parse_id;
use crate::error::ApiError;
use crate::extract::Payload;
use crate::session::Session;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ReviewRequest {
    pub rating: u8,
    #[serde(default)]
    pub comment: String,
}

#[derive(Serialize)]
pub struct ReviewResponse {
    pub id: Option<AggregateId>,
    pub user_id: Option<UserId>,
    pub product_id: Option<ProductId>,
    pub rating: Option<u8>,
    pub comment: String,
    pub verified_purchase: bool,
    pub likes: u64,
    pub submitted_at: Option<DateTime<Utc>>,
}

impl From<&Review> for ReviewResponse {
    fn from(review: &Review) -> Self {
        Self {
            id: review.id(),
            user_id: review.user_id().cloned(),
            product_id: review.product_id().cloned(),
            rating: review.rating().map(|r| r.value()),
            comment: review.comment().to_string(),
            verified_purchase: review.verified_purchase(),
            likes: review.likes(),
            submitted_at: review.submitted_at(),
        }
    }
}

#[derive(Serialize)]
pub struct ProductReviewsResponse {
    pub product_id: ProductId,
    pub summary: RatingSummary,
    pub reviews: Vec<ReviewResponse>,
}

/// GET /products/{sku}/reviews: newest first with the rating summary.
pub async fn list<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(sku): Path<String>,
) -> Result<Json<ProductReviewsResponse>, ApiError> {
    let reviews = state.queries.product_reviews(&ProductId::new(sku)).await?;
    Ok(Json(ProductReviewsResponse {
        product_id: reviews.product_id,
        summary: reviews.summary,
        reviews: reviews.reviews.iter().map(ReviewResponse::from).collect(),
    }))
}

/// POST /products/{sku}/reviews: one review per delivered purchase.
#[tracing::instrument(skip(state, session, req))]
pub async fn submit<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    session: Session,
    Path(sku): Path<String>,
    Payload(req): Payload<ReviewRequest>,
) -> Result<(StatusCode, Json<ReviewResponse>), ApiError> {
    let review = state
        .reviews
        .submit_review(SubmitReview {
            actor: session.actor,
            product_id: ProductId::new(sku),
            rating: req.rating,
            comment: req.comment,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(ReviewResponse::from(&review))))
}

/// POST /reviews/{id}/like
#[tracing::instrument(skip(state, session))]
pub async fn like<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    session: Session,
    Path(id): Path<String>,
) -> Result<Json<ReviewResponse>, ApiError> {
    let review = state
        .reviews
        .like_review(parse_id(&id)?, &session.actor)
        .await?;
    Ok(Json(ReviewResponse::from(&review)))
}
