//! Query service: the read side the HTTP layer and review eligibility use.

use async_trait::async_trait;
use common::AggregateId;
use domain::order::Order;
use domain::review::PurchaseHistory;
use domain::{DomainError, ProductId, UserId};
use event_store::EventStore;

use crate::Result;
use crate::processor::ProjectionProcessor;
use crate::read_model::ReadModel;
use crate::views::{OrderFilter, OrdersView, ProductReviews, ProductReviewsView};

/// Owns the views and the processor feeding them.
///
/// Every query first catches the views up with the event log, so a read
/// issued after a successful command observes that command.
pub struct QueryService<S: EventStore> {
    processor: ProjectionProcessor<S>,
    orders: OrdersView,
    reviews: ProductReviewsView,
}

impl<S: EventStore> QueryService<S> {
    pub fn new(store: S) -> Self {
        let orders = OrdersView::new();
        let reviews = ProductReviewsView::new();
        let mut processor = ProjectionProcessor::new(store);
        processor.register(Box::new(orders.clone()));
        processor.register(Box::new(reviews.clone()));
        Self {
            processor,
            orders,
            reviews,
        }
    }

    /// Reads any new events into the views.
    pub async fn catch_up(&self) -> Result<u64> {
        let read = self.processor.run_catch_up().await?;
        if read > 0 {
            let models: [&dyn ReadModel; 2] = [&self.orders, &self.reviews];
            for model in models {
                metrics::gauge!("read_model_entries", "model" => model.name())
                    .set(model.count() as f64);
            }
        }
        Ok(read)
    }

    /// Drops the views and replays the whole log.
    pub async fn rebuild(&self) -> Result<u64> {
        self.processor.rebuild_all().await
    }

    pub async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>> {
        self.catch_up().await?;
        Ok(self.orders.query(filter).await)
    }

    pub async fn get_order(&self, order_id: AggregateId) -> Result<Option<Order>> {
        self.catch_up().await?;
        Ok(self.orders.get(order_id).await)
    }

    pub async fn product_reviews(&self, product_id: &ProductId) -> Result<ProductReviews> {
        self.catch_up().await?;
        Ok(self.reviews.product_reviews(product_id).await)
    }
}

#[async_trait]
impl<S: EventStore> PurchaseHistory for QueryService<S> {
    async fn has_delivered(
        &self,
        user_id: &UserId,
        product_id: &ProductId,
    ) -> std::result::Result<bool, DomainError> {
        self.catch_up().await?;
        Ok(self.orders.has_delivered(user_id, product_id).await)
    }
}
