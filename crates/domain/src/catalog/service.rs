//! Catalog service for admin product maintenance.

use event_store::EventStore;

use crate::command::CommandHandler;
use crate::error::DomainError;
use crate::value_objects::ProductId;

use super::{Product, ProductDetails};

/// Command to list a product or revise its details.
#[derive(Debug, Clone)]
pub struct UpsertProduct {
    pub product_id: ProductId,
    pub details: ProductDetails,
}

/// Command to restock or write off units.
#[derive(Debug, Clone)]
pub struct AdjustStock {
    pub product_id: ProductId,
    pub delta: i64,
    pub reason: String,
}

/// Service for maintaining sellable products.
pub struct CatalogService<S: EventStore> {
    handler: CommandHandler<S, Product>,
}

impl<S: EventStore> CatalogService<S> {
    pub fn new(store: S) -> Self {
        Self {
            handler: CommandHandler::new(store),
        }
    }

    #[tracing::instrument(skip(self, cmd), fields(product_id = %cmd.product_id))]
    pub async fn upsert_product(&self, cmd: UpsertProduct) -> Result<Product, DomainError> {
        let stream_id = Product::stream_id(&cmd.product_id);
        let result = self
            .handler
            .execute_with_retry("upsert_product", stream_id, |product| {
                product.list_or_revise(&cmd.product_id, cmd.details.clone())
            })
            .await?;

        if !result.events.is_empty() {
            tracing::info!(price = %result.aggregate.price(), "product saved");
        }
        Ok(result.aggregate)
    }

    #[tracing::instrument(skip(self, cmd), fields(product_id = %cmd.product_id))]
    pub async fn adjust_stock(&self, cmd: AdjustStock) -> Result<Product, DomainError> {
        let stream_id = Product::stream_id(&cmd.product_id);
        if self.handler.store().get_aggregate_version(stream_id).await?.is_none() {
            return Err(DomainError::not_found("Product", &cmd.product_id));
        }

        let result = self
            .handler
            .execute_with_retry("adjust_stock", stream_id, |product| {
                product.adjust_stock(cmd.delta, cmd.reason.clone())
            })
            .await?;

        tracing::info!(stock = result.aggregate.stock(), "stock adjusted");
        metrics::counter!("stock_adjustments_total").increment(1);
        Ok(result.aggregate)
    }

    pub async fn get_product(&self, product_id: &ProductId) -> Result<Option<Product>, DomainError> {
        self.handler
            .load_existing(Product::stream_id(product_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_objects::Money;
    use event_store::InMemoryEventStore;

    fn upsert(sku: &str, price: i64) -> UpsertProduct {
        UpsertProduct {
            product_id: ProductId::new(sku),
            details: ProductDetails {
                name: "Tulsi Green Tea".to_string(),
                price: Money::from_minor(price),
                image: None,
                weight_grams: 50,
            },
        }
    }

    #[tokio::test]
    async fn upsert_then_restock() {
        let service = CatalogService::new(InMemoryEventStore::new());
        service.upsert_product(upsert("TULSI-50", 25000)).await.unwrap();

        let product = service
            .adjust_stock(AdjustStock {
                product_id: ProductId::new("TULSI-50"),
                delta: 12,
                reason: "restock".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(product.stock(), 12);
        let loaded = service
            .get_product(&ProductId::new("TULSI-50"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.price(), Money::from_minor(25000));
    }

    #[tokio::test]
    async fn adjusting_unknown_product_is_not_found() {
        let service = CatalogService::new(InMemoryEventStore::new());
        let result = service
            .adjust_stock(AdjustStock {
                product_id: ProductId::new("NOPE"),
                delta: 1,
                reason: "restock".to_string(),
            })
            .await;
        assert!(matches!(result, Err(DomainError::AggregateNotFound { .. })));
    }
}
