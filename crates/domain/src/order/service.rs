//! Order service: checkout, status changes, cancellation and reads.

use chrono::{DateTime, Utc};
use common::AggregateId;
use event_store::{EventStore, Version};
use serde::Serialize;

use crate::actor::Actor;
use crate::aggregate::Aggregate;
use crate::catalog::Product;
use crate::command::{CommandHandler, UnitOfWork, retry_on_conflict};
use crate::error::DomainError;

use super::{
    CancelOrder, CartItem, ChangeAddress, Order, OrderError, OrderEvent, OrderLine, OrderStatus,
    PlaceOrder, UpdateStatus, merge_cart,
};

/// One entry of an order's status history.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub version: i64,
    pub event_type: String,
    /// Status after the event, for events that change it.
    pub status: Option<OrderStatus>,
    pub recorded_at: DateTime<Utc>,
}

/// Service for managing orders.
///
/// Checkout reserves stock on every product stream and records the order in
/// one atomic append; cancellation returns the stock the same way.
pub struct OrderService<S: EventStore + Clone> {
    orders: CommandHandler<S, Order>,
    products: CommandHandler<S, Product>,
}

impl<S: EventStore + Clone> OrderService<S> {
    /// Creates a new order service with the given event store.
    pub fn new(store: S) -> Self {
        Self {
            orders: CommandHandler::new(store.clone()),
            products: CommandHandler::new(store),
        }
    }

    /// Places an order, pricing every line from the catalog.
    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id, user_id = %cmd.actor.user_id))]
    pub async fn place_order(&self, cmd: PlaceOrder) -> Result<Order, DomainError> {
        let items = merge_cart(&cmd.items);
        if items.is_empty() {
            return Err(OrderError::EmptyOrder.into());
        }
        if let Some(item) = items.iter().find(|i| i.quantity == 0) {
            return Err(OrderError::InvalidItem {
                product_id: item.product_id.clone(),
                reason: "quantity must be greater than zero".to_string(),
            }
            .into());
        }
        cmd.address.validate().map_err(OrderError::InvalidAddress)?;

        let order = retry_on_conflict("place_order", || self.try_place(&cmd, &items)).await?;

        metrics::counter!("orders_placed_total").increment(1);
        metrics::histogram!("order_subtotal_minor").record(order.subtotal().minor() as f64);
        tracing::info!(subtotal = %order.subtotal(), lines = order.lines().len(), "order placed");
        Ok(order)
    }

    async fn try_place(&self, cmd: &PlaceOrder, items: &[CartItem]) -> Result<Order, DomainError> {
        let mut order = self.orders.load(cmd.order_id).await?;
        let mut uow = UnitOfWork::new();
        let mut lines = Vec::with_capacity(items.len());

        for item in items {
            let stream_id = Product::stream_id(&item.product_id);
            let product = self.products.load(stream_id).await?;
            if !product.exists() {
                return Err(OrderError::InvalidItem {
                    product_id: item.product_id.clone(),
                    reason: "unknown product".to_string(),
                }
                .into());
            }

            let reserved = product.reserve(cmd.order_id, item.quantity)?;
            uow.record::<Product>(stream_id, product.version(), &reserved)?;

            lines.push(OrderLine {
                product_id: item.product_id.clone(),
                name: product.name().to_string(),
                image: product.image().map(str::to_string),
                unit_price: product.price(),
                quantity: item.quantity,
                weight_grams: product.weight_grams(),
            });
        }

        let events = order.place(
            cmd.order_id,
            cmd.actor.user_id.clone(),
            lines,
            cmd.address.clone(),
        )?;
        uow.record::<Order>(cmd.order_id, order.version(), &events)?;
        uow.commit(self.orders.store()).await?;

        let new_version = Version::new(order.version().as_i64() + events.len() as i64);
        order.apply_events(events);
        order.set_version(new_version);
        Ok(order)
    }

    /// Moves an order along the status table on a merchant's request.
    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id, status = %cmd.status))]
    pub async fn update_status(&self, cmd: UpdateStatus) -> Result<Order, DomainError> {
        if !cmd.actor.is_merchant() {
            return Err(DomainError::Forbidden(
                "only merchants may change order status".to_string(),
            ));
        }
        if cmd.status == OrderStatus::Cancelled {
            return self
                .cancel_order(CancelOrder {
                    order_id: cmd.order_id,
                    actor: cmd.actor,
                    reason: "cancelled by merchant".to_string(),
                })
                .await;
        }

        self.require(cmd.order_id).await?;
        let result = self
            .orders
            .execute_with_retry("update_status", cmd.order_id, |order| {
                order.request_status(cmd.status, &cmd.actor.user_id)
            })
            .await?;

        metrics::counter!("order_status_changes_total", "to" => cmd.status.as_str()).increment(1);
        tracing::info!("order status changed");
        Ok(result.aggregate)
    }

    /// Cancels an order and returns its reserved stock in the same commit.
    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id))]
    pub async fn cancel_order(&self, cmd: CancelOrder) -> Result<Order, DomainError> {
        let order = retry_on_conflict("cancel_order", || self.try_cancel(&cmd)).await?;

        metrics::counter!("orders_cancelled_total").increment(1);
        tracing::info!(reason = %cmd.reason, "order cancelled");
        Ok(order)
    }

    async fn try_cancel(&self, cmd: &CancelOrder) -> Result<Order, DomainError> {
        let mut order = self.require(cmd.order_id).await?;
        authorize(&cmd.actor, &order)?;

        let events = order.cancel(cmd.reason.clone(), &cmd.actor.user_id)?;
        let mut uow = UnitOfWork::new();
        uow.record::<Order>(cmd.order_id, order.version(), &events)?;

        for line in order.lines() {
            let stream_id = Product::stream_id(&line.product_id);
            let product = self.products.load(stream_id).await?;
            if !product.exists() {
                tracing::warn!(product_id = %line.product_id, "cancelled line refers to a missing product");
                continue;
            }
            let released = product.release(cmd.order_id, line.quantity)?;
            uow.record::<Product>(stream_id, product.version(), &released)?;
        }

        uow.commit(self.orders.store()).await?;

        let new_version = Version::new(order.version().as_i64() + events.len() as i64);
        order.apply_events(events);
        order.set_version(new_version);
        Ok(order)
    }

    /// Replaces the delivery address before a shipment exists.
    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id))]
    pub async fn change_address(&self, cmd: ChangeAddress) -> Result<Order, DomainError> {
        let order = self.require(cmd.order_id).await?;
        authorize(&cmd.actor, &order)?;

        let result = self
            .orders
            .execute_with_retry("change_address", cmd.order_id, |order| {
                order.change_address(cmd.address.clone(), &cmd.actor.user_id)
            })
            .await?;
        Ok(result.aggregate)
    }

    /// Loads an order by id.
    pub async fn get_order(&self, order_id: AggregateId) -> Result<Option<Order>, DomainError> {
        self.orders.load_existing(order_id).await
    }

    /// Loads an order the actor is allowed to see.
    pub async fn order_for(&self, order_id: AggregateId, actor: &Actor) -> Result<Order, DomainError> {
        let order = self.require(order_id).await?;
        authorize(actor, &order)?;
        Ok(order)
    }

    /// Returns the order's event history, oldest first.
    pub async fn order_history(
        &self,
        order_id: AggregateId,
        actor: &Actor,
    ) -> Result<Vec<HistoryEntry>, DomainError> {
        self.order_for(order_id, actor).await?;

        let envelopes = self.orders.store().get_events_for_aggregate(order_id).await?;
        envelopes
            .into_iter()
            .map(|envelope| {
                let event: OrderEvent = serde_json::from_value(envelope.payload)?;
                Ok(HistoryEntry {
                    version: envelope.version.as_i64(),
                    event_type: envelope.event_type,
                    status: event.status_after(),
                    recorded_at: envelope.timestamp,
                })
            })
            .collect()
    }

    async fn require(&self, order_id: AggregateId) -> Result<Order, DomainError> {
        self.orders
            .load_existing(order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Order", order_id))
    }
}

fn authorize(actor: &Actor, order: &Order) -> Result<(), DomainError> {
    match order.user_id() {
        Some(owner) if actor.can_act_for(owner) => Ok(()),
        _ => Err(DomainError::Forbidden(format!(
            "{} may not act on this order",
            actor.user_id
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{AdjustStock, CatalogError, CatalogService, ProductDetails, UpsertProduct};
    use crate::value_objects::{Money, ProductId, test_address};
    use event_store::InMemoryEventStore;

    async fn stocked(store: &InMemoryEventStore, sku: &str, price: i64, stock: i64) {
        let catalog = CatalogService::new(store.clone());
        catalog
            .upsert_product(UpsertProduct {
                product_id: ProductId::new(sku),
                details: ProductDetails {
                    name: format!("{sku} churna"),
                    price: Money::from_minor(price),
                    image: None,
                    weight_grams: 100,
                },
            })
            .await
            .unwrap();
        catalog
            .adjust_stock(AdjustStock {
                product_id: ProductId::new(sku),
                delta: stock,
                reason: "initial".to_string(),
            })
            .await
            .unwrap();
    }

    async fn stock_of(store: &InMemoryEventStore, sku: &str) -> u32 {
        CatalogService::new(store.clone())
            .get_product(&ProductId::new(sku))
            .await
            .unwrap()
            .unwrap()
            .stock()
    }

    fn place(user: &str, items: Vec<CartItem>) -> PlaceOrder {
        PlaceOrder::new(Actor::customer(user), items, test_address())
    }

    #[tokio::test]
    async fn place_order_prices_from_catalog_and_reserves_stock() {
        let store = InMemoryEventStore::new();
        stocked(&store, "A", 100, 5).await;
        let service = OrderService::new(store.clone());

        let order = service
            .place_order(place("u-1", vec![CartItem::new("A", 2)]))
            .await
            .unwrap();

        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.subtotal(), Money::from_minor(200));
        assert_eq!(stock_of(&store, "A").await, 3);
    }

    #[tokio::test]
    async fn unknown_product_is_invalid_item() {
        let service = OrderService::new(InMemoryEventStore::new());
        let result = service
            .place_order(place("u-1", vec![CartItem::new("GHOST", 1)]))
            .await;
        assert!(matches!(
            result,
            Err(DomainError::Order(OrderError::InvalidItem { .. }))
        ));
    }

    #[tokio::test]
    async fn insufficient_stock_leaves_nothing_behind() {
        let store = InMemoryEventStore::new();
        stocked(&store, "A", 100, 5).await;
        stocked(&store, "B", 100, 1).await;
        let service = OrderService::new(store.clone());

        let cmd = place("u-1", vec![CartItem::new("A", 2), CartItem::new("B", 2)]);
        let order_id = cmd.order_id;
        let result = service.place_order(cmd).await;

        assert!(matches!(
            result,
            Err(DomainError::Catalog(CatalogError::OutOfStock { .. }))
        ));
        assert_eq!(stock_of(&store, "A").await, 5);
        assert!(service.get_order(order_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn customers_cannot_update_status() {
        let store = InMemoryEventStore::new();
        stocked(&store, "A", 100, 5).await;
        let service = OrderService::new(store);
        let order = service
            .place_order(place("u-1", vec![CartItem::new("A", 1)]))
            .await
            .unwrap();

        let result = service
            .update_status(UpdateStatus {
                order_id: order.id().unwrap(),
                status: OrderStatus::Processing,
                actor: Actor::customer("u-1"),
            })
            .await;
        assert!(matches!(result, Err(DomainError::Forbidden(_))));
    }

    #[tokio::test]
    async fn cancel_returns_stock() {
        let store = InMemoryEventStore::new();
        stocked(&store, "A", 100, 5).await;
        let service = OrderService::new(store.clone());
        let order = service
            .place_order(place("u-1", vec![CartItem::new("A", 3)]))
            .await
            .unwrap();

        let cancelled = service
            .cancel_order(CancelOrder {
                order_id: order.id().unwrap(),
                actor: Actor::customer("u-1"),
                reason: "ordered by mistake".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(cancelled.status(), OrderStatus::Cancelled);
        assert_eq!(stock_of(&store, "A").await, 5);
    }

    #[tokio::test]
    async fn other_customers_cannot_cancel() {
        let store = InMemoryEventStore::new();
        stocked(&store, "A", 100, 5).await;
        let service = OrderService::new(store.clone());
        let order = service
            .place_order(place("u-1", vec![CartItem::new("A", 1)]))
            .await
            .unwrap();

        let result = service
            .cancel_order(CancelOrder {
                order_id: order.id().unwrap(),
                actor: Actor::customer("u-2"),
                reason: "not mine".to_string(),
            })
            .await;
        assert!(matches!(result, Err(DomainError::Forbidden(_))));
        assert_eq!(stock_of(&store, "A").await, 4);
    }

    #[tokio::test]
    async fn history_lists_status_changes() {
        let store = InMemoryEventStore::new();
        stocked(&store, "A", 100, 5).await;
        let service = OrderService::new(store);
        let order = service
            .place_order(place("u-1", vec![CartItem::new("A", 1)]))
            .await
            .unwrap();
        let order_id = order.id().unwrap();
        service
            .cancel_order(CancelOrder {
                order_id,
                actor: Actor::admin("ops"),
                reason: "fraud check".to_string(),
            })
            .await
            .unwrap();

        let history = service
            .order_history(order_id, &Actor::customer("u-1"))
            .await
            .unwrap();
        let statuses: Vec<_> = history.iter().filter_map(|h| h.status).collect();
        assert_eq!(statuses, vec![OrderStatus::Pending, OrderStatus::Cancelled]);
    }
}
