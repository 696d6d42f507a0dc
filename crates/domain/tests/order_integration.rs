//! Integration tests for the order lifecycle.
//!
//! These tests drive orders through the service layer against the
//! in-memory store: checkout with stock reservation, the status table,
//! cancellation and concurrent checkouts racing for the same stock.

use std::sync::Arc;

use common::AggregateId;
use domain::catalog::{
    AdjustStock, CatalogError, CatalogService, ProductDetails, UpsertProduct,
};
use domain::order::{
    CancelOrder, CartItem, ChangeAddress, Order, OrderError, OrderService, OrderStatus,
    PaymentReference, PlaceOrder, UpdateStatus,
};
use domain::{Actor, Aggregate, CommandHandler, DomainError, Money, ProductId, ShippingAddress};
use event_store::{EventStore, InMemoryEventStore};

fn address() -> ShippingAddress {
    ShippingAddress {
        name: "Meera Nair".to_string(),
        phone: "9123456780".to_string(),
        line1: "4 Temple Street".to_string(),
        line2: Some("Near the tank".to_string()),
        city: "Kochi".to_string(),
        state: "Kerala".to_string(),
        postcode: "682001".to_string(),
        country: "India".to_string(),
    }
}

async fn stock_product(store: &InMemoryEventStore, sku: &str, price: i64, stock: i64) {
    let catalog = CatalogService::new(store.clone());
    catalog
        .upsert_product(UpsertProduct {
            product_id: ProductId::new(sku),
            details: ProductDetails {
                name: format!("{sku} powder"),
                price: Money::from_minor(price),
                image: Some(format!("/img/{sku}.jpg")),
                weight_grams: 250,
            },
        })
        .await
        .unwrap();
    catalog
        .adjust_stock(AdjustStock {
            product_id: ProductId::new(sku),
            delta: stock,
            reason: "opening stock".to_string(),
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

/// Settles an order the way a verified payment does.
async fn pay(store: &InMemoryEventStore, order_id: AggregateId) -> Order {
    let handler: CommandHandler<_, Order> = CommandHandler::new(store.clone());
    handler
        .execute(order_id, |order| {
            order.mark_paid(
                PaymentReference {
                    gateway_order_id: "order_test".to_string(),
                    gateway_payment_id: "pay_test".to_string(),
                },
                order.subtotal(),
            )
        })
        .await
        .unwrap()
        .aggregate
}

fn status(order_id: AggregateId, status: OrderStatus) -> UpdateStatus {
    UpdateStatus {
        order_id,
        status,
        actor: Actor::admin("admin"),
    }
}

mod checkout {
    use super::*;

    #[tokio::test]
    async fn totals_are_computed_from_catalog_prices() {
        let store = InMemoryEventStore::new();
        stock_product(&store, "A", 100, 5).await;
        let service = OrderService::new(store.clone());

        let order = service
            .place_order(PlaceOrder::new(
                Actor::customer("meera"),
                vec![CartItem::new("A", 2)],
                address(),
            ))
            .await
            .unwrap();

        assert_eq!(order.subtotal(), Money::from_minor(200));
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.lines()[0].name, "A powder");
        assert_eq!(stock_of(&store, "A").await, 3);
    }

    #[tokio::test]
    async fn duplicate_cart_lines_are_merged() {
        let store = InMemoryEventStore::new();
        stock_product(&store, "A", 150, 10).await;
        let service = OrderService::new(store.clone());

        let order = service
            .place_order(PlaceOrder::new(
                Actor::customer("meera"),
                vec![CartItem::new("A", 1), CartItem::new("A", 3)],
                address(),
            ))
            .await
            .unwrap();

        assert_eq!(order.lines().len(), 1);
        assert_eq!(order.lines()[0].quantity, 4);
        assert_eq!(order.subtotal(), Money::from_minor(600));
        assert_eq!(stock_of(&store, "A").await, 6);
    }

    #[tokio::test]
    async fn empty_cart_and_zero_quantity_are_rejected() {
        let store = InMemoryEventStore::new();
        stock_product(&store, "A", 100, 5).await;
        let service = OrderService::new(store.clone());

        let empty = service
            .place_order(PlaceOrder::new(Actor::customer("meera"), vec![], address()))
            .await;
        assert!(matches!(empty, Err(DomainError::Order(OrderError::EmptyOrder))));

        let zero = service
            .place_order(PlaceOrder::new(
                Actor::customer("meera"),
                vec![CartItem::new("A", 0)],
                address(),
            ))
            .await;
        assert!(matches!(
            zero,
            Err(DomainError::Order(OrderError::InvalidItem { .. }))
        ));
    }

    #[tokio::test]
    async fn invalid_address_is_rejected() {
        let store = InMemoryEventStore::new();
        stock_product(&store, "A", 100, 5).await;
        let service = OrderService::new(store.clone());

        let mut bad = address();
        bad.postcode = "68A".to_string();
        let result = service
            .place_order(PlaceOrder::new(
                Actor::customer("meera"),
                vec![CartItem::new("A", 1)],
                bad,
            ))
            .await;
        assert!(matches!(
            result,
            Err(DomainError::Order(OrderError::InvalidAddress(_)))
        ));
        assert_eq!(stock_of(&store, "A").await, 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_checkouts_for_last_unit_have_one_winner() {
        let store = InMemoryEventStore::new();
        stock_product(&store, "LAST", 999, 1).await;
        let service = Arc::new(OrderService::new(store.clone()));

        let mut handles = Vec::new();
        for user in ["first", "second"] {
            let service = Arc::clone(&service);
            handles.push(tokio::spawn(async move {
                service
                    .place_order(PlaceOrder::new(
                        Actor::customer(user),
                        vec![CartItem::new("LAST", 1)],
                        address(),
                    ))
                    .await
            }));
        }

        let mut placed = 0;
        let mut out_of_stock = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => placed += 1,
                Err(DomainError::Catalog(CatalogError::OutOfStock { .. })) => out_of_stock += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(placed, 1);
        assert_eq!(out_of_stock, 1);
        assert_eq!(stock_of(&store, "LAST").await, 0);
    }
}

mod status_table {
    use super::*;

    async fn placed(store: &InMemoryEventStore) -> (OrderService<InMemoryEventStore>, AggregateId) {
        stock_product(store, "TRIPHALA", 300, 10).await;
        let service = OrderService::new(store.clone());
        let cmd = PlaceOrder::new(
            Actor::customer("meera"),
            vec![CartItem::new("TRIPHALA", 1)],
            address(),
        );
        let order_id = cmd.order_id;
        service.place_order(cmd).await.unwrap();
        (service, order_id)
    }

    #[tokio::test]
    async fn full_lifecycle_to_delivered() {
        let store = InMemoryEventStore::new();
        let (service, order_id) = placed(&store).await;

        assert_eq!(pay(&store, order_id).await.status(), OrderStatus::Paid);
        for next in [
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
        ] {
            let order = service.update_status(status(order_id, next)).await.unwrap();
            assert_eq!(order.status(), next);
        }

        let history = service
            .order_history(order_id, &Actor::customer("meera"))
            .await
            .unwrap();
        let statuses: Vec<_> = history.iter().filter_map(|h| h.status).collect();
        assert_eq!(
            statuses,
            vec![
                OrderStatus::Pending,
                OrderStatus::Paid,
                OrderStatus::Processing,
                OrderStatus::Shipped,
                OrderStatus::Delivered,
            ]
        );
        assert_eq!(history[0].event_type, "OrderPlaced");
    }

    #[tokio::test]
    async fn delivered_cannot_go_back_to_pending() {
        let store = InMemoryEventStore::new();
        let (service, order_id) = placed(&store).await;
        pay(&store, order_id).await;
        for next in [
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
        ] {
            service.update_status(status(order_id, next)).await.unwrap();
        }

        let result = service
            .update_status(status(order_id, OrderStatus::Pending))
            .await;
        assert!(matches!(
            result,
            Err(DomainError::Order(OrderError::InvalidTransition {
                from: OrderStatus::Delivered,
                to: OrderStatus::Pending,
            }))
        ));
    }

    #[tokio::test]
    async fn paid_requires_payment_verification() {
        let store = InMemoryEventStore::new();
        let (service, order_id) = placed(&store).await;

        let result = service.update_status(status(order_id, OrderStatus::Paid)).await;
        assert!(matches!(
            result,
            Err(DomainError::Order(OrderError::PaymentRequired))
        ));
    }

    #[tokio::test]
    async fn skipping_steps_is_rejected() {
        let store = InMemoryEventStore::new();
        let (service, order_id) = placed(&store).await;

        let result = service
            .update_status(status(order_id, OrderStatus::Shipped))
            .await;
        assert!(matches!(
            result,
            Err(DomainError::Order(OrderError::InvalidTransition { .. }))
        ));
    }

    #[tokio::test]
    async fn customers_cannot_change_status() {
        let store = InMemoryEventStore::new();
        let (service, order_id) = placed(&store).await;

        let result = service
            .update_status(UpdateStatus {
                order_id,
                status: OrderStatus::Processing,
                actor: Actor::customer("meera"),
            })
            .await;
        assert!(matches!(result, Err(DomainError::Forbidden(_))));
    }

    #[tokio::test]
    async fn cancelling_a_paid_order_restocks() {
        let store = InMemoryEventStore::new();
        let (service, order_id) = placed(&store).await;
        pay(&store, order_id).await;
        assert_eq!(stock_of(&store, "TRIPHALA").await, 9);

        let order = service
            .update_status(status(order_id, OrderStatus::Cancelled))
            .await
            .unwrap();
        assert_eq!(order.status(), OrderStatus::Cancelled);
        assert_eq!(stock_of(&store, "TRIPHALA").await, 10);
    }

    #[tokio::test]
    async fn shipped_orders_cannot_be_cancelled_or_readdressed() {
        let store = InMemoryEventStore::new();
        let (service, order_id) = placed(&store).await;
        pay(&store, order_id).await;
        service
            .update_status(status(order_id, OrderStatus::Processing))
            .await
            .unwrap();
        service
            .update_status(status(order_id, OrderStatus::Shipped))
            .await
            .unwrap();

        let cancel = service
            .cancel_order(CancelOrder {
                order_id,
                actor: Actor::customer("meera"),
                reason: "changed my mind".to_string(),
            })
            .await;
        assert!(matches!(
            cancel,
            Err(DomainError::Order(OrderError::InvalidTransition { .. }))
        ));

        let readdress = service
            .change_address(ChangeAddress {
                order_id,
                actor: Actor::customer("meera"),
                address: address(),
            })
            .await;
        assert!(matches!(
            readdress,
            Err(DomainError::Order(OrderError::Immutable { .. }))
        ));
        assert_eq!(stock_of(&store, "TRIPHALA").await, 9);
    }

    #[tokio::test]
    async fn order_events_are_versioned_per_stream() {
        let store = InMemoryEventStore::new();
        let (service, order_id) = placed(&store).await;
        pay(&store, order_id).await;
        service
            .update_status(status(order_id, OrderStatus::Processing))
            .await
            .unwrap();

        let events = store.get_events_for_aggregate(order_id).await.unwrap();
        let versions: Vec<i64> = events.iter().map(|e| e.version.as_i64()).collect();
        assert_eq!(versions, vec![1, 2, 3]);

        let order = service.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.version().as_i64(), 3);
    }
}
