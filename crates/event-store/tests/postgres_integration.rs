//! PostgreSQL integration tests
//!
//! These tests need Docker and share one PostgreSQL container. Run with:
//!
//! ```bash
//! cargo test -p event-store --test postgres_integration -- --ignored --test-threads=1
//! ```

use std::sync::Arc;

use event_store::{
    AggregateId, AppendOptions, EventEnvelope, EventStore, EventStoreError, EventStoreExt,
    PostgresEventStore, StreamAppend, Version,
};
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_events_table.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and an empty log
async fn get_test_store() -> PostgresEventStore {
    let info = get_container_info().await;
    let store = PostgresEventStore::connect(&info.connection_string, 5)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE events RESTART IDENTITY")
        .execute(store.pool())
        .await
        .unwrap();

    store
}

fn create_test_event(
    aggregate_id: AggregateId,
    version: Version,
    event_type: &str,
) -> EventEnvelope {
    EventEnvelope::builder()
        .aggregate_id(aggregate_id)
        .aggregate_type("Order")
        .event_type(event_type)
        .version(version)
        .payload_raw(serde_json::json!({"test": true}))
        .build()
        .unwrap()
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn append_and_retrieve_events() {
    let store = get_test_store().await;
    let aggregate_id = AggregateId::new();

    let event = create_test_event(aggregate_id, Version::first(), "OrderPlaced");
    let version = store
        .append(vec![event], AppendOptions::expect_new())
        .await
        .unwrap();
    assert_eq!(version, Version::first());

    let events = store.get_events_for_aggregate(aggregate_id).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "OrderPlaced");
    assert!(events[0].position > 0);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn optimistic_concurrency_conflict() {
    let store = get_test_store().await;
    let aggregate_id = AggregateId::new();

    store
        .append(
            vec![create_test_event(aggregate_id, Version::first(), "OrderPlaced")],
            AppendOptions::expect_new(),
        )
        .await
        .unwrap();

    let result = store
        .append(
            vec![create_test_event(aggregate_id, Version::first(), "OrderPlaced")],
            AppendOptions::expect_new(),
        )
        .await;

    assert!(matches!(
        result,
        Err(EventStoreError::ConcurrencyConflict { .. })
    ));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn batch_is_all_or_nothing() {
    let store = get_test_store().await;
    let order = AggregateId::new();
    let product = AggregateId::new();

    store
        .append(
            vec![create_test_event(product, Version::first(), "ProductListed")],
            AppendOptions::expect_new(),
        )
        .await
        .unwrap();

    let result = store
        .append_batch(vec![
            StreamAppend::new(
                vec![create_test_event(order, Version::first(), "OrderPlaced")],
                AppendOptions::expect_new(),
            ),
            StreamAppend::new(
                vec![create_test_event(product, Version::first(), "StockReserved")],
                AppendOptions::expect_new(),
            ),
        ])
        .await;

    assert!(result.unwrap_err().is_conflict());
    assert!(!store.aggregate_exists(order).await.unwrap());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn concurrent_batches_on_one_stream_yield_one_winner() {
    let store = get_test_store().await;
    let product = AggregateId::new();

    store
        .append(
            vec![create_test_event(product, Version::first(), "ProductListed")],
            AppendOptions::expect_new(),
        )
        .await
        .unwrap();

    let attempt = |store: PostgresEventStore| async move {
        store
            .append_batch(vec![
                StreamAppend::new(
                    vec![create_test_event(AggregateId::new(), Version::first(), "OrderPlaced")],
                    AppendOptions::expect_new(),
                ),
                StreamAppend::new(
                    vec![create_test_event(product, Version::new(2), "StockReserved")],
                    AppendOptions::expect_version(Version::first()),
                ),
            ])
            .await
    };

    let (a, b) = tokio::join!(attempt(store.clone()), attempt(store.clone()));
    assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
    assert_eq!(
        store.get_aggregate_version(product).await.unwrap(),
        Some(Version::new(2))
    );
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn read_all_follows_positions() {
    let store = get_test_store().await;
    let id1 = AggregateId::new();
    let id2 = AggregateId::new();

    store
        .append(
            vec![create_test_event(id1, Version::first(), "OrderPlaced")],
            AppendOptions::new(),
        )
        .await
        .unwrap();
    store
        .append(
            vec![create_test_event(id2, Version::first(), "OrderPlaced")],
            AppendOptions::new(),
        )
        .await
        .unwrap();

    let all = store.read_all(0, 10).await.unwrap();
    assert_eq!(all.len(), 2);
    assert!(all[0].position < all[1].position);

    let tail = store.read_all(all[0].position, 10).await.unwrap();
    assert_eq!(tail.len(), 1);
    assert_eq!(tail[0].aggregate_id, id2);
}
