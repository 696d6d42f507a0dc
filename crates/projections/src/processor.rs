//! Projection processor for feeding events to projections.

use event_store::{EventEnvelope, EventStore};
use tokio::sync::Mutex;

use crate::Result;
use crate::projection::Projection;

/// Events read from the store per page during catch-up.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Reads the global event log page by page and delivers it to projections.
///
/// The processor supports:
/// - Catch-up: reads every event after the slowest projection's position
/// - Single event delivery: delivers one event to projections behind it
/// - Rebuild: resets all projections and replays from scratch
///
/// Catch-ups are serialised so concurrent readers never deliver the same
/// event twice.
pub struct ProjectionProcessor<S: EventStore> {
    store: S,
    projections: Vec<Box<dyn Projection>>,
    batch_size: usize,
    catch_up: Mutex<()>,
}

impl<S: EventStore> ProjectionProcessor<S> {
    /// Creates a new processor with the given event store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            projections: Vec::new(),
            batch_size: DEFAULT_BATCH_SIZE,
            catch_up: Mutex::new(()),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Registers a projection with this processor.
    pub fn register(&mut self, projection: Box<dyn Projection>) {
        self.projections.push(projection);
    }

    /// Returns the number of registered projections.
    pub fn projection_count(&self) -> usize {
        self.projections.len()
    }

    /// Brings every projection up to the end of the log. Returns the number
    /// of events read from the store.
    #[tracing::instrument(skip(self))]
    pub async fn run_catch_up(&self) -> Result<u64> {
        let _guard = self.catch_up.lock().await;

        let mut after = i64::MAX;
        for projection in &self.projections {
            after = after.min(projection.position().await.last_position);
        }
        if self.projections.is_empty() {
            return Ok(0);
        }

        let mut read: u64 = 0;
        loop {
            let page = self.store.read_all(after, self.batch_size).await?;
            let Some(last) = page.last() else {
                break;
            };
            after = last.position;
            read += page.len() as u64;

            for event in &page {
                self.deliver(event).await?;
            }
            if page.len() < self.batch_size {
                break;
            }
        }

        if read > 0 {
            tracing::debug!(events = read, up_to = after, "catch-up complete");
        }
        Ok(read)
    }

    /// Delivers a single event to every projection that has not seen it.
    #[tracing::instrument(skip(self, event), fields(event_type = %event.event_type))]
    pub async fn process_event(&self, event: &EventEnvelope) -> Result<()> {
        self.deliver(event).await
    }

    /// Resets all projections and replays all events from the store.
    #[tracing::instrument(skip(self))]
    pub async fn rebuild_all(&self) -> Result<u64> {
        for projection in &self.projections {
            projection.reset().await?;
            tracing::info!(projection = projection.name(), "projection reset");
        }
        self.run_catch_up().await
    }

    async fn deliver(&self, event: &EventEnvelope) -> Result<()> {
        for projection in &self.projections {
            if projection.position().await.is_behind(event.position) {
                projection.handle(event).await?;
                metrics::counter!("projections_events_processed", "projection" => projection.name())
                    .increment(1);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::ProjectionPosition;
    use async_trait::async_trait;
    use common::AggregateId;
    use event_store::{AppendOptions, EventStoreExt, InMemoryEventStore, Version};
    use std::sync::Arc;
    use tokio::sync::RwLock;

    /// Counts every event it is handed.
    #[derive(Clone)]
    struct CountingProjection {
        count: Arc<RwLock<u64>>,
        position: Arc<RwLock<ProjectionPosition>>,
    }

    impl CountingProjection {
        fn new() -> Self {
            Self {
                count: Arc::new(RwLock::new(0)),
                position: Arc::new(RwLock::new(ProjectionPosition::zero())),
            }
        }

        async fn count(&self) -> u64 {
            *self.count.read().await
        }
    }

    #[async_trait]
    impl Projection for CountingProjection {
        fn name(&self) -> &'static str {
            "CountingProjection"
        }

        async fn handle(&self, event: &EventEnvelope) -> Result<()> {
            *self.count.write().await += 1;
            let mut pos = self.position.write().await;
            *pos = pos.advance_to(event.position);
            Ok(())
        }

        async fn position(&self) -> ProjectionPosition {
            *self.position.read().await
        }

        async fn reset(&self) -> Result<()> {
            *self.count.write().await = 0;
            *self.position.write().await = ProjectionPosition::zero();
            Ok(())
        }
    }

    fn test_event(aggregate_id: AggregateId, version: i64) -> EventEnvelope {
        EventEnvelope::builder()
            .aggregate_id(aggregate_id)
            .aggregate_type("Order")
            .event_type("TestEvent")
            .version(Version::new(version))
            .payload_raw(serde_json::json!({"test": true}))
            .build()
            .unwrap()
    }

    async fn store_with(events: i64) -> InMemoryEventStore {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        if events > 0 {
            let batch = (1..=events).map(|v| test_event(id, v)).collect();
            store.append(batch, AppendOptions::expect_new()).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn catch_up_delivers_every_event() {
        let projection = CountingProjection::new();
        let mut processor = ProjectionProcessor::new(store_with(3).await);
        processor.register(Box::new(projection.clone()));

        assert_eq!(processor.run_catch_up().await.unwrap(), 3);
        assert_eq!(projection.count().await, 3);
        assert_eq!(projection.position().await.last_position, 3);
    }

    #[tokio::test]
    async fn catch_up_pages_through_the_log() {
        let projection = CountingProjection::new();
        let mut processor = ProjectionProcessor::new(store_with(7).await).with_batch_size(2);
        processor.register(Box::new(projection.clone()));

        assert_eq!(processor.run_catch_up().await.unwrap(), 7);
        assert_eq!(projection.count().await, 7);
    }

    #[tokio::test]
    async fn catch_up_skips_already_processed() {
        let projection = CountingProjection::new();
        let mut processor = ProjectionProcessor::new(store_with(3).await);
        processor.register(Box::new(projection.clone()));

        processor.run_catch_up().await.unwrap();
        assert_eq!(processor.run_catch_up().await.unwrap(), 0);
        assert_eq!(projection.count().await, 3);
    }

    #[tokio::test]
    async fn late_projection_catches_up_without_duplicating_others() {
        let first = CountingProjection::new();
        let second = CountingProjection::new();
        let mut processor = ProjectionProcessor::new(store_with(2).await);
        processor.register(Box::new(first.clone()));
        processor.run_catch_up().await.unwrap();

        processor.register(Box::new(second.clone()));
        processor.run_catch_up().await.unwrap();

        assert_eq!(first.count().await, 2);
        assert_eq!(second.count().await, 2);
    }

    #[tokio::test]
    async fn rebuild_resets_and_replays() {
        let projection = CountingProjection::new();
        let mut processor = ProjectionProcessor::new(store_with(2).await);
        processor.register(Box::new(projection.clone()));

        processor.run_catch_up().await.unwrap();
        processor.rebuild_all().await.unwrap();

        assert_eq!(projection.count().await, 2);
        assert_eq!(projection.position().await.events_processed, 2);
    }

    #[tokio::test]
    async fn process_event_ignores_seen_positions() {
        let projection = CountingProjection::new();
        let mut processor = ProjectionProcessor::new(store_with(1).await);
        processor.register(Box::new(projection.clone()));
        processor.run_catch_up().await.unwrap();

        let mut replayed = test_event(AggregateId::new(), 1);
        replayed.position = 1;
        processor.process_event(&replayed).await.unwrap();
        assert_eq!(projection.count().await, 1);

        replayed.position = 2;
        processor.process_event(&replayed).await.unwrap();
        assert_eq!(projection.count().await, 2);
    }

    #[tokio::test]
    async fn empty_store_catch_up() {
        let projection = CountingProjection::new();
        let mut processor = ProjectionProcessor::new(store_with(0).await);
        processor.register(Box::new(projection.clone()));

        assert_eq!(processor.run_catch_up().await.unwrap(), 0);
        assert_eq!(projection.count().await, 0);
    }
}
