use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    AggregateId, EventEnvelope, EventStoreError, Result, Version,
    store::{EventStore, StreamAppend, validate_batch},
};

#[derive(Default)]
struct Inner {
    /// Every event in append order; an event's position is its index + 1.
    log: Vec<EventEnvelope>,
    /// Indices into `log` per aggregate, in version order.
    streams: HashMap<AggregateId, Vec<usize>>,
}

impl Inner {
    fn current_version(&self, aggregate_id: AggregateId) -> Version {
        self.streams
            .get(&aggregate_id)
            .and_then(|indices| indices.last())
            .map(|&i| self.log[i].version)
            .unwrap_or(Version::initial())
    }
}

/// In-memory event store implementation for tests and local runs.
///
/// Provides the same guarantees as the PostgreSQL implementation: batches
/// are checked and written under one lock, so they land all-or-nothing.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryEventStore {
    /// Creates a new empty in-memory event store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of events stored.
    pub async fn event_count(&self) -> usize {
        self.inner.read().await.log.len()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append_batch(&self, batch: Vec<StreamAppend>) -> Result<Vec<Version>> {
        validate_batch(&batch)?;

        let mut inner = self.inner.write().await;

        for stream in &batch {
            let aggregate_id = stream.aggregate_id();
            let current_version = inner.current_version(aggregate_id);

            if let Some(expected) = stream.options.expected_version
                && current_version != expected
            {
                tracing::debug!(%aggregate_id, %expected, actual = %current_version, "append rejected by version check");
                return Err(EventStoreError::ConcurrencyConflict {
                    aggregate_id,
                    expected,
                    actual: current_version,
                });
            }

            // Unique (aggregate_id, version) constraint simulation
            if stream.events[0].version <= current_version {
                return Err(EventStoreError::ConcurrencyConflict {
                    aggregate_id,
                    expected: stream.options.expected_version.unwrap_or(current_version),
                    actual: current_version,
                });
            }
        }

        let mut versions = Vec::with_capacity(batch.len());
        for stream in batch {
            let aggregate_id = stream.aggregate_id();
            let mut last_version = Version::initial();
            for mut event in stream.events {
                let index = inner.log.len();
                event.position = index as i64 + 1;
                last_version = event.version;
                inner.log.push(event);
                inner.streams.entry(aggregate_id).or_default().push(index);
            }
            versions.push(last_version);
        }

        tracing::trace!(streams = versions.len(), position = inner.log.len(), "event batch appended");
        Ok(versions)
    }

    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>> {
        let inner = self.inner.read().await;
        Ok(inner
            .streams
            .get(&aggregate_id)
            .map(|indices| indices.iter().map(|&i| inner.log[i].clone()).collect())
            .unwrap_or_default())
    }

    async fn read_all(&self, after: i64, limit: usize) -> Result<Vec<EventEnvelope>> {
        let inner = self.inner.read().await;
        let start = usize::try_from(after.max(0)).unwrap_or(usize::MAX);
        Ok(inner
            .log
            .iter()
            .skip(start)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>> {
        let inner = self.inner.read().await;
        Ok(inner
            .streams
            .contains_key(&aggregate_id)
            .then(|| inner.current_version(aggregate_id)))
    }
}
