//! Command handling infrastructure.

use std::future::Future;
use std::marker::PhantomData;

use common::AggregateId;
use event_store::{AppendOptions, EventEnvelope, EventStore, EventStoreExt, StreamAppend, Version};

use crate::aggregate::{Aggregate, DomainEvent};
use crate::error::DomainError;

/// Upper bound on load-decide-append cycles for one operation.
pub const MAX_COMMIT_ATTEMPTS: usize = 8;

/// Result of command execution.
#[derive(Debug)]
pub struct CommandResult<A: Aggregate> {
    /// The aggregate after applying the new events.
    pub aggregate: A,

    /// The events that were generated and persisted.
    pub events: Vec<A::Event>,

    /// The new version of the aggregate after the command.
    pub new_version: Version,
}

/// Trait for commands that can be executed against an aggregate.
///
/// Commands represent an intention to perform an action. They may be rejected
/// if the aggregate's current state doesn't allow the action.
pub trait Command: Send + Sync {
    /// The type of aggregate this command targets.
    type Aggregate: Aggregate;

    /// Returns the ID of the aggregate this command targets.
    fn aggregate_id(&self) -> AggregateId;
}

/// Errors that may signal a lost optimistic-concurrency race.
pub trait ConflictAware {
    fn is_conflict(&self) -> bool;
}

/// Runs `attempt` until it succeeds, fails with a non-conflict error, or
/// [`MAX_COMMIT_ATTEMPTS`] is reached. Each attempt must reload its state.
pub async fn retry_on_conflict<T, E, F, Fut>(operation: &'static str, mut attempt: F) -> Result<T, E>
where
    E: ConflictAware,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempts = 1;
    loop {
        match attempt().await {
            Err(err) if err.is_conflict() && attempts < MAX_COMMIT_ATTEMPTS => {
                attempts += 1;
                metrics::counter!("commit_conflicts_total", "operation" => operation).increment(1);
                tracing::debug!(operation, attempts, "concurrency conflict, retrying");
                tokio::task::yield_now().await;
            }
            result => return result,
        }
    }
}

/// Builds envelopes for `events`, numbering versions after `current_version`.
pub fn build_envelopes<A: Aggregate>(
    aggregate_id: AggregateId,
    current_version: Version,
    events: &[A::Event],
) -> Result<Vec<EventEnvelope>, DomainError> {
    let mut envelopes = Vec::with_capacity(events.len());
    let mut version = current_version;

    for event in events {
        version = version.next();
        let envelope = EventEnvelope::builder()
            .aggregate_id(aggregate_id)
            .aggregate_type(A::aggregate_type())
            .event_type(event.event_type())
            .version(version)
            .payload(event)?
            .build()?;
        envelopes.push(envelope);
    }

    Ok(envelopes)
}

fn append_options(current_version: Version) -> AppendOptions {
    if current_version == Version::initial() {
        AppendOptions::expect_new()
    } else {
        AppendOptions::expect_version(current_version)
    }
}

/// Events for several aggregates that must be committed together.
///
/// Each recorded stream carries the version its events were decided
/// against; the commit fails as a whole if any of them moved meanwhile.
#[derive(Debug, Default)]
pub struct UnitOfWork {
    streams: Vec<StreamAppend>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages `events` for the aggregate loaded at `current_version`.
    /// Empty event lists are ignored.
    pub fn record<A: Aggregate>(
        &mut self,
        aggregate_id: AggregateId,
        current_version: Version,
        events: &[A::Event],
    ) -> Result<(), DomainError> {
        if events.is_empty() {
            return Ok(());
        }
        let envelopes = build_envelopes::<A>(aggregate_id, current_version, events)?;
        self.streams
            .push(StreamAppend::new(envelopes, append_options(current_version)));
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Appends every staged stream atomically.
    pub async fn commit<S: EventStore + ?Sized>(
        self,
        store: &S,
    ) -> Result<Vec<Version>, DomainError> {
        if self.streams.is_empty() {
            return Ok(Vec::new());
        }
        Ok(store.append_batch(self.streams).await?)
    }
}

/// Loads aggregates from the store and persists the events their commands
/// produce.
pub struct CommandHandler<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    store: S,
    _phantom: PhantomData<A>,
}

impl<S, A> CommandHandler<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    /// Creates a new command handler with the given event store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            _phantom: PhantomData,
        }
    }

    /// Returns a reference to the underlying event store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Loads an aggregate from the event store.
    ///
    /// If the aggregate doesn't exist, returns a default instance.
    pub async fn load(&self, aggregate_id: AggregateId) -> Result<A, DomainError> {
        let events = self.store.get_events_for_aggregate(aggregate_id).await?;

        let mut aggregate = A::default();
        for envelope in events {
            let event: A::Event = serde_json::from_value(envelope.payload)?;
            aggregate.apply(event);
            aggregate.set_version(envelope.version);
        }

        Ok(aggregate)
    }

    /// Loads an aggregate, returning None if it doesn't exist.
    pub async fn load_existing(&self, aggregate_id: AggregateId) -> Result<Option<A>, DomainError> {
        let aggregate = self.load(aggregate_id).await?;
        Ok(aggregate.exists().then_some(aggregate))
    }

    /// Executes a command and persists the resulting events.
    ///
    /// The command function receives the current aggregate state and returns
    /// either a list of events to apply, or an error.
    pub async fn execute<F>(
        &self,
        aggregate_id: AggregateId,
        command_fn: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: FnOnce(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        let mut aggregate = self.load(aggregate_id).await?;
        let current_version = aggregate.version();

        let events = command_fn(&aggregate)?;

        if events.is_empty() {
            return Ok(CommandResult {
                aggregate,
                events: vec![],
                new_version: current_version,
            });
        }

        let envelopes = build_envelopes::<A>(aggregate_id, current_version, &events)?;
        let new_version = self
            .store
            .append(envelopes, append_options(current_version))
            .await?;

        for event in &events {
            aggregate.apply(event.clone());
        }
        aggregate.set_version(new_version);

        Ok(CommandResult {
            aggregate,
            events,
            new_version,
        })
    }

    /// Like [`execute`](Self::execute), but reloads and re-decides when
    /// another writer appended to the stream first.
    pub async fn execute_with_retry<F>(
        &self,
        operation: &'static str,
        aggregate_id: AggregateId,
        command_fn: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: Fn(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        retry_on_conflict(operation, || self.execute(aggregate_id, &command_fn)).await
    }
}
