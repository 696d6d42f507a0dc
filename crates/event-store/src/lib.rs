//! Append-only event log.
//!
//! Every aggregate owns one stream, ordered by [`Version`]. Appends carry an
//! expected version per stream and may span several streams at once; either
//! every stream in a batch is written or none is. Each stored event also gets
//! a store-wide position so read models can catch up incrementally.

pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod store;

pub use common::{AggregateId, IdNamespace};
pub use error::{EventStoreError, Result};
pub use event::{EventEnvelope, EventEnvelopeBuilder, EventId, Version};
pub use memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use store::{AppendOptions, EventStore, EventStoreExt, StreamAppend};
