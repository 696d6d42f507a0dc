//! Core projection trait and position tracking.

use async_trait::async_trait;
use event_store::EventEnvelope;

use crate::Result;

/// Tracks how far into the global event log a projection has read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectionPosition {
    /// Global position of the last event seen, 0 before the first.
    pub last_position: i64,
    /// Number of events seen, including ones the projection ignores.
    pub events_processed: u64,
}

impl ProjectionPosition {
    /// Creates a new position at zero.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Moves the position to the given global position.
    pub fn advance_to(&self, position: i64) -> Self {
        Self {
            last_position: position.max(self.last_position),
            events_processed: self.events_processed + 1,
        }
    }

    /// Returns true when the event at `position` has not been seen yet.
    pub fn is_behind(&self, position: i64) -> bool {
        self.last_position < position
    }
}

impl std::fmt::Display for ProjectionPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "position({})", self.last_position)
    }
}

/// A projection that processes events and updates a read model.
///
/// Every event in the global log is delivered in position order. A
/// projection must advance its position even for events it ignores, so a
/// catch-up never re-reads them.
#[async_trait]
pub trait Projection: Send + Sync {
    /// Returns the name of this projection.
    fn name(&self) -> &'static str;

    /// Handles a single event, updating the projection's read model.
    async fn handle(&self, event: &EventEnvelope) -> Result<()>;

    /// Returns the current position of this projection.
    async fn position(&self) -> ProjectionPosition;

    /// Resets the projection to its initial state.
    async fn reset(&self) -> Result<()>;
}
