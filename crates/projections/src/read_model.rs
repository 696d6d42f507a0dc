//! Read model trait for query-side views.

/// A read model providing query access to denormalized data.
///
/// Read models are updated by projections and sized for listing pages,
/// not for audit. The event streams stay the source of truth.
pub trait ReadModel: Send + Sync {
    /// Returns the name of this read model.
    fn name(&self) -> &'static str;

    /// Returns the number of entries in this read model, or 0 while a
    /// projection holds its lock.
    fn count(&self) -> usize;
}
