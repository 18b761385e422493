use crate::{Result, SequenceConfig, SequenceRange, SequenceRow};
use std::sync::Arc;
use std::time::Instant;

/// Hands out fresh [`SequenceRange`]s for a sequence.
///
/// A [`Sequence`] is parameterized over this trait, so the cache and refill
/// logic are shared between the single-store and multi-store flavours, which
/// only differ in how a store is chosen for each attempt.
///
/// [`Sequence`]: crate::Sequence
pub trait RangeAllocator: Send + Sync {
    /// Makes sure the backing store holds a row for `config`, creating it with
    /// its starting value if absent.
    fn ensure_row(&self, config: &SequenceConfig) -> Result<()>;

    /// Claims the next block of identifiers for `config`.
    ///
    /// Transient failures are retried internally. `deadline`, when set, is
    /// checked before every attempt.
    ///
    /// # Errors
    /// - [`Error::SpaceExhausted`] when the numeric space is used up
    /// - [`Error::AllocationRetriesExceeded`] when the retry budget ran out
    /// - [`Error::Timeout`] when `deadline` passed
    /// - [`Error::Configuration`] for an invalid `config`
    ///
    /// [`Error::SpaceExhausted`]: crate::Error::SpaceExhausted
    /// [`Error::AllocationRetriesExceeded`]: crate::Error::AllocationRetriesExceeded
    /// [`Error::Timeout`]: crate::Error::Timeout
    /// [`Error::Configuration`]: crate::Error::Configuration
    fn next_range(
        &self,
        config: &SequenceConfig,
        deadline: Option<Instant>,
    ) -> Result<SequenceRange>;

    /// Every persisted row, used to bootstrap a registry.
    fn list_rows(&self) -> Result<Vec<SequenceRow>>;

    /// The persisted row for `name`, if any.
    fn find_row(&self, name: &str) -> Result<Option<SequenceRow>>;
}

impl<A> RangeAllocator for Arc<A>
where
    A: RangeAllocator + ?Sized,
{
    fn ensure_row(&self, config: &SequenceConfig) -> Result<()> {
        (**self).ensure_row(config)
    }

    fn next_range(
        &self,
        config: &SequenceConfig,
        deadline: Option<Instant>,
    ) -> Result<SequenceRange> {
        (**self).next_range(config, deadline)
    }

    fn list_rows(&self) -> Result<Vec<SequenceRow>> {
        (**self).list_rows()
    }

    fn find_row(&self, name: &str) -> Result<Option<SequenceRow>> {
        (**self).find_row(name)
    }
}
