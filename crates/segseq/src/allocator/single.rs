use std::time::Instant;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    Error, RangeAllocator, Result, RetryPolicy, SequenceConfig, SequenceRange, SequenceRow,
    SequenceStore,
    allocator::protocol::{self, Slot},
};

/// A [`RangeAllocator`] backed by exactly one store.
///
/// Every attempt goes to the same store; both store failures and lost races
/// are simply retried up to the [`RetryPolicy`] budget.
///
/// ## Recommended When
/// - There is one authoritative database for the sequence table
/// - You want the smallest possible gaps between claimed blocks
///
/// ## See Also
/// - [`MultiStoreAllocator`]
///
/// [`MultiStoreAllocator`]: crate::MultiStoreAllocator
pub struct SingleStoreAllocator<S>
where
    S: SequenceStore,
{
    store: S,
    policy: RetryPolicy,
}

impl<S> SingleStoreAllocator<S>
where
    S: SequenceStore,
{
    /// Creates an allocator with the default [`RetryPolicy`].
    ///
    /// # Example
    /// ```
    /// use segseq::{MemoryStore, RangeAllocator, SequenceConfig, SingleStoreAllocator};
    ///
    /// let allocator = SingleStoreAllocator::new(MemoryStore::new());
    /// let config = SequenceConfig::new("order").with_step(100);
    ///
    /// let first = allocator.next_range(&config, None).unwrap();
    /// let second = allocator.next_range(&config, None).unwrap();
    /// assert_eq!((first.min(), first.max()), (0, 100));
    /// assert_eq!((second.min(), second.max()), (100, 200));
    /// ```
    pub fn new(store: S) -> Self {
        Self::with_policy(store, RetryPolicy::default())
    }

    pub fn with_policy(store: S, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

impl<S> RangeAllocator for SingleStoreAllocator<S>
where
    S: SequenceStore,
{
    fn ensure_row(&self, config: &SequenceConfig) -> Result<()> {
        config.validate()?;
        protocol::ensure_row(&self.store, Slot::SINGLE, config)
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(sequence = config.name()))
    )]
    fn next_range(
        &self,
        config: &SequenceConfig,
        deadline: Option<Instant>,
    ) -> Result<SequenceRange> {
        config.validate()?;
        protocol::with_retries(config, &self.policy, deadline, || {
            protocol::claim(&self.store, Slot::SINGLE, config, self.policy.adjust)
        })
    }

    fn list_rows(&self) -> Result<Vec<SequenceRow>> {
        self.store
            .list_rows()
            .map_err(|source| Error::StoreUnavailable { store: 0, source })
    }

    fn find_row(&self, name: &str) -> Result<Option<SequenceRow>> {
        self.store
            .find_row(name)
            .map_err(|source| Error::StoreUnavailable { store: 0, source })
    }
}
