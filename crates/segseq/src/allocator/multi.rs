use std::time::Instant;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    Error, RandSource, RangeAllocator, Result, RetryPolicy, SequenceConfig, SequenceRange,
    SequenceRow, SequenceStore, StoreError, ThreadRandom, WeightedSelector,
    allocator::protocol::{self, Slot},
};

/// A successful claim together with how it was reached.
#[derive(Debug)]
pub(crate) struct Allocation {
    pub(crate) range: SequenceRange,
    pub(crate) store: usize,
    pub(crate) excluded: Vec<usize>,
}

/// A [`RangeAllocator`] spread over several equivalent stores.
///
/// Each attempt asks a [`WeightedSelector`] for a store, skipping stores that
/// already failed during the current call. A store failure excludes the store
/// and retries elsewhere; a lost race retries without excluding anyone. When
/// every store has been excluded the exclusions are forgotten and the round
/// still counts against the retry budget.
///
/// Store `i` of `N` only ever claims the blocks of its own slot (see the
/// module docs of the claim protocol), so the stores may be fully independent
/// databases.
///
/// ## Recommended When
/// - The sequence table is replicated across several databases and any one of
///   them may be down
/// - Some gaps between blocks are acceptable
///
/// ## See Also
/// - [`SingleStoreAllocator`]
///
/// [`SingleStoreAllocator`]: crate::SingleStoreAllocator
pub struct MultiStoreAllocator<S, R = ThreadRandom>
where
    S: SequenceStore,
    R: RandSource,
{
    stores: Vec<S>,
    selector: WeightedSelector<R>,
    policy: RetryPolicy,
}

impl<S> MultiStoreAllocator<S, ThreadRandom>
where
    S: SequenceStore,
{
    /// Creates an allocator giving every store the same weight.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if `stores` is empty.
    ///
    /// # Example
    /// ```
    /// use segseq::{MemoryStore, MultiStoreAllocator, RangeAllocator, SequenceConfig};
    ///
    /// let allocator =
    ///     MultiStoreAllocator::new(vec![MemoryStore::new(), MemoryStore::new()]).unwrap();
    /// let config = SequenceConfig::new("order").with_step(10);
    ///
    /// let range = allocator.next_range(&config, None).unwrap();
    /// // Store 0 owns [0, 10), [20, 30), ...; store 1 owns [10, 20), [30, 40), ...
    /// assert_eq!(range.max() - range.min(), 10);
    /// assert_eq!(range.min() % 10, 0);
    /// ```
    pub fn new(stores: Vec<S>) -> Result<Self> {
        let selector = WeightedSelector::new(stores.len());
        Self::with_selector(stores, selector, RetryPolicy::default())
    }

    /// Creates an allocator with one selection weight per store.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if `stores` is empty or the number of
    /// weights differs from the number of stores.
    pub fn with_weights(stores: Vec<S>, weights: Vec<u32>) -> Result<Self> {
        let selector = WeightedSelector::with_weights(weights)?;
        Self::with_selector(stores, selector, RetryPolicy::default())
    }
}

impl<S, R> MultiStoreAllocator<S, R>
where
    S: SequenceStore,
    R: RandSource,
{
    /// Creates an allocator from explicit components.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if `stores` is empty or does not match
    /// the selector's candidate count.
    pub fn with_selector(
        stores: Vec<S>,
        selector: WeightedSelector<R>,
        policy: RetryPolicy,
    ) -> Result<Self> {
        if stores.is_empty() {
            return Err(Error::configuration(
                "a multi-store allocator needs at least one store",
            ));
        }
        if stores.len() != selector.len() {
            return Err(Error::configuration(format!(
                "{} stores configured but {} selection weights",
                stores.len(),
                selector.len()
            )));
        }
        Ok(Self {
            stores,
            selector,
            policy,
        })
    }

    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn stores(&self) -> &[S] {
        &self.stores
    }

    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn slot(&self, index: usize) -> Slot {
        Slot {
            index,
            count: self.stores.len(),
        }
    }

    pub(crate) fn allocate(
        &self,
        config: &SequenceConfig,
        deadline: Option<Instant>,
    ) -> Result<Allocation> {
        config.validate()?;

        let mut excluded: Vec<usize> = Vec::with_capacity(self.stores.len());
        let mut chosen = 0;
        let range = protocol::with_retries(config, &self.policy, deadline, || {
            let index = match self.selector.pick(&excluded) {
                Some(index) => index,
                None => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        sequence = config.name(),
                        ?excluded,
                        "every store excluded, resetting exclusions"
                    );
                    excluded.clear();
                    self.selector.pick(&excluded).ok_or_else(|| {
                        Error::configuration("no store carries any selection weight")
                    })?
                }
            };
            chosen = index;

            let claimed = protocol::claim(
                &self.stores[index],
                self.slot(index),
                config,
                self.policy.adjust,
            );
            if let Err(Error::StoreUnavailable { .. }) = claimed {
                excluded.push(index);
            }
            claimed
        })?;

        Ok(Allocation {
            range,
            store: chosen,
            excluded,
        })
    }

    /// Runs `op` against the stores in weighted order until one answers.
    fn first_answer<T>(&self, op: impl Fn(&S) -> Result<T, StoreError>) -> Result<T> {
        let mut last = None;
        for index in self.selector.visiting_order() {
            match op(&self.stores[index]) {
                Ok(answer) => return Ok(answer),
                Err(source) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(store = index, "store did not answer: {source}");
                    last = Some(Error::StoreUnavailable {
                        store: index,
                        source,
                    });
                }
            }
        }
        Err(last.unwrap_or_else(|| Error::configuration("no stores configured")))
    }
}

impl<S, R> RangeAllocator for MultiStoreAllocator<S, R>
where
    S: SequenceStore,
    R: RandSource + Send + Sync,
{
    /// Creates the row on every store. Succeeds as long as at least one store
    /// holds the row afterwards.
    fn ensure_row(&self, config: &SequenceConfig) -> Result<()> {
        config.validate()?;

        let mut last = None;
        let mut ready = 0usize;
        for (index, store) in self.stores.iter().enumerate() {
            match protocol::ensure_row(store, self.slot(index), config) {
                Ok(()) => ready += 1,
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        sequence = config.name(),
                        store = index,
                        "could not ensure sequence row: {e}"
                    );
                    last = Some(e);
                }
            }
        }

        match last {
            Some(e) if ready == 0 => Err(e),
            _ => Ok(()),
        }
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
        self.allocate(config, deadline)
            .map(|allocation| allocation.range)
    }

    fn list_rows(&self) -> Result<Vec<SequenceRow>> {
        self.first_answer(SequenceStore::list_rows)
    }

    fn find_row(&self, name: &str) -> Result<Option<SequenceRow>> {
        self.first_answer(|store| store.find_row(name))
    }
}
