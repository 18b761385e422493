use crate::{Error, RandSource, Result, ThreadRandom};

/// Weight given to every store when none is configured.
pub const DEFAULT_WEIGHT: u32 = 10;

/// Weighted random choice among equivalent backing stores.
///
/// Each call builds a cumulative-weight partition over the stores that are not
/// excluded, draws a uniform integer in `[0, total)` and returns the index
/// whose interval contains it. Excluded stores contribute weight zero. Nothing
/// but the weight table is kept between calls.
///
/// # Example
/// ```
/// use segseq::WeightedSelector;
///
/// let selector = WeightedSelector::new(3);
/// let picked = selector.pick(&[0, 1]);
/// assert_eq!(picked, Some(2));
/// assert_eq!(selector.pick(&[0, 1, 2]), None);
/// ```
#[derive(Clone, Debug)]
pub struct WeightedSelector<R = ThreadRandom>
where
    R: RandSource,
{
    weights: Vec<u32>,
    rng: R,
}

impl WeightedSelector<ThreadRandom> {
    /// Creates a selector over `count` stores, all with [`DEFAULT_WEIGHT`].
    pub fn new(count: usize) -> Self {
        Self {
            weights: vec![DEFAULT_WEIGHT; count],
            rng: ThreadRandom,
        }
    }

    /// Creates a selector with one explicit weight per store.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if `weights` is empty.
    pub fn with_weights(weights: Vec<u32>) -> Result<Self> {
        Self::with_weights_and_rng(weights, ThreadRandom)
    }
}

impl<R> WeightedSelector<R>
where
    R: RandSource,
{
    /// Creates a selector drawing from a custom [`RandSource`].
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if `weights` is empty.
    pub fn with_weights_and_rng(weights: Vec<u32>, rng: R) -> Result<Self> {
        if weights.is_empty() {
            return Err(Error::configuration(
                "a store selector needs at least one candidate",
            ));
        }
        Ok(Self { weights, rng })
    }

    /// Number of candidates.
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn weights(&self) -> &[u32] {
        &self.weights
    }

    /// Picks a candidate index, skipping every index in `excluded`.
    ///
    /// Returns `None` when no candidate carries any weight, i.e. every store
    /// is excluded. This is never papered over with an arbitrary choice.
    pub fn pick(&self, excluded: &[usize]) -> Option<usize> {
        let mut ends = Vec::with_capacity(self.weights.len());
        let mut total: u64 = 0;
        for (idx, &weight) in self.weights.iter().enumerate() {
            if !excluded.contains(&idx) {
                total += u64::from(weight);
            }
            ends.push(total);
        }

        if total == 0 {
            #[cfg(feature = "tracing")]
            tracing::error!(?ends, ?excluded, "no store candidate left to select");
            return None;
        }

        let draw = self.rng.below(total);
        ends.iter().position(|&end| draw < end)
    }

    /// Candidate indices in the order a sequence of [`Self::pick`] calls would
    /// visit them if each pick were excluded afterwards.
    pub(crate) fn visiting_order(&self) -> Vec<usize> {
        let mut excluded = Vec::with_capacity(self.weights.len());
        while let Some(idx) = self.pick(&excluded) {
            excluded.push(idx);
        }
        // Zero-weight stores are still worth asking for reads.
        for idx in 0..self.weights.len() {
            if !excluded.contains(&idx) {
                excluded.push(idx);
            }
        }
        excluded
    }
}
