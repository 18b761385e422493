use portable_atomic::{AtomicI64, Ordering};

/// Outcome of [`SequenceRange::take_next`].
///
/// Exhaustion is its own variant rather than a sentinel value, so the last
/// legitimate identifier of a range can never be mistaken for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Take {
    /// The next identifier of the range.
    Value(i64),
    /// The range has been fully handed out.
    Exhausted,
}

/// A claimed block of identifiers `[min, max)` with a lock-free cursor.
///
/// A range is created by an allocator after a successful conditional update
/// against the backing store, so the process owns every value in it
/// exclusively. The cursor never advances past `max`.
///
/// # Example
/// ```
/// use segseq::{SequenceRange, Take};
///
/// let range = SequenceRange::new(10, 12);
/// assert_eq!(range.take_next(), Take::Value(10));
/// assert_eq!(range.take_next(), Take::Value(11));
/// assert_eq!(range.take_next(), Take::Exhausted);
/// assert!(range.is_exhausted());
/// ```
#[derive(Debug)]
pub struct SequenceRange {
    min: i64,
    max: i64,
    #[cfg(feature = "cache-padded")]
    cursor: crossbeam_utils::CachePadded<AtomicI64>,
    #[cfg(not(feature = "cache-padded"))]
    cursor: AtomicI64,
}

impl SequenceRange {
    /// Creates a range over `[min, max)`. An empty or inverted range is
    /// exhausted from the start.
    pub fn new(min: i64, max: i64) -> Self {
        Self {
            min,
            max,
            #[cfg(feature = "cache-padded")]
            cursor: crossbeam_utils::CachePadded::new(AtomicI64::new(min)),
            #[cfg(not(feature = "cache-padded"))]
            cursor: AtomicI64::new(min),
        }
    }

    /// Inclusive lower bound.
    pub const fn min(&self) -> i64 {
        self.min
    }

    /// Exclusive upper bound.
    pub const fn max(&self) -> i64 {
        self.max
    }

    /// Hands out the next identifier, or [`Take::Exhausted`] once the cursor
    /// reached `max`. Safe to call from any number of threads.
    #[inline]
    pub fn take_next(&self) -> Take {
        let max = self.max;
        match self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cursor| {
                (cursor < max).then(|| cursor + 1)
            }) {
            Ok(value) => Take::Value(value),
            Err(_) => Take::Exhausted,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor.load(Ordering::Acquire) >= self.max
    }

    /// Number of identifiers not yet handed out.
    pub fn remaining(&self) -> i64 {
        (self.max - self.cursor.load(Ordering::Acquire)).max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::thread::scope;

    #[test]
    fn hands_out_values_in_order() {
        let range = SequenceRange::new(100, 105);
        let values: Vec<_> = (0..5).map(|_| range.take_next()).collect();
        assert_eq!(
            values,
            (100..105).map(Take::Value).collect::<Vec<_>>(),
        );
        assert_eq!(range.remaining(), 0);
        assert_eq!(range.take_next(), Take::Exhausted);
        // The cursor stays parked at `max`.
        assert_eq!(range.take_next(), Take::Exhausted);
        assert_eq!(range.remaining(), 0);
    }

    #[test]
    fn empty_range_is_exhausted() {
        let range = SequenceRange::new(7, 7);
        assert!(range.is_exhausted());
        assert_eq!(range.take_next(), Take::Exhausted);
    }

    #[test]
    fn last_value_of_the_space_is_a_value() {
        let range = SequenceRange::new(i64::MAX - 1, i64::MAX);
        assert_eq!(range.take_next(), Take::Value(i64::MAX - 1));
        assert_eq!(range.take_next(), Take::Exhausted);
    }

    #[test]
    fn concurrent_takes_are_unique_and_complete() {
        const THREADS: usize = 8;
        const TOTAL: i64 = 10_000;

        let range = SequenceRange::new(0, TOTAL);
        let seen = Mutex::new(HashSet::new());

        scope(|s| {
            for _ in 0..THREADS {
                s.spawn(|| {
                    let mut local = Vec::new();
                    let mut last = -1;
                    while let Take::Value(v) = range.take_next() {
                        assert!(v > last, "per-thread values must increase");
                        last = v;
                        local.push(v);
                    }
                    let mut seen = seen.lock().unwrap();
                    for v in local {
                        assert!(seen.insert(v), "duplicate value: {v}");
                    }
                });
            }
        });

        assert_eq!(seen.into_inner().unwrap().len(), TOTAL as usize);
        assert!(range.is_exhausted());
    }
}
