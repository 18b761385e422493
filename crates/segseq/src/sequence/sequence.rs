use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use portable_atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{Error, RangeAllocator, Result, SequenceConfig, SequenceRange, Take};

const UNINITIALIZED: u8 = 0;
const INITIALIZING: u8 = 1;
const READY: u8 = 2;

/// Lifecycle of a [`Sequence`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SequenceState {
    Uninitialized,
    Initializing,
    Ready,
}

/// A named sequence serving identifiers from an in-memory [`SequenceRange`].
///
/// Values are taken from the cached range with a single atomic update and no
/// lock. Only when the range runs dry does a caller take the sequence's refill
/// lock, re-check the range another caller may have installed meanwhile, and
/// otherwise claim a fresh block from the [`RangeAllocator`]. Callers of other
/// sequences never wait on this lock.
///
/// Values are unique for the lifetime of the backing rows and increase within
/// one block. Across blocks (and across processes) they are only unique.
///
/// ## Features
/// - ✅ Thread-safe
/// - ✅ Lock-free between refills
/// - ✅ Optional deadline for refills
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use segseq::{MemoryStore, Sequence, SequenceConfig, SingleStoreAllocator};
///
/// let allocator = Arc::new(SingleStoreAllocator::new(MemoryStore::new()));
/// let sequence = Sequence::new(SequenceConfig::new("order").with_step(10), allocator);
/// sequence.init().unwrap();
///
/// let ids: Vec<i64> = (0..3).map(|_| sequence.next_value().unwrap()).collect();
/// assert_eq!(ids, vec![0, 1, 2]);
/// ```
pub struct Sequence<A>
where
    A: RangeAllocator + ?Sized,
{
    config: SequenceConfig,
    allocator: Arc<A>,
    current: ArcSwapOption<SequenceRange>,
    #[cfg(feature = "cache-padded")]
    refill: crossbeam_utils::CachePadded<Mutex<()>>,
    #[cfg(not(feature = "cache-padded"))]
    refill: Mutex<()>,
    state: AtomicU8,
    // Set once the allocator reports that no further block fits.
    exhausted: OnceLock<Error>,
    timeout: Option<Duration>,
}

impl<A> Sequence<A>
where
    A: RangeAllocator + ?Sized,
{
    /// Creates an uninitialized sequence. Call [`Self::init`] before taking
    /// values.
    pub fn new(config: SequenceConfig, allocator: Arc<A>) -> Self {
        Self {
            config,
            allocator,
            current: ArcSwapOption::empty(),
            #[cfg(feature = "cache-padded")]
            refill: crossbeam_utils::CachePadded::new(Mutex::new(())),
            #[cfg(not(feature = "cache-padded"))]
            refill: Mutex::new(()),
            state: AtomicU8::new(UNINITIALIZED),
            exhausted: OnceLock::new(),
            timeout: None,
        }
    }

    /// Bounds how long a single [`Self::next_value`] call may spend waiting
    /// for, and performing, a refill. A timeout too large to be represented
    /// as a deadline is the same as none.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Validates the configuration and makes sure the backing row exists.
    ///
    /// A failed `init` leaves the sequence uninitialized, so it may be retried
    /// once the store is reachable again.
    ///
    /// # Errors
    /// - [`Error::AlreadyInitialized`] if `init` already ran (or is running)
    /// - [`Error::Configuration`] if the config is invalid
    /// - any error the allocator reports while creating the row
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(sequence = self.config.name()))
    )]
    pub fn init(&self) -> Result<()> {
        if self
            .state
            .compare_exchange(UNINITIALIZED, INITIALIZING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::AlreadyInitialized {
                name: self.config.name().to_owned(),
            });
        }

        let prepared = self
            .config
            .validate()
            .and_then(|()| self.allocator.ensure_row(&self.config));
        match prepared {
            Ok(()) => {
                self.state.store(READY, Ordering::Release);
                #[cfg(feature = "tracing")]
                tracing::info!(
                    min_value = self.config.min_value(),
                    max_value = self.config.max_value(),
                    step = self.config.step(),
                    "sequence ready"
                );
                Ok(())
            }
            Err(e) => {
                self.state.store(UNINITIALIZED, Ordering::Release);
                Err(e)
            }
        }
    }

    /// Returns the next identifier of this sequence.
    ///
    /// # Errors
    /// - [`Error::NotInitialized`] before a successful [`Self::init`]
    /// - [`Error::SpaceExhausted`] once no further block fits below
    ///   `max_value`. From then on it is returned without asking the store
    /// - [`Error::AllocationRetriesExceeded`] if no store granted a block
    /// - [`Error::Timeout`] if a configured timeout passed during the refill
    pub fn next_value(&self) -> Result<i64> {
        if self.state.load(Ordering::Acquire) != READY {
            return Err(Error::NotInitialized {
                name: self.config.name().to_owned(),
            });
        }

        if let Some(range) = self.current.load().as_ref() {
            if let Take::Value(value) = range.take_next() {
                return Ok(value);
            }
        }
        self.refill_and_take()
    }

    #[cold]
    fn refill_and_take(&self) -> Result<i64> {
        if let Some(e) = self.exhausted.get() {
            return Err(e.clone());
        }

        let deadline = self
            .timeout
            .and_then(|timeout| Instant::now().checked_add(timeout));
        let _refill = match deadline {
            Some(deadline) => {
                self.refill
                    .try_lock_until(deadline)
                    .ok_or_else(|| Error::Timeout {
                        name: self.config.name().to_owned(),
                    })?
            }
            None => self.refill.lock(),
        };

        loop {
            // Another caller may have refilled while we waited for the lock.
            if let Some(range) = self.current.load_full() {
                if let Take::Value(value) = range.take_next() {
                    return Ok(value);
                }
            }
            if let Some(e) = self.exhausted.get() {
                return Err(e.clone());
            }

            let range = match self.allocator.next_range(&self.config, deadline) {
                Ok(range) => range,
                Err(e @ Error::SpaceExhausted { .. }) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(sequence = self.config.name(), "sequence exhausted: {e}");
                    return Err(self.exhausted.get_or_init(|| e).clone());
                }
                Err(e) => return Err(e),
            };
            #[cfg(feature = "tracing")]
            tracing::debug!(
                sequence = self.config.name(),
                min = range.min(),
                max = range.max(),
                "installed new range"
            );
            self.current.store(Some(Arc::new(range)));
        }
    }

    pub fn name(&self) -> &str {
        self.config.name()
    }

    pub const fn config(&self) -> &SequenceConfig {
        &self.config
    }

    pub const fn min_value(&self) -> i64 {
        self.config.min_value()
    }

    pub const fn max_value(&self) -> i64 {
        self.config.max_value()
    }

    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn allocator(&self) -> &Arc<A> {
        &self.allocator
    }

    pub fn state(&self) -> SequenceState {
        match self.state.load(Ordering::Acquire) {
            UNINITIALIZED => SequenceState::Uninitialized,
            INITIALIZING => SequenceState::Initializing,
            _ => SequenceState::Ready,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.state.load(Ordering::Acquire) == READY
    }
}

impl<A> core::fmt::Debug for Sequence<A>
where
    A: RangeAllocator + ?Sized,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let current = self.current.load();
        f.debug_struct("Sequence")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("range", &current.as_deref())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
