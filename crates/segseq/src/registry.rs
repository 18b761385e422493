use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{Error, IdFormat, RangeAllocator, Result, Sequence, SequenceConfig};

/// Owns every [`Sequence`] of an application, keyed by name.
///
/// The registry is an ordinary value: build one around an allocator and share
/// it by reference or [`Arc`]. Sequences are created either up front by
/// [`Self::bootstrap`], which loads every persisted row, or on first use of a
/// name. A name maps to at most one [`Sequence`] for the registry's lifetime,
/// however many callers race to use it first.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use segseq::{
///     MemoryStore, SequenceConfig, SequenceRegistry, SequenceRow, SingleStoreAllocator,
/// };
///
/// let store = MemoryStore::with_rows([SequenceRow::for_config(
///     &SequenceConfig::new("order").with_step(50),
///     0,
/// )]);
/// let registry = SequenceRegistry::new(Arc::new(SingleStoreAllocator::new(store)));
/// assert_eq!(registry.bootstrap().unwrap(), 1);
///
/// assert_eq!(registry.next_value("order").unwrap(), 0);
/// assert_eq!(registry.next_value("order").unwrap(), 1);
/// ```
pub struct SequenceRegistry<A>
where
    A: RangeAllocator + ?Sized,
{
    allocator: Arc<A>,
    sequences: RwLock<HashMap<String, Arc<Sequence<A>>>>,
    // One guard per name that is being created right now. Entries are
    // removed once the last interested caller is done with them.
    creating: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    timeout: Option<Duration>,
}

impl<A> SequenceRegistry<A>
where
    A: RangeAllocator + ?Sized,
{
    pub fn new(allocator: Arc<A>) -> Self {
        Self {
            allocator,
            sequences: RwLock::new(HashMap::new()),
            creating: Mutex::new(HashMap::new()),
            timeout: None,
        }
    }

    /// Applies `timeout` to every sequence this registry creates.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Creates and initializes a sequence for every persisted row.
    ///
    /// A row that fails validation or initialization is logged and skipped.
    /// Names already known to the registry are left alone. Row names are used
    /// exactly as stored. Returns how many sequences were added.
    ///
    /// # Errors
    /// Returns the allocator's error if the rows cannot be listed at all.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip_all))]
    pub fn bootstrap(&self) -> Result<usize> {
        let rows = self.allocator.list_rows()?;

        let mut loaded = 0;
        for row in rows {
            match self.get_or_create(&row.name, || Ok(row.config())) {
                Ok((_, true)) => loaded += 1,
                Ok((_, false)) => {}
                Err(_e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(sequence = row.name, "skipping sequence row: {_e}");
                }
            }
        }

        #[cfg(feature = "tracing")]
        tracing::info!(loaded, "sequences bootstrapped");
        Ok(loaded)
    }

    /// Returns the next identifier of the sequence `name`, loading the
    /// sequence from its persisted row on first use.
    ///
    /// # Errors
    /// - [`Error::Configuration`] for a blank name
    /// - [`Error::UnknownSequence`] if no row exists for `name`
    /// - anything [`Sequence::next_value`] reports
    pub fn next_value(&self, name: &str) -> Result<i64> {
        self.sequence(name)?.next_value()
    }

    /// Like [`Self::next_value`], rendered through `format` with today's date.
    ///
    /// # Errors
    /// See [`Self::next_value`].
    pub fn next_formatted(&self, name: &str, format: &IdFormat) -> Result<String> {
        let sequence = self.sequence(name)?;
        let value = sequence.next_value()?;
        Ok(format.render_today(value, sequence.max_value()))
    }

    /// The sequence for `name`, loaded from its persisted row if the registry
    /// does not know it yet.
    ///
    /// Only callers asking for the same unknown name wait on each other.
    ///
    /// # Errors
    /// - [`Error::Configuration`] for a blank name or an invalid row
    /// - [`Error::UnknownSequence`] if no row exists for `name`
    pub fn sequence(&self, name: &str) -> Result<Arc<Sequence<A>>> {
        if name.trim().is_empty() {
            return Err(Error::configuration("sequence name must not be blank"));
        }
        if let Some(sequence) = self.get(name) {
            return Ok(sequence);
        }

        let (sequence, _created) = self.get_or_create(name, || {
            self.allocator
                .find_row(name)?
                .map(|row| row.config())
                .ok_or_else(|| Error::UnknownSequence {
                    name: name.to_owned(),
                })
        })?;
        #[cfg(feature = "tracing")]
        if _created {
            tracing::info!(sequence = name, "loaded sequence on first use");
        }
        Ok(sequence)
    }

    /// Returns the sequence named by `config`, creating it (and its persisted
    /// row) if the registry does not know it yet.
    ///
    /// An already registered sequence is returned as is, even if `config`
    /// differs from the config it was created with.
    ///
    /// # Errors
    /// - [`Error::Configuration`] if `config` is invalid
    /// - anything [`Sequence::init`] reports
    pub fn register(&self, config: SequenceConfig) -> Result<Arc<Sequence<A>>> {
        config.validate()?;
        if let Some(sequence) = self.get(config.name()) {
            return Ok(sequence);
        }

        let name = config.name().to_owned();
        let (sequence, _) = self.get_or_create(&name, || Ok(config))?;
        Ok(sequence)
    }

    /// Returns the sequence for `name`, building it from `load` if it is not
    /// known yet. The flag is `true` when this call built it.
    ///
    /// Creation of one name is serialized on that name's guard and re-checked
    /// after the guard is taken, so a name is built at most once.
    fn get_or_create(
        &self,
        name: &str,
        load: impl FnOnce() -> Result<SequenceConfig>,
    ) -> Result<(Arc<Sequence<A>>, bool)> {
        let guard = Arc::clone(self.creating.lock().entry(name.to_owned()).or_default());

        let created = {
            let _creating = guard.lock();
            match self.get(name) {
                Some(sequence) => Ok((sequence, false)),
                None => load().and_then(|config| self.build(config)).map(|sequence| {
                    self.sequences
                        .write()
                        .insert(name.to_owned(), Arc::clone(&sequence));
                    (sequence, true)
                }),
            }
        };

        let mut creating = self.creating.lock();
        // The map holds one reference and we hold the other: nobody else is
        // waiting on this guard.
        if Arc::strong_count(&guard) == 2
            && creating
                .get(name)
                .is_some_and(|current| Arc::ptr_eq(current, &guard))
        {
            creating.remove(name);
        }
        created
    }

    fn build(&self, config: SequenceConfig) -> Result<Arc<Sequence<A>>> {
        let mut sequence = Sequence::new(config, Arc::clone(&self.allocator));
        if let Some(timeout) = self.timeout {
            sequence = sequence.with_timeout(timeout);
        }
        sequence.init()?;
        Ok(Arc::new(sequence))
    }

    /// The already loaded sequence for `name`. Never touches the store.
    pub fn get(&self, name: &str) -> Option<Arc<Sequence<A>>> {
        self.sequences.read().get(name).cloned()
    }

    /// Names of all loaded sequences, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.sequences.read().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.sequences.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.read().is_empty()
    }

    pub fn allocator(&self) -> &Arc<A> {
        &self.allocator
    }
}
