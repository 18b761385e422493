//! The optimistic claim shared by every allocator.
//!
//! With `N` stores, store `i` owns the blocks starting at
//! `min_value + i * step + k * N * step`. Its row starts at
//! `min_value + i * step` and every successful claim moves it forward by
//! `N * step`, so stores never hand out overlapping blocks even when they do
//! not share state. With a single store this degenerates to
//! `[value, value + step)` and `value += step`.

use crate::{
    Error, Result, RetryPolicy, SequenceConfig, SequenceRange, SequenceRow, SequenceStore,
    StoreError,
};
use std::time::Instant;

/// Position of one store among the stores of an allocator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Slot {
    pub(crate) index: usize,
    pub(crate) count: usize,
}

impl Slot {
    pub(crate) const SINGLE: Self = Self { index: 0, count: 1 };

    fn offset(self, step: i64) -> i64 {
        step.saturating_mul(i64::try_from(self.index).unwrap_or(i64::MAX))
    }

    /// How far a successful claim moves the row.
    pub(crate) fn outer_step(self, step: i64) -> i64 {
        step.saturating_mul(i64::try_from(self.count).unwrap_or(i64::MAX))
    }

    /// Value a freshly inserted row starts at.
    pub(crate) fn initial_value(self, config: &SequenceConfig) -> i64 {
        config.min_value().saturating_add(self.offset(config.step()))
    }

    /// The smallest value `>= value` that starts a block owned by this slot.
    /// A single store owns every value from `min_value` on.
    pub(crate) fn align(self, config: &SequenceConfig, value: i64) -> i64 {
        let min = config.min_value();
        if self.count <= 1 {
            return value.max(min);
        }
        let outer = self.outer_step(config.step());
        let offset = self.offset(config.step());
        let relative = value.saturating_sub(min).max(0);
        let base = relative - relative % outer;
        let mut aligned = base.saturating_add(offset);
        if aligned < relative {
            aligned = aligned.saturating_add(outer);
        }
        min.saturating_add(aligned)
    }
}

fn unavailable(slot: Slot) -> impl FnOnce(StoreError) -> Error {
    move |source| Error::StoreUnavailable {
        store: slot.index,
        source,
    }
}

/// Current value of the row, inserting the row first if it does not exist.
fn read_or_create<S>(store: &S, slot: Slot, config: &SequenceConfig) -> Result<i64>
where
    S: SequenceStore + ?Sized,
{
    let name = config.name();
    if let Some(value) = store.read_value(name).map_err(unavailable(slot))? {
        return Ok(value);
    }

    let row = SequenceRow::for_config(config, slot.initial_value(config));
    let _inserted = store.insert_if_absent(&row).map_err(unavailable(slot))?;
    #[cfg(feature = "tracing")]
    if _inserted {
        tracing::info!(sequence = name, store = slot.index, value = row.value, "created sequence row");
    }

    store
        .read_value(name)
        .map_err(unavailable(slot))?
        .ok_or_else(|| Error::StoreUnavailable {
            store: slot.index,
            source: StoreError::malformed(name, "row missing right after insert"),
        })
}

/// Creates the row for `config` in the store at `slot` if it does not exist.
pub(crate) fn ensure_row<S>(store: &S, slot: Slot, config: &SequenceConfig) -> Result<()>
where
    S: SequenceStore + ?Sized,
{
    let row = SequenceRow::for_config(config, slot.initial_value(config));
    let _inserted = store.insert_if_absent(&row).map_err(unavailable(slot))?;
    #[cfg(feature = "tracing")]
    if _inserted {
        tracing::info!(
            sequence = config.name(),
            store = slot.index,
            value = row.value,
            "created sequence row"
        );
    }
    Ok(())
}

/// One claim attempt against one store.
///
/// # Errors
/// - [`Error::StoreUnavailable`] if the store failed
/// - [`Error::LostRace`] if the conditional update matched no row
/// - [`Error::SpaceExhausted`] if the next block passes `max_value`
/// - [`Error::Configuration`] if the row sits outside this store's slot and
///   `adjust` is off
pub(crate) fn claim<S>(
    store: &S,
    slot: Slot,
    config: &SequenceConfig,
    adjust: bool,
) -> Result<SequenceRange>
where
    S: SequenceStore + ?Sized,
{
    let name = config.name();
    let mut value = read_or_create(store, slot, config)?;

    let aligned = slot.align(config, value);
    if aligned != value {
        if !adjust {
            return Err(Error::configuration(format!(
                "value {value} of `{name}` on store #{} is outside the store's slot",
                slot.index
            )));
        }
        #[cfg(feature = "tracing")]
        tracing::warn!(
            sequence = name,
            store = slot.index,
            from = value,
            to = aligned,
            "adjusting sequence row into its slot"
        );
        let rows = store
            .compare_and_swap_value(name, value, aligned)
            .map_err(unavailable(slot))?;
        if rows == 0 {
            return Err(Error::LostRace {
                name: name.to_owned(),
                store: slot.index,
            });
        }
        value = aligned;
    }

    let end = match value.checked_add(config.step()) {
        Some(end) if end <= config.max_value() => end,
        _ => {
            return Err(Error::SpaceExhausted {
                name: name.to_owned(),
                value,
                step: config.step(),
                max_value: config.max_value(),
            });
        }
    };
    let next = value.saturating_add(slot.outer_step(config.step()));

    let rows = store
        .compare_and_swap_value(name, value, next)
        .map_err(unavailable(slot))?;
    if rows == 0 {
        return Err(Error::LostRace {
            name: name.to_owned(),
            store: slot.index,
        });
    }
    Ok(SequenceRange::new(value, end))
}

/// Runs `attempt` until it yields a range, a non-transient error, the retry
/// budget runs out, or `deadline` passes.
pub(crate) fn with_retries<F>(
    config: &SequenceConfig,
    policy: &RetryPolicy,
    deadline: Option<Instant>,
    mut attempt: F,
) -> Result<SequenceRange>
where
    F: FnMut() -> Result<SequenceRange>,
{
    for _round in 0..=policy.retry_times {
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Err(Error::Timeout {
                name: config.name().to_owned(),
            });
        }

        match attempt() {
            Ok(range) => return Ok(range),
            Err(Error::LostRace { .. }) => {
                #[cfg(feature = "tracing")]
                tracing::trace!(sequence = config.name(), round = _round, "lost race, retrying");
            }
            Err(_e @ Error::StoreUnavailable { .. }) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    sequence = config.name(),
                    round = _round,
                    "range allocation failed, retrying: {_e}"
                );
            }
            Err(e) => return Err(e),
        }
    }

    #[cfg(feature = "tracing")]
    tracing::error!(
        sequence = config.name(),
        retries = policy.retry_times,
        "retried too many times"
    );
    Err(Error::AllocationRetriesExceeded {
        name: config.name().to_owned(),
        retries: policy.retry_times,
    })
}
