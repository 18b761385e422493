use crate::SequenceConfig;
use std::sync::Arc;

/// Failure reported by a backing store.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    /// The store could not be reached or refused the operation (connection
    /// loss, timeout, read-only replica, ...).
    #[error("store unavailable: {reason}")]
    Unavailable { reason: String },

    /// A row exists but cannot be interpreted.
    #[error("malformed row `{name}`: {reason}")]
    Malformed { name: String, reason: String },
}

impl StoreError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn malformed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// One persisted sequence row: `name`, `value`, `min_value`, `max_value`,
/// `step`.
///
/// `value` is the first identifier not yet claimed through the store holding
/// the row.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SequenceRow {
    pub name: String,
    pub value: i64,
    pub min_value: i64,
    pub max_value: i64,
    pub step: i64,
}

impl SequenceRow {
    /// Builds the row to insert for `config` with the given starting value.
    pub fn for_config(config: &SequenceConfig, value: i64) -> Self {
        Self {
            name: config.name().to_owned(),
            value,
            min_value: config.min_value(),
            max_value: config.max_value(),
            step: config.step(),
        }
    }

    /// The static configuration stored alongside the value. The name is kept
    /// byte for byte: the store keys rows on it exactly.
    pub fn config(&self) -> SequenceConfig {
        SequenceConfig::from_components(
            &self.name,
            self.min_value,
            self.max_value,
            self.step,
        )
    }
}

/// The contract a durable backing store offers to the allocators.
///
/// Implementations wrap a table (or an equivalent keyed collection) holding
/// one [`SequenceRow`] per sequence name. The only mutation of an existing row
/// is [`Self::compare_and_swap_value`]; rows are never blindly overwritten.
pub trait SequenceStore: Send + Sync {
    /// Reads the current `value` for `name`, `None` if there is no row.
    fn read_value(&self, name: &str) -> Result<Option<i64>, StoreError>;

    /// Creates `row` unless a row with the same name exists. Returns whether
    /// this call inserted it. Must be idempotent.
    fn insert_if_absent(&self, row: &SequenceRow) -> Result<bool, StoreError>;

    /// Sets `value = new` only if it currently equals `expected`. Returns the
    /// number of rows affected: `1` on success, `0` if the row moved or does
    /// not exist.
    fn compare_and_swap_value(&self, name: &str, expected: i64, new: i64)
    -> Result<u64, StoreError>;

    /// Returns every row in the store.
    fn list_rows(&self) -> Result<Vec<SequenceRow>, StoreError>;

    /// Returns the row for `name`, if any.
    fn find_row(&self, name: &str) -> Result<Option<SequenceRow>, StoreError>;
}

impl<S> SequenceStore for Arc<S>
where
    S: SequenceStore + ?Sized,
{
    fn read_value(&self, name: &str) -> Result<Option<i64>, StoreError> {
        (**self).read_value(name)
    }

    fn insert_if_absent(&self, row: &SequenceRow) -> Result<bool, StoreError> {
        (**self).insert_if_absent(row)
    }

    fn compare_and_swap_value(
        &self,
        name: &str,
        expected: i64,
        new: i64,
    ) -> Result<u64, StoreError> {
        (**self).compare_and_swap_value(name, expected, new)
    }

    fn list_rows(&self) -> Result<Vec<SequenceRow>, StoreError> {
        (**self).list_rows()
    }

    fn find_row(&self, name: &str) -> Result<Option<SequenceRow>, StoreError> {
        (**self).find_row(name)
    }
}
