use crate::store::StoreError;

/// A result type defaulting to the crate's [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All errors that `segseq` can produce.
///
/// [`Error::StoreUnavailable`] and [`Error::LostRace`] are *transient*: the
/// allocators retry them internally and they only reach a caller when they are
/// part of a richer report. Everything else propagates as-is.
#[derive(Clone, Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A sequence was configured with a blank name, negative bounds, an empty
    /// weight table, or similar. The caller must fix the configuration.
    #[error("invalid sequence configuration: {reason}")]
    Configuration { reason: String },

    /// A value was requested before [`Sequence::init`] completed.
    ///
    /// [`Sequence::init`]: crate::Sequence::init
    #[error("sequence `{name}` is not initialized")]
    NotInitialized { name: String },

    /// [`Sequence::init`] was called on a sequence that is already (being)
    /// initialized.
    ///
    /// [`Sequence::init`]: crate::Sequence::init
    #[error("sequence `{name}` is already initialized")]
    AlreadyInitialized { name: String },

    /// The backing store has no row for this name.
    #[error("sequence `{name}` has no persisted row")]
    UnknownSequence { name: String },

    /// The store at index `store` failed to answer. Triggers exclusion of the
    /// store and a retry elsewhere.
    #[error("store #{store} unavailable: {source}")]
    StoreUnavailable {
        store: usize,
        #[source]
        source: StoreError,
    },

    /// Another process moved the row between our read and our conditional
    /// update. Retried without excluding the store.
    #[error("lost the update race for `{name}` on store #{store}")]
    LostRace { name: String, store: usize },

    /// The retry budget ran out before any store granted a range.
    #[error("gave up allocating a range for `{name}` after {retries} retries")]
    AllocationRetriesExceeded { name: String, retries: u32 },

    /// The numeric space of the sequence is used up. No further identifiers
    /// can ever be issued for this name.
    #[error(
        "sequence `{name}` exhausted: value {value} + step {step} exceeds max value {max_value}"
    )]
    SpaceExhausted {
        name: String,
        value: i64,
        step: i64,
        max_value: i64,
    },

    /// The configured deadline passed while waiting for a refill.
    #[error("timed out waiting for a range for `{name}`")]
    Timeout { name: String },
}

impl Error {
    /// Returns `true` for the kinds the allocators retry on their own.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. } | Self::LostRace { .. })
    }

    pub(crate) fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_kinds() {
        let unavailable = Error::StoreUnavailable {
            store: 1,
            source: StoreError::unavailable("connection refused"),
        };
        let lost = Error::LostRace {
            name: "order".into(),
            store: 0,
        };
        let exhausted = Error::SpaceExhausted {
            name: "order".into(),
            value: 10,
            step: 5,
            max_value: 12,
        };

        assert!(unavailable.is_transient());
        assert!(lost.is_transient());
        assert!(!exhausted.is_transient());
        assert!(!Error::configuration("bad").is_transient());
    }

    #[test]
    fn messages_carry_context() {
        let err = Error::StoreUnavailable {
            store: 2,
            source: StoreError::unavailable("connection refused"),
        };
        assert_eq!(
            err.to_string(),
            "store #2 unavailable: store unavailable: connection refused"
        );
        assert!(core::error::Error::source(&err).is_some());
    }
}
