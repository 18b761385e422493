use crate::{Error, Result};

/// Default number of identifiers claimed per allocation.
pub const DEFAULT_STEP: i64 = 1000;

/// Default lower bound of a sequence's numeric space.
pub const DEFAULT_MIN_VALUE: i64 = 0;

/// Default (exclusive) upper bound of a sequence's numeric space.
pub const DEFAULT_MAX_VALUE: i64 = i64::MAX;

/// Default number of retries an allocator performs before giving up.
pub const DEFAULT_RETRY_TIMES: u32 = 150;

/// Static description of one named sequence.
///
/// Identifiers are issued from `[min_value, max_value)` in blocks of `step`.
/// A block is only ever claimed whole: once `value + step` would pass
/// `max_value` the sequence reports [`Error::SpaceExhausted`].
///
/// # Example
/// ```
/// use segseq::SequenceConfig;
///
/// let config = SequenceConfig::new("order").with_step(500).with_max_value(1_000_000);
/// assert!(config.validate().is_ok());
/// assert_eq!(config.min_value(), 0);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SequenceConfig {
    name: String,
    #[cfg_attr(feature = "serde", serde(default = "default_min_value"))]
    min_value: i64,
    #[cfg_attr(feature = "serde", serde(default = "default_max_value"))]
    max_value: i64,
    #[cfg_attr(feature = "serde", serde(default = "default_step"))]
    step: i64,
}

#[cfg(feature = "serde")]
const fn default_min_value() -> i64 {
    DEFAULT_MIN_VALUE
}

#[cfg(feature = "serde")]
const fn default_max_value() -> i64 {
    DEFAULT_MAX_VALUE
}

#[cfg(feature = "serde")]
const fn default_step() -> i64 {
    DEFAULT_STEP
}

impl SequenceConfig {
    /// Creates a config with the default bounds and step.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            min_value: DEFAULT_MIN_VALUE,
            max_value: DEFAULT_MAX_VALUE,
            step: DEFAULT_STEP,
        }
    }

    /// Creates a config from explicit component values.
    pub fn from_components(
        name: impl Into<String>,
        min_value: i64,
        max_value: i64,
        step: i64,
    ) -> Self {
        Self {
            name: name.into(),
            min_value,
            max_value,
            step,
        }
    }

    #[must_use]
    pub fn with_min_value(mut self, min_value: i64) -> Self {
        self.min_value = min_value;
        self
    }

    #[must_use]
    pub fn with_max_value(mut self, max_value: i64) -> Self {
        self.max_value = max_value;
        self
    }

    #[must_use]
    pub fn with_step(mut self, step: i64) -> Self {
        self.step = step;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn min_value(&self) -> i64 {
        self.min_value
    }

    pub const fn max_value(&self) -> i64 {
        self.max_value
    }

    pub const fn step(&self) -> i64 {
        self.step
    }

    /// Checks the invariants `name` non-blank, `0 <= min_value <= max_value`
    /// and `step > 0`.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] naming the first violated invariant.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::configuration("sequence name must not be blank"));
        }
        if self.min_value < 0 {
            return Err(Error::configuration(format!(
                "min value of `{}` is negative ({})",
                self.name, self.min_value
            )));
        }
        if self.max_value < 0 {
            return Err(Error::configuration(format!(
                "max value of `{}` is negative ({})",
                self.name, self.max_value
            )));
        }
        if self.min_value > self.max_value {
            return Err(Error::configuration(format!(
                "min value of `{}` ({}) is greater than its max value ({})",
                self.name, self.min_value, self.max_value
            )));
        }
        if self.step <= 0 {
            return Err(Error::configuration(format!(
                "step of `{}` must be positive ({})",
                self.name, self.step
            )));
        }
        Ok(())
    }
}

/// How hard an allocator tries before giving up on one `next_range` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. `retry_times + 1` attempts in total.
    pub retry_times: u32,
    /// Move a row that is not aligned to its store slot forward instead of
    /// failing. Only meaningful with more than one store.
    pub adjust: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_times: DEFAULT_RETRY_TIMES,
            adjust: true,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub const fn with_retry_times(mut self, retry_times: u32) -> Self {
        self.retry_times = retry_times;
        self
    }

    #[must_use]
    pub const fn with_adjust(mut self, adjust: bool) -> Self {
        self.adjust = adjust;
        self
    }
}
