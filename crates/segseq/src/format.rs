use chrono::{Local, NaiveDate};
use core::fmt::Write;

/// Renders sequence values as business identifiers:
/// `[yyyyMMdd][type code][value]`.
///
/// With `zero_pad` set, the value is left-padded with zeros to the number of
/// digits of the sequence's `max_value`, so every identifier of one sequence
/// has the same length.
///
/// # Example
/// ```
/// use chrono::NaiveDate;
/// use segseq::IdFormat;
///
/// let format = IdFormat::new().with_type_code("0101").with_zero_pad(true);
/// let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
/// assert_eq!(format.render(42, 99_999, date), "20240309010100042");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct IdFormat {
    date_prefix: bool,
    type_code: Option<String>,
    zero_pad: bool,
}

impl Default for IdFormat {
    fn default() -> Self {
        Self {
            date_prefix: true,
            type_code: None,
            zero_pad: false,
        }
    }
}

impl IdFormat {
    /// Date prefix, no type code, no padding.
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_date_prefix(mut self, date_prefix: bool) -> Self {
        self.date_prefix = date_prefix;
        self
    }

    #[must_use]
    pub fn with_type_code(mut self, type_code: impl Into<String>) -> Self {
        self.type_code = Some(type_code.into());
        self
    }

    #[must_use]
    pub fn with_zero_pad(mut self, zero_pad: bool) -> Self {
        self.zero_pad = zero_pad;
        self
    }

    pub const fn date_prefix(&self) -> bool {
        self.date_prefix
    }

    pub fn type_code(&self) -> Option<&str> {
        self.type_code.as_deref()
    }

    pub const fn zero_pad(&self) -> bool {
        self.zero_pad
    }

    /// Renders `value` of a sequence bounded by `max_value` for `date`.
    pub fn render(&self, value: i64, max_value: i64, date: NaiveDate) -> String {
        let mut id = String::with_capacity(32);
        if self.date_prefix {
            // Writing into a String cannot fail.
            let _ = write!(id, "{}", date.format("%Y%m%d"));
        }
        if let Some(code) = &self.type_code {
            id.push_str(code);
        }
        if self.zero_pad {
            let _ = write!(id, "{value:0width$}", width = digits(max_value));
        } else {
            let _ = write!(id, "{value}");
        }
        id
    }

    /// Renders `value` with today's local date.
    pub fn render_today(&self, value: i64, max_value: i64) -> String {
        self.render(value, max_value, Local::now().date_naive())
    }
}

fn digits(value: i64) -> usize {
    value
        .unsigned_abs()
        .checked_ilog10()
        .map_or(1, |log| log as usize + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 11, 5).unwrap()
    }

    #[test]
    fn default_is_date_and_value() {
        assert_eq!(IdFormat::new().render(7, 999, date()), "202311057");
    }

    #[test]
    fn pads_to_max_value_width() {
        let format = IdFormat::new().with_zero_pad(true);
        assert_eq!(format.render(7, 999, date()), "20231105007");
        assert_eq!(format.render(123, 999, date()), "20231105123");
        assert_eq!(
            format.render(1, i64::MAX, date()).len(),
            8 + i64::MAX.to_string().len()
        );
    }

    #[test]
    fn value_wider_than_max_is_not_truncated() {
        let format = IdFormat::new().with_date_prefix(false).with_zero_pad(true);
        assert_eq!(format.render(12_345, 99, date()), "12345");
    }

    #[test]
    fn type_code_sits_between_date_and_value() {
        let format = IdFormat::new().with_type_code("PAY1");
        assert_eq!(format.render(5, 100, date()), "20231105PAY15");
        let format = format.with_date_prefix(false);
        assert_eq!(format.render(5, 100, date()), "PAY15");
        assert_eq!(format.type_code(), Some("PAY1"));
    }

    #[test]
    fn digit_counts() {
        assert_eq!(digits(0), 1);
        assert_eq!(digits(9), 1);
        assert_eq!(digits(10), 2);
        assert_eq!(digits(99_999), 5);
        assert_eq!(digits(i64::MAX), 19);
    }

    #[test]
    fn today_uses_the_local_date() {
        let id = IdFormat::new().render_today(1, 9);
        let date = NaiveDate::parse_from_str(&id[..8], "%Y%m%d").unwrap();
        assert!((Local::now().date_naive() - date).num_days().abs() <= 1);
        assert_eq!(&id[8..], "1");
    }
}
