//! Conversions from loosely-typed configuration input to typed fields.
//!
//! Every conversion reports failure through [`CoercionError`] rather than
//! panicking; callers decide whether a failure is soft (property snapshot,
//! deployment payload) or hard (user-authored options document).

use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use strum::{Display, EnumString};
use thiserror::Error;

/// Errors produced while coercing raw configuration values.
#[derive(Debug, Error)]
pub enum CoercionError {
    /// The raw value was not canonical integer text or a JSON integer.
    #[error("expected an integer, got '{0}'")]
    NotAnInteger(String),
    /// The integer was valid but does not fit the target field.
    #[error("value {value} is out of range for {field}")]
    OutOfRange {
        /// Parsed value that failed the range check.
        value: i64,
        /// Name of the field being populated.
        field: &'static str,
    },
    /// The raw value did not name a known time unit.
    #[error("unknown time unit '{0}'")]
    UnknownTimeUnit(String),
    /// The raw value was not textual where text was required.
    #[error("expected a string, got '{0}'")]
    NotAString(Value),
}

/// Time units accepted for duration-valued option fields.
///
/// Spellings match the unit names used in option documents and property
/// values (`SECONDS`, `MILLISECONDS`, ...); parsing is case-insensitive.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, EnumString, Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum TimeUnit {
    /// Billionths of a second (default unit for execute-time budgets).
    #[default]
    Nanoseconds,
    /// Millionths of a second.
    Microseconds,
    /// Thousandths of a second.
    Milliseconds,
    /// Whole seconds.
    Seconds,
    /// Sixty-second minutes.
    Minutes,
    /// Sixty-minute hours.
    Hours,
    /// Twenty-four-hour days.
    Days,
}

impl TimeUnit {
    /// Converts `amount` of this unit into a [`Duration`].
    #[must_use]
    pub fn to_duration(self, amount: u64) -> Duration {
        match self {
            Self::Nanoseconds => Duration::from_nanos(amount),
            Self::Microseconds => Duration::from_micros(amount),
            Self::Milliseconds => Duration::from_millis(amount),
            Self::Seconds => Duration::from_secs(amount),
            Self::Minutes => Duration::from_secs(amount.saturating_mul(60)),
            Self::Hours => Duration::from_secs(amount.saturating_mul(3_600)),
            Self::Days => Duration::from_secs(amount.saturating_mul(86_400)),
        }
    }

    /// Parses unit text, mapping unknown spellings to [`CoercionError`].
    pub fn parse(raw: &str) -> Result<Self, CoercionError> {
        Self::from_str(raw.trim()).map_err(|_| CoercionError::UnknownTimeUnit(raw.to_owned()))
    }
}

/// Coerces a JSON value into an integer.
///
/// Accepts JSON integers and canonical integer text; everything else is a
/// [`CoercionError`].
pub fn coerce_int(raw: &Value) -> Result<i64, CoercionError> {
    match raw {
        Value::Number(number) => number
            .as_i64()
            .ok_or_else(|| CoercionError::NotAnInteger(number.to_string())),
        Value::String(text) => coerce_int_text(text),
        other => Err(CoercionError::NotAnInteger(other.to_string())),
    }
}

/// Coerces canonical integer text into an integer.
pub fn coerce_int_text(raw: &str) -> Result<i64, CoercionError> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| CoercionError::NotAnInteger(raw.to_owned()))
}

/// Coerces an amount plus unit text into a [`Duration`].
pub fn coerce_duration(raw_value: &Value, raw_unit: &str) -> Result<Duration, CoercionError> {
    let amount = coerce_int(raw_value)?;
    let amount = u64::try_from(amount).map_err(|_| CoercionError::OutOfRange {
        value: amount,
        field: "duration",
    })?;
    Ok(TimeUnit::parse(raw_unit)?.to_duration(amount))
}

/// Coerces boolean text; anything other than `true` (case-insensitive) is
/// `false`. This is deliberately soft: malformed boolean properties are
/// ignored rather than fatal.
#[must_use]
pub fn coerce_boolean(raw: &str) -> bool {
    raw.trim().eq_ignore_ascii_case("true")
}

/// Extracts textual content from a JSON value.
pub(crate) fn coerce_string(raw: &Value) -> Result<&str, CoercionError> {
    raw.as_str()
        .ok_or_else(|| CoercionError::NotAString(raw.clone()))
}
