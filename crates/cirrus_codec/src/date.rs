//! Millisecond-precision instants with an explicit UTC offset.

use crate::error::{CodecError, CodecResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use time::{Duration, OffsetDateTime, UtcOffset};

// `yyyy-MM-dd HH:mm:ss.SSS ±HH:MM`
macro_rules! wire_format {
    () => {
        time::macros::format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3] [offset_hour sign:mandatory]:[offset_minute]"
        )
    };
}

/// An instant with millisecond precision and the offset it is rendered in.
///
/// Equality and ordering compare instants; two dates in different offsets
/// describing the same moment are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CloudDate(OffsetDateTime);

impl CloudDate {
    /// Wraps a date-time, dropping sub-millisecond precision.
    pub fn from_offset_date_time(dt: OffsetDateTime) -> Self {
        let excess = i64::from(dt.nanosecond() % 1_000_000);
        Self(dt - Duration::nanoseconds(excess))
    }

    /// Current time in UTC.
    pub fn now() -> Self {
        Self::from_offset_date_time(OffsetDateTime::now_utc())
    }

    /// Creates a UTC date from milliseconds since the Unix epoch.
    pub fn from_millis(millis: i64) -> CodecResult<Self> {
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
            .map(Self)
            .map_err(|_| CodecError::DateOutOfRange { millis })
    }

    /// Milliseconds since the Unix epoch.
    pub fn to_millis(&self) -> i64 {
        (self.0.unix_timestamp_nanos() / 1_000_000) as i64
    }

    /// Parses the fixed wire format `yyyy-MM-dd HH:mm:ss.SSS ±HH:MM`.
    pub fn parse(input: &str) -> CodecResult<Self> {
        OffsetDateTime::parse(input, wire_format!())
            .map(Self)
            .map_err(|e| CodecError::InvalidDate {
                input: input.to_string(),
                message: e.to_string(),
            })
    }

    /// The same instant rendered in another offset.
    pub fn with_offset(self, offset: UtcOffset) -> Self {
        Self(self.0.to_offset(offset))
    }

    /// Offset from UTC in whole minutes.
    pub fn offset_minutes(&self) -> i16 {
        self.0.offset().whole_minutes()
    }

    /// Returns the underlying date-time.
    pub fn as_offset_date_time(&self) -> OffsetDateTime {
        self.0
    }
}

impl From<OffsetDateTime> for CloudDate {
    fn from(dt: OffsetDateTime) -> Self {
        Self::from_offset_date_time(dt)
    }
}

impl fmt::Display for CloudDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self.0.format(wire_format!()).map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

impl Serialize for CloudDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CloudDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        CloudDate::parse(&text).map_err(serde::de::Error::custom)
    }
}
