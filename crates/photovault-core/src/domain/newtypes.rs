//! Domain newtypes with validation
//!
//! This module provides strongly-typed wrappers for the values that flow
//! between the scanner, the grouper and the ledger. Each newtype ensures
//! data validity at construction time.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Datelike, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;

// ============================================================================
// GroupKey
// ============================================================================

/// Calendar month partition key, rendered as `YYYY-MM`
///
/// Ordering follows the calendar, so a `BTreeMap<GroupKey, _>` iterates
/// oldest month first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GroupKey {
    year: i32,
    month: u32,
}

impl GroupKey {
    /// Creates a GroupKey, validating the year and month ranges
    pub fn new(year: i32, month: u32) -> Result<Self, DomainError> {
        if !(0..=9999).contains(&year) || !(1..=12).contains(&month) {
            return Err(DomainError::InvalidGroupKey(format!("{year:04}-{month:02}")));
        }
        Ok(Self { year, month })
    }

    /// Derives the key from a timestamp in the given time zone
    ///
    /// Grouping is done on the calendar of `tz`, so a photo taken late on the
    /// last day of a month stays in that month for the photographer.
    pub fn from_datetime<Tz: TimeZone>(timestamp: &DateTime<Tz>) -> Self {
        Self {
            year: timestamp.year().clamp(0, 9999),
            month: timestamp.month(),
        }
    }

    /// Returns the year component
    pub fn year(&self) -> i32 {
        self.year
    }

    /// Returns the month component (1-12)
    pub fn month(&self) -> u32 {
        self.month
    }
}

impl Display for GroupKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for GroupKey {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DomainError::InvalidGroupKey(s.to_string());

        let (year, month) = s.split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;

        Self::new(year, month).map_err(|_| invalid())
    }
}

impl TryFrom<String> for GroupKey {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<GroupKey> for String {
    fn from(key: GroupKey) -> Self {
        key.to_string()
    }
}

// ============================================================================
// Watermark
// ============================================================================

/// "Uploaded through this instant" boundary
///
/// The zero watermark admits every timestamp. Otherwise a timestamp is
/// admitted only when it is strictly after the watermark.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Watermark(Option<DateTime<Utc>>);

impl Watermark {
    /// The zero watermark (nothing uploaded yet)
    #[must_use]
    pub const fn zero() -> Self {
        Self(None)
    }

    /// A watermark at a specific instant
    #[must_use]
    pub const fn at(instant: DateTime<Utc>) -> Self {
        Self(Some(instant))
    }

    /// Parses the persisted representation
    ///
    /// Empty or unparsable content is the zero watermark, never an error.
    #[must_use]
    pub fn parse_lenient(content: &str) -> Self {
        DateTime::parse_from_rfc3339(content.trim())
            .map(|dt| Self(Some(dt.with_timezone(&Utc))))
            .unwrap_or_default()
    }

    /// Returns true if nothing has been uploaded yet
    pub fn is_zero(&self) -> bool {
        self.0.is_none()
    }

    /// Returns the instant, if any
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        self.0
    }

    /// Strict-after admission check
    pub fn admits(&self, timestamp: &DateTime<Utc>) -> bool {
        match self.0 {
            None => true,
            Some(mark) => *timestamp > mark,
        }
    }
}

impl Display for Watermark {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.0 {
            None => write!(f, "never"),
            Some(instant) => write!(f, "{}", instant.to_rfc3339_opts(SecondsFormat::Secs, true)),
        }
    }
}
