//! Version names.
//!
//! A version is named after its creation time in UTC, formatted as
//! `YYYYMMDDhhmmss`. Names sort lexicographically in creation order and are
//! unique within a container.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Duration, OffsetDateTime, PrimitiveDateTime};

const VERSION_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year][month][day][hour][minute][second]");

/// Length of a version name in characters.
pub const VERSION_NAME_LEN: usize = 14;

/// A validated version name.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionName(String);

impl VersionName {
    /// Build the name for a version created at `at`.
    pub fn from_time(at: OffsetDateTime) -> Result<Self> {
        let utc = at.to_offset(time::UtcOffset::UTC);
        let name = utc
            .format(VERSION_FORMAT)
            .map_err(|e| Error::InvalidVersionName(e.to_string()))?;
        Self::parse(&name)
    }

    /// Parse and validate a version name.
    pub fn parse(s: &str) -> Result<Self> {
        if s.len() != VERSION_NAME_LEN || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidVersionName(s.to_string()));
        }
        PrimitiveDateTime::parse(s, VERSION_FORMAT)
            .map_err(|_| Error::InvalidVersionName(s.to_string()))?;
        Ok(Self(s.to_string()))
    }

    /// Timestamp encoded in the name.
    pub fn timestamp(&self) -> OffsetDateTime {
        // Validated on construction.
        PrimitiveDateTime::parse(&self.0, VERSION_FORMAT)
            .map(PrimitiveDateTime::assume_utc)
            .unwrap_or(OffsetDateTime::UNIX_EPOCH)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for VersionName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for VersionName {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<VersionName> for String {
    fn from(name: VersionName) -> Self {
        name.0
    }
}

/// Compute the name for a new version in a container whose greatest existing
/// version name is `latest`.
///
/// Uses `now` unless that would not sort after `latest`, in which case the
/// name is `latest` plus one second.
pub fn next_version_name(now: OffsetDateTime, latest: Option<&str>) -> Result<VersionName> {
    let candidate = VersionName::from_time(now)?;
    let Some(latest) = latest else {
        return Ok(candidate);
    };

    let latest = VersionName::parse(latest)?;
    if candidate > latest {
        return Ok(candidate);
    }

    let bumped = latest
        .timestamp()
        .checked_add(Duration::seconds(1))
        .ok_or_else(|| Error::VersionNameOverflow(latest.to_string()))?;
    VersionName::from_time(bumped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_name_from_time() {
        let name = VersionName::from_time(datetime!(2024-03-05 07:08:09 UTC)).unwrap();
        assert_eq!(name.as_str(), "20240305070809");
    }

    #[test]
    fn test_name_normalizes_offset_to_utc() {
        let name = VersionName::from_time(datetime!(2024-03-05 09:08:09 +02:00)).unwrap();
        assert_eq!(name.as_str(), "20240305070809");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(VersionName::parse("2024030507080").is_err());
        assert!(VersionName::parse("2024030507080x").is_err());
        assert!(VersionName::parse("20241305070809").is_err());
        assert!(VersionName::parse("20240305070809").is_ok());
    }

    #[test]
    fn test_next_name_uses_clock_when_ahead() {
        let next =
            next_version_name(datetime!(2024-03-05 07:08:10 UTC), Some("20240305070809")).unwrap();
        assert_eq!(next.as_str(), "20240305070810");
    }

    #[test]
    fn test_next_name_bumps_when_clock_is_not_ahead() {
        let now = datetime!(2024-03-05 07:08:09 UTC);
        let next = next_version_name(now, Some("20240305070809")).unwrap();
        assert_eq!(next.as_str(), "20240305070810");

        let next = next_version_name(now, Some("20240305235959")).unwrap();
        assert_eq!(next.as_str(), "20240306000000");
    }

    #[test]
    fn test_names_strictly_increase() {
        let now = datetime!(2024-12-31 23:59:59 UTC);
        let mut latest: Option<String> = None;
        for _ in 0..5 {
            let next = next_version_name(now, latest.as_deref()).unwrap();
            if let Some(prev) = &latest {
                assert!(next.as_str() > prev.as_str());
            }
            latest = Some(next.to_string());
        }
        assert_eq!(latest.as_deref(), Some("20250101000003"));
    }

    #[test]
    fn test_serde_validates() {
        let ok: VersionName = serde_json::from_str("\"20240305070809\"").unwrap();
        assert_eq!(ok.to_string(), "20240305070809");
        assert!(serde_json::from_str::<VersionName>("\"latest\"").is_err());
    }
}
