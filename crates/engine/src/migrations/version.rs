use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Migration version: the integer prefix of a script's filename, usually a
/// `YYYYMMDDHHMMSS` timestamp. Versions order migrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Wrap a raw version number
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// The raw version number, as stored in the ledger
    pub const fn get(self) -> i64 {
        self.0
    }

    /// The version immediately after this one
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }

    /// Render with at least `width` digits, zero-padded
    pub fn padded(self, width: usize) -> String {
        format!("{:0width$}", self.0, width = width)
    }
}

impl From<i64> for Version {
    fn from(raw: i64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error returned when a string is not a valid version
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is not a migration version (expected a non-negative integer)")]
pub struct ParseVersionError(String);

impl FromStr for Version {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseVersionError(s.to_string()));
        }
        s.parse::<i64>()
            .map(Self)
            .map_err(|_| ParseVersionError(s.to_string()))
    }
}
