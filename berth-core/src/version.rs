//! Semantic version comparison and minimum-version gating
//!
//! Versions compare numerically over `(major, minor, patch)`, so `10.0.0`
//! sorts after `9.0.0` and `1.10.0` after `1.2.0`. Pre-release and build
//! suffixes are accepted but do not take part in the comparison.

use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::{BerthError, Result};

/// A parsed `(major, minor, patch)` triple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse a version string
    ///
    /// Accepts full semver (`1.2.3`, `1.2.3-rc.1`), an optional leading `v`,
    /// and short forms (`2`, `2.1`) whose missing components are zero.
    pub fn parse(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        let bare = trimmed.strip_prefix('v').unwrap_or(trimmed);

        if bare.is_empty() {
            return Err(malformed(value, "version is empty"));
        }

        if let Ok(v) = semver::Version::parse(bare) {
            return Ok(Self::new(v.major, v.minor, v.patch));
        }

        let parts: Vec<&str> = bare.split('.').collect();
        if parts.len() > 3 {
            return Err(malformed(value, "expected at most three components"));
        }

        let mut numbers = [0u64; 3];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
                return Err(malformed(
                    value,
                    &format!("component '{part}' is not a number"),
                ));
            }
            *slot = part
                .parse::<u64>()
                .map_err(|e| malformed(value, &e.to_string()))?;
        }

        Ok(Self::new(numbers[0], numbers[1], numbers[2]))
    }

    /// True when `self` is at least `minimum`
    pub fn satisfies(&self, minimum: &Version) -> bool {
        self >= minimum
    }
}

impl FromStr for Version {
    type Err = BerthError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

fn malformed(value: &str, reason: &str) -> BerthError {
    BerthError::MalformedVersion {
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Compare two version strings numerically
pub fn compare(a: &str, b: &str) -> Result<Ordering> {
    Ok(Version::parse(a)?.cmp(&Version::parse(b)?))
}

/// True when `candidate` is the same as or newer than `minimum`
pub fn satisfies_minimum(candidate: &str, minimum: &str) -> Result<bool> {
    Ok(Version::parse(candidate)?.satisfies(&Version::parse(minimum)?))
}
