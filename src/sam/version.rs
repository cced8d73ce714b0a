//! Supported SAM CLI version range.

use std::cmp::Ordering;
use std::fmt;

/// Result of checking a SAM CLI version against the supported range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamCliVersionValidation {
    Valid,
    VersionTooLow,
    VersionTooHigh,
    VersionNotParseable,
}

impl fmt::Display for SamCliVersionValidation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SamCliVersionValidation::Valid => "supported",
            SamCliVersionValidation::VersionTooLow => "older than the minimum supported version",
            SamCliVersionValidation::VersionTooHigh => "newer than the maximum supported version",
            SamCliVersionValidation::VersionNotParseable => "not a recognizable version",
        };
        f.write_str(text)
    }
}

/// One dot-separated pre-release identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum PreRelease {
    // declared first: numeric identifiers sort below alphanumeric ones
    Numeric(u64),
    Alphanumeric(String),
}

/// A `major.minor.patch[-pre][+build]` SAM CLI version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamCliVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub pre: Vec<PreRelease>,
    pub raw: String,
}

/// Numeric identifier: digits only, no leading zero unless it is `0`
fn numeric_identifier(part: &str) -> Option<u64> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if part.len() > 1 && part.starts_with('0') {
        return None;
    }
    part.parse().ok()
}

fn is_identifier(part: &str) -> bool {
    !part.is_empty() && part.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
}

fn pre_release_identifier(part: &str) -> Option<PreRelease> {
    if !is_identifier(part) {
        return None;
    }
    if part.bytes().all(|b| b.is_ascii_digit()) {
        return numeric_identifier(part).map(PreRelease::Numeric);
    }
    Some(PreRelease::Alphanumeric(part.to_string()))
}

impl SamCliVersion {
    pub const MINIMUM_INCLUSIVE: &'static str = "0.7.0";
    pub const MAXIMUM_EXCLUSIVE: &'static str = "0.16.0";

    /// Parse a semantic version like "0.10.0", "v0.10.0" or "0.10.0-beta.1".
    ///
    /// Build metadata after `+` is checked but plays no part in ordering.
    pub fn parse(version: &str) -> Option<Self> {
        let trimmed = version.trim();
        let unprefixed = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('='))
            .unwrap_or(trimmed);

        let (rest, build) = match unprefixed.split_once('+') {
            Some((rest, build)) => (rest, Some(build)),
            None => (unprefixed, None),
        };
        if let Some(build) = build {
            if !build.split('.').all(is_identifier) {
                return None;
            }
        }

        let (numeric, pre) = match rest.split_once('-') {
            Some((numeric, pre)) => (numeric, Some(pre)),
            None => (rest, None),
        };
        let pre = match pre {
            Some(pre) => pre
                .split('.')
                .map(pre_release_identifier)
                .collect::<Option<Vec<_>>>()?,
            None => Vec::new(),
        };

        let mut parts = numeric.split('.');
        let major = numeric_identifier(parts.next()?)?;
        let minor = numeric_identifier(parts.next()?)?;
        let patch = numeric_identifier(parts.next()?)?;
        if parts.next().is_some() {
            return None;
        }

        Some(Self {
            major,
            minor,
            patch,
            pre,
            raw: trimmed.to_string(),
        })
    }

    /// Semantic version precedence; a pre-release sorts below its release
    fn precedence(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (self.pre.is_empty(), other.pre.is_empty()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => self.pre.cmp(&other.pre),
            })
    }

    /// Check `version` against [`Self::MINIMUM_INCLUSIVE`] and [`Self::MAXIMUM_EXCLUSIVE`]
    pub fn validate(version: Option<&str>) -> SamCliVersionValidation {
        let Some(version) = version.and_then(Self::parse) else {
            return SamCliVersionValidation::VersionNotParseable;
        };

        let minimum = Self::parse(Self::MINIMUM_INCLUSIVE);
        let maximum = Self::parse(Self::MAXIMUM_EXCLUSIVE);

        if minimum.is_some_and(|min| version.precedence(&min) == Ordering::Less) {
            return SamCliVersionValidation::VersionTooLow;
        }
        if maximum.is_some_and(|max| version.precedence(&max) != Ordering::Less) {
            return SamCliVersionValidation::VersionTooHigh;
        }
        SamCliVersionValidation::Valid
    }
}
