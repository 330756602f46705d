//! Package version parsing and ordering.
//!
//! Package versions are SemVer-like but looser: one to four numeric
//! components (`1`, `1.0`, `1.0.0`, `1.0.0.1`), an optional prerelease label
//! and optional build metadata. Missing components are treated as zero, so
//! `1.0` and `1.0.0` are the same version.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("version string is empty")]
    Empty,
    #[error("invalid version '{input}': {reason}")]
    Invalid { input: String, reason: String },
}

/// A parsed package version.
///
/// Equality and ordering ignore build metadata and compare prerelease labels
/// case-insensitively. The original string is kept for display and
/// serialization.
#[derive(Debug, Clone)]
pub struct NuGetVersion {
    major: u64,
    minor: u64,
    patch: u64,
    revision: u64,
    pre: semver::Prerelease,
    original: String,
}

impl NuGetVersion {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            revision: 0,
            pre: semver::Prerelease::EMPTY,
            original: format!("{major}.{minor}.{patch}"),
        }
    }

    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(VersionError::Empty);
        }
        let invalid = |reason: &str| VersionError::Invalid {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        // Build metadata never participates in comparison.
        let without_build = match trimmed.split_once('+') {
            Some((head, build)) => {
                semver::BuildMetadata::new(build)
                    .map_err(|e| invalid(&format!("bad build metadata: {e}")))?;
                head
            }
            None => trimmed,
        };

        let (numbers, pre) = match without_build.split_once('-') {
            Some((numbers, label)) => {
                let pre = semver::Prerelease::new(&label.to_ascii_lowercase())
                    .map_err(|e| invalid(&format!("bad prerelease label: {e}")))?;
                if pre.is_empty() {
                    return Err(invalid("empty prerelease label"));
                }
                (numbers, pre)
            }
            None => (without_build, semver::Prerelease::EMPTY),
        };

        let parts: Vec<&str> = numbers.split('.').collect();
        if parts.len() > 4 {
            return Err(invalid("more than four numeric components"));
        }
        let mut components = [0u64; 4];
        for (slot, part) in components.iter_mut().zip(&parts) {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid("numeric components must be non-empty digits"));
            }
            *slot = part
                .parse()
                .map_err(|_| invalid("numeric component out of range"))?;
        }

        Ok(Self {
            major: components[0],
            minor: components[1],
            patch: components[2],
            revision: components[3],
            pre,
            original: trimmed.to_string(),
        })
    }

    pub fn major(&self) -> u64 {
        self.major
    }

    pub fn minor(&self) -> u64 {
        self.minor
    }

    pub fn patch(&self) -> u64 {
        self.patch
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_prerelease(&self) -> bool {
        !self.pre.is_empty()
    }

    /// The string this version was parsed from.
    pub fn original(&self) -> &str {
        &self.original
    }

    /// Canonical form: `major.minor.patch[.revision][-pre]`, lower-cased label.
    pub fn normalized(&self) -> String {
        let mut out = format!("{}.{}.{}", self.major, self.minor, self.patch);
        if self.revision != 0 {
            out.push_str(&format!(".{}", self.revision));
        }
        if !self.pre.is_empty() {
            out.push('-');
            out.push_str(self.pre.as_str());
        }
        out
    }
}

impl Ord for NuGetVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch, self.revision)
            .cmp(&(other.major, other.minor, other.patch, other.revision))
            // semver::Prerelease already orders the empty label above any other
            .then_with(|| self.pre.cmp(&other.pre))
    }
}

impl PartialOrd for NuGetVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for NuGetVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for NuGetVersion {}

impl Hash for NuGetVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.major.hash(state);
        self.minor.hash(state);
        self.patch.hash(state);
        self.revision.hash(state);
        self.pre.as_str().hash(state);
    }
}

impl fmt::Display for NuGetVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

impl FromStr for NuGetVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for NuGetVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.original)
    }
}

impl<'de> Deserialize<'de> for NuGetVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NuGetVersion::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> NuGetVersion {
        NuGetVersion::parse(s).unwrap()
    }

    #[test]
    fn test_missing_components_default_to_zero() {
        assert_eq!(v("1.0"), v("1.0.0"));
        assert_eq!(v("2"), v("2.0.0.0"));
        assert_eq!(v("1.0").normalized(), "1.0.0");
    }

    #[test]
    fn test_revision_component() {
        let version = v("1.2.3.4");
        assert_eq!(version.revision(), 4);
        assert_eq!(version.normalized(), "1.2.3.4");
        assert!(v("1.2.3.4") > v("1.2.3"));
    }

    #[test]
    fn test_release_sorts_above_prerelease() {
        assert!(v("1.0.0") > v("1.0.0-beta"));
        assert!(v("1.0.0-beta") > v("1.0.0-alpha"));
        assert!(v("1.0.0-alpha.2") < v("1.0.0-alpha.10"));
    }

    #[test]
    fn test_prerelease_is_case_insensitive() {
        assert_eq!(v("1.0.0-Beta"), v("1.0.0-beta"));
        assert_eq!(v("1.0.0-Beta").to_string(), "1.0.0-Beta");
        assert_eq!(v("1.0.0-Beta").normalized(), "1.0.0-beta");
    }

    #[test]
    fn test_build_metadata_is_ignored() {
        assert_eq!(v("1.0.0+abc"), v("1.0.0"));
        assert!(!v("1.0.0+abc").is_prerelease());
    }

    #[test]
    fn test_invalid_versions() {
        assert_eq!(NuGetVersion::parse(""), Err(VersionError::Empty));
        assert!(NuGetVersion::parse("1.2.3.4.5").is_err());
        assert!(NuGetVersion::parse("a.b").is_err());
        assert!(NuGetVersion::parse("1..2").is_err());
        assert!(NuGetVersion::parse("1.0.0-").is_err());
    }

    #[test]
    fn test_serde_keeps_original_text() {
        let version: NuGetVersion = serde_json::from_str("\"1.0.0-RC.1\"").unwrap();
        assert_eq!(serde_json::to_string(&version).unwrap(), "\"1.0.0-RC.1\"");
    }
}
