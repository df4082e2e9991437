//! Release version types.
//!
//! `Version` is a semantic-version-like value (`major.minor.patch`, optional
//! prerelease and build metadata). Short inputs such as `2` or `2.1` are
//! padded with zeros so that every version has a total order.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use thiserror::Error;

/// Release version (major.minor.patch-prerelease+build)
#[derive(Debug, Clone)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub prerelease: Option<String>,
    pub build: Option<String>,
}

/// Partial version used inside constraints (may have missing components)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialVersion {
    pub major: u64,
    pub minor: Option<u64>,
    pub patch: Option<u64>,
    pub prerelease: Option<String>,
}

/// Version and constraint parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("Invalid version format: {input}")]
    InvalidFormat { input: String },

    #[error("Invalid number in version: {component}")]
    InvalidNumber { component: String },

    #[error("Invalid prerelease identifier: {prerelease}")]
    InvalidPrerelease { prerelease: String },

    #[error("Invalid build metadata: {build}")]
    InvalidBuild { build: String },

    #[error("Invalid constraint '{input}': {reason}")]
    InvalidConstraint { input: String, reason: String },
}

impl Version {
    /// Create a new version
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            prerelease: None,
            build: None,
        }
    }

    pub fn with_prerelease(mut self, prerelease: impl Into<String>) -> Self {
        self.prerelease = Some(prerelease.into());
        self
    }

    /// Check if this is a prerelease version
    pub fn is_prerelease(&self) -> bool {
        self.prerelease.is_some()
    }

    /// Precedence comparison (ignores build metadata)
    fn precedence_cmp(&self, other: &Self) -> Ordering {
        match (self.major, self.minor, self.patch).cmp(&(other.major, other.minor, other.patch)) {
            Ordering::Equal => match (&self.prerelease, &other.prerelease) {
                (None, None) => Ordering::Equal,
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some(a), Some(b)) => compare_prerelease(a, b),
            },
            other => other,
        }
    }
}

/// Dot-wise prerelease comparison: numeric identifiers compare by value and
/// sort before alphanumeric ones.
fn compare_prerelease(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
                    (Ok(x), Ok(y)) => x.cmp(&y),
                    (Ok(_), Err(_)) => Ordering::Less,
                    (Err(_), Ok(_)) => Ordering::Greater,
                    (Err(_), Err(_)) => x.cmp(y),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            },
        }
    }
}

fn validate_identifiers(value: &str) -> bool {
    !value.is_empty()
        && value
            .split('.')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'))
}

/// Split `core[-pre][+build]` and the compact `1.0rc1` / `1.0.dev2` forms.
fn split_version(input: &str) -> (&str, Option<&str>, Option<&str>) {
    let (version_part, build) = match input.split_once('+') {
        Some((v, b)) => (v, Some(b)),
        None => (input, None),
    };

    if let Some((core, pre)) = version_part.split_once('-') {
        return (core, Some(pre), build);
    }

    match version_part.find(|c: char| !(c.is_ascii_digit() || c == '.')) {
        Some(idx) if idx > 0 => {
            let core = version_part[..idx].trim_end_matches('.');
            (core, Some(&version_part[idx..]), build)
        },
        _ => (version_part, None, build),
    }
}

fn parse_component(component: &str) -> Result<u64, VersionError> {
    component.parse().map_err(|_| VersionError::InvalidNumber {
        component: component.to_string(),
    })
}

impl PartialVersion {
    /// Parse a version with one to three numeric components
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let input = input.trim();
        let input = input.strip_prefix('v').unwrap_or(input);
        if input.is_empty() {
            return Err(VersionError::InvalidFormat {
                input: input.to_string(),
            });
        }

        let (core, prerelease, _) = split_version(input);
        let parts: Vec<&str> = core.split('.').collect();
        if parts.is_empty() || parts.len() > 3 {
            return Err(VersionError::InvalidFormat {
                input: input.to_string(),
            });
        }

        let major = parse_component(parts[0])?;
        let minor = parts.get(1).map(|p| parse_component(p)).transpose()?;
        let patch = parts.get(2).map(|p| parse_component(p)).transpose()?;

        if let Some(pre) = prerelease {
            if !validate_identifiers(pre) {
                return Err(VersionError::InvalidPrerelease {
                    prerelease: pre.to_string(),
                });
            }
        }

        Ok(Self {
            major,
            minor,
            patch,
            prerelease: prerelease.map(str::to_string),
        })
    }

    /// Convert to a full version (filling missing parts with 0)
    pub fn to_version(&self) -> Version {
        Version {
            major: self.major,
            minor: self.minor.unwrap_or(0),
            patch: self.patch.unwrap_or(0),
            prerelease: self.prerelease.clone(),
            build: None,
        }
    }

    /// Upper bound for a caret requirement (`^1.2.3` is `<2.0.0`)
    pub fn caret_upper(&self) -> Version {
        match (self.major, self.minor, self.patch) {
            (major, _, _) if major > 0 => Version::new(major + 1, 0, 0),
            (_, None, _) => Version::new(1, 0, 0),
            (_, Some(minor), _) if minor > 0 => Version::new(0, minor + 1, 0),
            (_, Some(minor), None) => Version::new(0, minor + 1, 0),
            (_, Some(_), Some(patch)) => Version::new(0, 0, patch + 1),
        }
    }

    /// Upper bound for a tilde requirement (`~1.2.3` is `<1.3.0`)
    pub fn tilde_upper(&self) -> Version {
        match self.minor {
            Some(minor) => Version::new(self.major, minor + 1, 0),
            None => Version::new(self.major + 1, 0, 0),
        }
    }

    /// Upper bound for a compatible-release requirement (`~=1.2` is `<2.0.0`)
    pub fn compatible_upper(&self) -> Option<Version> {
        match (self.minor, self.patch) {
            (None, _) => None,
            (Some(_), None) => Some(Version::new(self.major + 1, 0, 0)),
            (Some(minor), Some(_)) => Some(Version::new(self.major, minor + 1, 0)),
        }
    }

    /// Bounds of a wildcard requirement (`1.2.*` is `>=1.2.0,<1.3.0`)
    pub fn wildcard_bounds(&self) -> (Version, Version) {
        let lower = Version::new(self.major, self.minor.unwrap_or(0), 0);
        let upper = match self.minor {
            Some(minor) => Version::new(self.major, minor + 1, 0),
            None => Version::new(self.major + 1, 0, 0),
        };
        (lower, upper)
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        let partial = PartialVersion::parse(input)?;

        let (_, _, build) = split_version(input.strip_prefix('v').unwrap_or(input));
        if let Some(build) = build {
            if !validate_identifiers(build) {
                return Err(VersionError::InvalidBuild {
                    build: build.to_string(),
                });
            }
        }

        let mut version = partial.to_version();
        version.build = build.map(str::to_string);
        Ok(version)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;

        if let Some(ref pre) = self.prerelease {
            write!(f, "-{}", pre)?;
        }

        if let Some(ref build) = self.build {
            write!(f, "+{}", build)?;
        }

        Ok(())
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.precedence_cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.major.hash(state);
        self.minor.hash(state);
        self.patch.hash(state);
        self.prerelease.hash(state);
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.precedence_cmp(other)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parsing() {
        let v = Version::from_str("1.2.3").unwrap();
        assert_eq!(v.major, 1);
        assert_eq!(v.minor, 2);
        assert_eq!(v.patch, 3);
        assert_eq!(v.prerelease, None);
        assert_eq!(v.build, None);
    }

    #[test]
    fn test_short_versions_are_padded() {
        assert_eq!(Version::from_str("2.1").unwrap(), Version::new(2, 1, 0));
        assert_eq!(Version::from_str("3").unwrap(), Version::new(3, 0, 0));
        assert_eq!(Version::from_str("v1.4").unwrap(), Version::new(1, 4, 0));
    }

    #[test]
    fn test_version_with_prerelease() {
        let v = Version::from_str("1.2.3-alpha.1").unwrap();
        assert_eq!(v.prerelease, Some("alpha.1".to_string()));
        assert!(v.is_prerelease());

        let compact = Version::from_str("2.0rc1").unwrap();
        assert_eq!(compact, Version::new(2, 0, 0).with_prerelease("rc1"));
    }

    #[test]
    fn test_version_with_build() {
        let v = Version::from_str("1.2.3+build.1").unwrap();
        assert_eq!(v.build, Some("build.1".to_string()));
        assert_eq!(v, Version::new(1, 2, 3));
    }

    #[test]
    fn test_version_display() {
        let v = Version::new(1, 2, 3);
        assert_eq!(v.to_string(), "1.2.3");

        let v = Version {
            major: 1,
            minor: 2,
            patch: 3,
            prerelease: Some("alpha".to_string()),
            build: Some("build".to_string()),
        };
        assert_eq!(v.to_string(), "1.2.3-alpha+build");
    }

    #[test]
    fn test_version_comparison() {
        let v1 = Version::new(1, 0, 0);
        let v2 = Version::new(2, 0, 0);
        let v3 = Version::new(1, 1, 0);

        assert!(v1 < v2);
        assert!(v1 < v3);
        assert!(v3 < v2);
    }

    #[test]
    fn test_prerelease_ordering() {
        let alpha = Version::from_str("1.0.0-alpha").unwrap();
        let alpha_2 = Version::from_str("1.0.0-alpha.2").unwrap();
        let alpha_10 = Version::from_str("1.0.0-alpha.10").unwrap();
        let beta = Version::from_str("1.0.0-beta").unwrap();
        let release = Version::new(1, 0, 0);

        assert!(alpha < alpha_2);
        assert!(alpha_2 < alpha_10);
        assert!(alpha_10 < beta);
        assert!(beta < release);
    }

    #[test]
    fn test_invalid_versions() {
        assert!(Version::from_str("").is_err());
        assert!(Version::from_str("1.2.3.4").is_err());
        assert!(Version::from_str("a.b").is_err());
        assert!(Version::from_str("1.0.0-").is_err());
    }

    #[test]
    fn test_caret_and_tilde_bounds() {
        let p = |s: &str| PartialVersion::parse(s).unwrap();
        assert_eq!(p("1.2.3").caret_upper(), Version::new(2, 0, 0));
        assert_eq!(p("0.2.3").caret_upper(), Version::new(0, 3, 0));
        assert_eq!(p("0.0.3").caret_upper(), Version::new(0, 0, 4));
        assert_eq!(p("0.0").caret_upper(), Version::new(0, 1, 0));
        assert_eq!(p("0").caret_upper(), Version::new(1, 0, 0));

        assert_eq!(p("1.2.3").tilde_upper(), Version::new(1, 3, 0));
        assert_eq!(p("1").tilde_upper(), Version::new(2, 0, 0));

        assert_eq!(p("1.2").compatible_upper(), Some(Version::new(2, 0, 0)));
        assert_eq!(p("1.2.3").compatible_upper(), Some(Version::new(1, 3, 0)));
        assert_eq!(p("1").compatible_upper(), None);
    }

    #[test]
    fn test_serde_as_string() {
        let v = Version::new(1, 5, 0);
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, "\"1.5.0\"");
        let back: Version = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }
}
