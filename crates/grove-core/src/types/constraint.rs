//! Version constraints.
//!
//! A `Constraint` pairs the `VersionSet` a requirement admits with an
//! optional environment marker. It keeps the text it was parsed from so
//! manifests, lock files and reports show what the user wrote.
//!
//! Grammar: clauses separated by `,` (or whitespace) are intersected,
//! alternatives separated by `||` are united. Supported clauses are `*`,
//! `1.2.3`, `==1.2`, `=1.2`, `!=1.2`, `>1`, `>=1`, `<1`, `<=1`, `^1.2`,
//! `~1.2`, `~=1.2` and wildcards like `1.2.*`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use super::marker::Marker;
use super::version::{PartialVersion, Version, VersionError};
use super::version_set::VersionSet;

#[derive(Debug, Clone)]
pub struct Constraint {
    text: String,
    versions: VersionSet,
    marker: Option<Marker>,
    mentions_prerelease: bool,
}

impl Constraint {
    /// Parse a constraint string
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let text = input.trim();
        if text.is_empty() {
            return Err(invalid(input, "empty constraint"));
        }

        let mut versions = VersionSet::empty();
        let mut mentions_prerelease = false;
        let mut alternatives = 0;

        for alternative in text.split('|').map(str::trim).filter(|a| !a.is_empty()) {
            alternatives += 1;
            let mut clause_set = VersionSet::full();
            for clause in split_clauses(alternative) {
                let (set, prerelease) = parse_clause(&clause, input)?;
                mentions_prerelease |= prerelease;
                clause_set = clause_set.intersection(&set);
            }
            versions = versions.union(&clause_set);
        }

        if alternatives == 0 {
            return Err(invalid(input, "no alternatives"));
        }

        Ok(Self {
            text: text.to_string(),
            versions,
            marker: None,
            mentions_prerelease,
        })
    }

    /// Constraint admitting every version
    pub fn any() -> Self {
        Self {
            text: "*".to_string(),
            versions: VersionSet::full(),
            marker: None,
            mentions_prerelease: false,
        }
    }

    /// Constraint admitting exactly one version
    pub fn exact(version: &Version) -> Self {
        Self {
            text: format!("=={}", version),
            versions: VersionSet::singleton(version.clone()),
            marker: None,
            mentions_prerelease: version.is_prerelease(),
        }
    }

    pub fn with_marker(mut self, marker: Marker) -> Self {
        self.marker = Some(marker);
        self
    }

    pub fn with_optional_marker(mut self, marker: Option<Marker>) -> Self {
        self.marker = marker;
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn versions(&self) -> &VersionSet {
        &self.versions
    }

    pub fn marker(&self) -> Option<&Marker> {
        self.marker.as_ref()
    }

    pub fn matches(&self, version: &Version) -> bool {
        self.versions.contains(version)
    }

    /// A constraint naming a prerelease opts into prerelease candidates
    pub fn allows_prereleases(&self) -> bool {
        self.mentions_prerelease
    }

    /// Both constraints must hold
    pub fn and(&self, other: &Constraint) -> Constraint {
        let marker = match (self.marker.clone(), other.marker.clone()) {
            (Some(a), Some(b)) => Some(a.and(b)),
            (a, b) => a.or(b),
        };
        let versions = self.versions.intersection(&other.versions);
        // `,` binds tighter than `||`, so joined alternatives would regroup
        let text = if self.text.contains('|') || other.text.contains('|') {
            versions.to_string()
        } else {
            format!("{}, {}", self.text, other.text)
        };
        Constraint {
            text,
            versions,
            marker,
            mentions_prerelease: self.mentions_prerelease || other.mentions_prerelease,
        }
    }

    /// Either constraint may hold
    pub fn or(&self, other: &Constraint) -> Constraint {
        // an unconditional side makes the union unconditional
        let marker = match (self.marker.clone(), other.marker.clone()) {
            (Some(a), Some(b)) => Some(a.or(b)),
            _ => None,
        };
        Constraint {
            text: format!("{} || {}", self.text, other.text),
            versions: self.versions.union(&other.versions),
            marker,
            mentions_prerelease: self.mentions_prerelease || other.mentions_prerelease,
        }
    }
}

fn invalid(input: &str, reason: &str) -> VersionError {
    VersionError::InvalidConstraint {
        input: input.to_string(),
        reason: reason.to_string(),
    }
}

/// Split one alternative into clauses, gluing a bare operator to the
/// version that follows it (`>= 1.0` is one clause).
fn split_clauses(alternative: &str) -> Vec<String> {
    let mut clauses = Vec::new();
    for piece in alternative.split(',') {
        let mut pending: Option<String> = None;
        for token in piece.split_whitespace() {
            if let Some(op) = pending.take() {
                clauses.push(format!("{}{}", op, token));
                continue;
            }
            if token.chars().all(|c| matches!(c, '<' | '>' | '=' | '!' | '~' | '^')) {
                pending = Some(token.to_string());
            } else {
                clauses.push(token.to_string());
            }
        }
        if let Some(op) = pending {
            clauses.push(op);
        }
    }
    clauses
}

fn parse_clause(clause: &str, input: &str) -> Result<(VersionSet, bool), VersionError> {
    if clause == "*" {
        return Ok((VersionSet::full(), false));
    }

    const OPERATORS: [&str; 10] = ["~=", "==", "!=", ">=", "<=", ">", "<", "=", "^", "~"];
    let (op, rest) = OPERATORS
        .iter()
        .find_map(|op| clause.strip_prefix(op).map(|rest| (*op, rest.trim())))
        .unwrap_or(("", clause));

    if rest.is_empty() {
        return Err(invalid(input, &format!("operator '{}' without a version", op)));
    }

    if rest == "*" || rest.ends_with(".*") {
        let wildcard = match rest.strip_suffix(".*") {
            Some(prefix) => {
                let (lower, upper) = PartialVersion::parse(prefix)?.wildcard_bounds();
                VersionSet::between(lower, upper)
            },
            None => VersionSet::full(),
        };
        return match op {
            "" | "==" | "=" => Ok((wildcard, false)),
            "!=" => Ok((wildcard.complement(), false)),
            _ => Err(invalid(input, &format!("wildcard not allowed with '{}'", op))),
        };
    }

    let partial = PartialVersion::parse(rest)?;
    let prerelease = partial.prerelease.is_some();
    let version = partial.to_version();

    let set = match op {
        "" | "==" | "=" => VersionSet::singleton(version),
        "!=" => VersionSet::singleton(version).complement(),
        ">" => VersionSet::strictly_higher_than(version),
        ">=" => VersionSet::higher_than(version),
        "<" => VersionSet::strictly_lower_than(version),
        "<=" => VersionSet::lower_than(version),
        "^" => VersionSet::between(version, partial.caret_upper()),
        "~" => VersionSet::between(version, partial.tilde_upper()),
        "~=" => match partial.compatible_upper() {
            Some(upper) => VersionSet::between(version, upper),
            None => return Err(invalid(input, "'~=' needs at least two version components")),
        },
        _ => return Err(invalid(input, &format!("unknown operator '{}'", op))),
    };

    Ok((set, prerelease))
}

impl PartialEq for Constraint {
    fn eq(&self, other: &Self) -> bool {
        self.versions == other.versions && self.marker == other.marker
    }
}

impl Eq for Constraint {}

impl FromStr for Constraint {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Constraint::parse(s)
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl Serialize for Constraint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}

impl<'de> Deserialize<'de> for Constraint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
