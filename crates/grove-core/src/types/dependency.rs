//! Dependency specification types.
//!
//! `DependencySpec` is the serialized form shared by project manifests and
//! index metadata (`"^2.0"` or a detailed table). `Dependency` is the
//! parsed, normalized form the rest of the system works with.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::constraint::Constraint;
use super::marker::{normalize_extra, Marker, MarkerEnvironment};
use super::package::{PackageId, PackageName, SourceRef};
use crate::error::{GroveError, GroveResult};

/// Dependency on another package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub id: PackageId,
    pub constraint: Constraint,
    /// Extras requested from the target package
    pub extras: BTreeSet<String>,
    pub kind: DependencyKind,
    pub optional: bool,
}

/// Dependency group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    /// Needed at runtime
    Main,
    /// Development-only dependency
    Dev,
}

impl Dependency {
    /// Create a new main dependency on a default-index package
    pub fn new(name: &str, constraint: Constraint) -> Self {
        Self {
            id: PackageId::registry(name),
            constraint,
            extras: BTreeSet::new(),
            kind: DependencyKind::Main,
            optional: false,
        }
    }

    /// Parse the constraint text as well
    pub fn parse(name: &str, constraint: &str) -> GroveResult<Self> {
        Ok(Self::new(name, Constraint::parse(constraint)?))
    }

    pub fn dev(mut self) -> Self {
        self.kind = DependencyKind::Dev;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn with_extra(mut self, extra: &str) -> Self {
        self.extras.insert(normalize_extra(extra));
        self
    }

    pub fn with_marker(mut self, marker: Marker) -> Self {
        self.constraint = self.constraint.with_marker(marker);
        self
    }

    pub fn from_source(mut self, source: SourceRef) -> Self {
        self.id.source = source;
        self
    }

    pub fn name(&self) -> &PackageName {
        &self.id.name
    }

    pub fn marker(&self) -> Option<&Marker> {
        self.constraint.marker()
    }

    /// Whether the dependency applies in `env` with the given active extras
    pub fn applies_to(&self, env: &MarkerEnvironment, extras: &BTreeSet<String>) -> bool {
        self.marker().map_or(true, |m| m.evaluate(env, extras))
    }
}

impl DependencyKind {
    /// Check if this dependency is needed at runtime
    pub fn is_runtime(&self) -> bool {
        matches!(self, DependencyKind::Main)
    }

    /// Check if this dependency is only for development
    pub fn is_dev_only(&self) -> bool {
        matches!(self, DependencyKind::Dev)
    }
}

/// Serialized dependency specification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencySpec {
    /// Version constraint only: `"^2.0"`
    Simple(String),
    /// Detailed table
    Detailed(DetailedDependency),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailedDependency {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markers: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extras: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
    /// Named index from the manifest's `[[source]]` list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
}

impl DependencySpec {
    pub fn is_optional(&self) -> bool {
        matches!(self, DependencySpec::Detailed(d) if d.optional)
    }

    /// Convert to a `Dependency` of the given kind
    pub fn to_dependency(&self, name: &str, kind: DependencyKind) -> GroveResult<Dependency> {
        let detailed = match self {
            DependencySpec::Simple(text) => {
                let mut dependency = Dependency::new(name, Constraint::parse(text)?);
                dependency.kind = kind;
                return Ok(dependency);
            },
            DependencySpec::Detailed(detailed) => detailed,
        };

        let locations = [
            detailed.source.is_some(),
            detailed.path.is_some(),
            detailed.url.is_some(),
            detailed.git.is_some(),
        ]
        .iter()
        .filter(|&&set| set)
        .count();
        if locations > 1 {
            return Err(GroveError::ConfigValidation {
                field: name.to_string(),
                reason: "only one of source, path, url or git may be given".to_string(),
            });
        }
        if detailed.rev.is_some() && detailed.git.is_none() {
            return Err(GroveError::ConfigValidation {
                field: name.to_string(),
                reason: "'rev' requires 'git'".to_string(),
            });
        }

        let constraint = match &detailed.version {
            Some(text) => Constraint::parse(text)?,
            None => Constraint::any(),
        };
        let marker = detailed.markers.as_deref().map(Marker::parse).transpose()?;

        let source = if let Some(index) = &detailed.source {
            SourceRef::Index {
                name: index.clone(),
            }
        } else if let Some(path) = &detailed.path {
            SourceRef::Path { path: path.clone() }
        } else if let Some(url) = &detailed.url {
            SourceRef::Url { url: url.clone() }
        } else if let Some(git) = &detailed.git {
            SourceRef::Git {
                url: git.clone(),
                rev: detailed.rev.clone(),
            }
        } else {
            SourceRef::Registry
        };

        let mut dependency = Dependency::new(name, constraint.with_optional_marker(marker))
            .from_source(source);
        dependency.kind = kind;
        dependency.optional = detailed.optional;
        for extra in &detailed.extras {
            dependency = dependency.with_extra(extra);
        }
        Ok(dependency)
    }

    /// Inverse of `to_dependency`, producing the shortest form
    pub fn from_dependency(dependency: &Dependency) -> Self {
        let plain = dependency.id.source.is_registry()
            && dependency.marker().is_none()
            && dependency.extras.is_empty()
            && !dependency.optional;
        if plain {
            return DependencySpec::Simple(dependency.constraint.text().to_string());
        }

        let mut detailed = DetailedDependency {
            version: Some(dependency.constraint.text().to_string()),
            markers: dependency.marker().map(|m| m.to_string()),
            extras: dependency.extras.iter().cloned().collect(),
            optional: dependency.optional,
            ..DetailedDependency::default()
        };
        match &dependency.id.source {
            SourceRef::Registry => {},
            SourceRef::Index { name } => detailed.source = Some(name.clone()),
            SourceRef::Path { path } => detailed.path = Some(path.clone()),
            SourceRef::Url { url } => detailed.url = Some(url.clone()),
            SourceRef::Git { url, rev } => {
                detailed.git = Some(url.clone());
                detailed.rev = rev.clone();
            },
        }
        DependencySpec::Detailed(detailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_spec() {
        let spec: DependencySpec = serde_json::from_str("\"^2.0\"").unwrap();
        let dependency = spec.to_dependency("Requests", DependencyKind::Main).unwrap();
        assert_eq!(dependency.name().as_str(), "requests");
        assert_eq!(dependency.constraint.text(), "^2.0");
        assert!(dependency.kind.is_runtime());
    }

    #[test]
    fn test_detailed_spec_with_marker_and_extras() {
        let spec: DependencySpec = serde_json::from_str(
            r#"{"version": ">=1.0", "markers": "sys_platform == 'linux'", "extras": ["Socks"], "optional": true}"#,
        )
        .unwrap();
        let dependency = spec.to_dependency("urllib3", DependencyKind::Dev).unwrap();

        assert!(dependency.optional);
        assert!(dependency.kind.is_dev_only());
        assert!(dependency.extras.contains("socks"));

        let linux = MarkerEnvironment::new().with("sys_platform", "linux");
        let windows = MarkerEnvironment::new().with("sys_platform", "win32");
        assert!(dependency.applies_to(&linux, &BTreeSet::new()));
        assert!(!dependency.applies_to(&windows, &BTreeSet::new()));
    }

    #[test]
    fn test_path_dependency_has_any_constraint() {
        let spec = DependencySpec::Detailed(DetailedDependency {
            path: Some("../local".to_string()),
            ..DetailedDependency::default()
        });
        let dependency = spec.to_dependency("local", DependencyKind::Main).unwrap();
        assert!(dependency.constraint.versions().is_full());
        assert_eq!(
            dependency.id.source,
            SourceRef::Path {
                path: "../local".to_string()
            }
        );
    }

    #[test]
    fn test_conflicting_locations_rejected() {
        let spec = DependencySpec::Detailed(DetailedDependency {
            path: Some("../local".to_string()),
            git: Some("https://example.com/x.git".to_string()),
            ..DetailedDependency::default()
        });
        assert!(spec.to_dependency("x", DependencyKind::Main).is_err());
    }

    #[test]
    fn test_from_dependency_prefers_simple_form() {
        let dependency = Dependency::parse("b", "^2.0").unwrap();
        assert_eq!(
            DependencySpec::from_dependency(&dependency),
            DependencySpec::Simple("^2.0".to_string())
        );

        let dev = dependency.clone().with_extra("tls");
        assert!(matches!(
            DependencySpec::from_dependency(&dev),
            DependencySpec::Detailed(_)
        ));
    }
}
