//! grove.toml parsing, validation and discovery

use std::collections::{BTreeMap, BTreeSet};

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tracing::debug;

use grove_core::error::GroveError;
use grove_core::{DependencyKind, DependencySpec, PackageName, RootRequirements, Version};

use crate::ConfigResult;

pub const MANIFEST_FILE_NAME: &str = "grove.toml";

/// Complete grove.toml configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Manifest {
    pub project: ProjectSection,

    /// Runtime dependencies, optional ones included
    #[serde(default)]
    pub dependencies: BTreeMap<String, DependencySpec>,

    #[serde(default)]
    pub dev_dependencies: BTreeMap<String, DependencySpec>,

    /// Extra name to the optional dependencies it enables
    #[serde(default)]
    pub extras: BTreeMap<String, Vec<String>>,

    /// Additional package indexes
    #[serde(default, rename = "source", skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SourceSpec>,

    #[serde(default)]
    pub installer: InstallerTable,
}

/// Project metadata section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSection {
    pub name: String,
    pub version: Version,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
}

/// A `[[source]]` entry: an HTTP index (`url`) or a local index directory
/// (`path`, relative to the project root)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Bearer token, read from this environment variable
    #[serde(default, rename = "token-env", skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,
}

/// Project-level installer settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct InstallerTable {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_workers: Option<usize>,
    /// Environment directory, relative to the project root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_dir: Option<String>,
}

impl Manifest {
    /// Root requirements for the resolver: main dependencies first, then
    /// dev dependencies, each group in name order
    pub fn root_requirements(&self) -> ConfigResult<RootRequirements> {
        let mut root = RootRequirements::new(&self.project.name);
        let groups = [
            ("dependencies", DependencyKind::Main, &self.dependencies),
            ("dev-dependencies", DependencyKind::Dev, &self.dev_dependencies),
        ];
        for (section, kind, dependencies) in groups {
            for (name, spec) in dependencies {
                let dependency = spec.to_dependency(name, kind).map_err(|e| GroveError::ConfigValidation {
                    field: format!("{}.{}", section, name),
                    reason: e.to_string(),
                })?;
                root = root.with_dependency(dependency);
            }
        }
        for (extra, names) in &self.extras {
            let names: Vec<&str> = names.iter().map(String::as_str).collect();
            root = root.with_extra(extra, &names);
        }
        Ok(root)
    }

    pub fn source(&self, name: &str) -> Option<&SourceSpec> {
        self.sources.iter().find(|source| source.name == name)
    }

    /// Whether `name` is declared in either dependency group
    pub fn declares(&self, name: &str) -> bool {
        let wanted = PackageName::new(name);
        self.dependencies
            .keys()
            .chain(self.dev_dependencies.keys())
            .any(|declared| PackageName::new(declared) == wanted)
    }
}

/// Parse grove.toml content; `file` names it in error messages
pub fn parse_manifest(content: &str, file: &str) -> ConfigResult<Manifest> {
    // Syntax first, for precise error positions
    content
        .parse::<toml_edit::DocumentMut>()
        .map_err(|e| GroveError::toml_parse(file, content, e.message(), e.span().map(|span| span.start)))?;

    let manifest: Manifest = toml::from_str(content)
        .map_err(|e| GroveError::toml_parse(file, content, e.message(), e.span().map(|span| span.start)))?;

    validate_manifest(&manifest)?;
    Ok(manifest)
}

/// Serialize a manifest to TOML
pub fn serialize_manifest(manifest: &Manifest) -> ConfigResult<String> {
    toml::to_string_pretty(manifest).map_err(|e| GroveError::ConfigValidation {
        field: "manifest".to_string(),
        reason: format!("cannot serialize: {}", e),
    })
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> GroveError {
    GroveError::ConfigValidation {
        field: field.into(),
        reason: reason.into(),
    }
}

/// Validate configuration completeness and cross references
pub fn validate_manifest(manifest: &Manifest) -> ConfigResult<()> {
    if !is_valid_package_name(&manifest.project.name) {
        return Err(invalid(
            "project.name",
            format!(
                "'{}' is not a valid project name; use letters, digits, '-', '_' and '.', starting and ending with a letter or digit",
                manifest.project.name
            ),
        ));
    }

    let mut seen_sources = BTreeSet::new();
    for source in &manifest.sources {
        let field = format!("source.{}", source.name);
        if source.name.is_empty() {
            return Err(invalid("source.name", "source names must not be empty"));
        }
        if !seen_sources.insert(source.name.as_str()) {
            return Err(invalid(field, "source is declared twice"));
        }
        match (&source.url, &source.path) {
            (Some(_), None) | (None, Some(_)) => {},
            _ => return Err(invalid(field, "exactly one of 'url' or 'path' must be given")),
        }
    }

    let mut main_names = BTreeMap::new();
    for (section, dependencies) in [
        ("dependencies", &manifest.dependencies),
        ("dev-dependencies", &manifest.dev_dependencies),
    ] {
        let mut names = BTreeSet::new();
        for (name, spec) in dependencies {
            let field = format!("{}.{}", section, name);
            if !is_valid_package_name(name) {
                return Err(invalid(field, format!("'{}' is not a valid package name", name)));
            }
            if !names.insert(PackageName::new(name)) {
                return Err(invalid(field, "declared twice under different spellings"));
            }
            if let DependencySpec::Detailed(detailed) = spec {
                if let Some(index) = &detailed.source {
                    if manifest.source(index).is_none() {
                        return Err(invalid(field, format!("unknown source '{}'", index)));
                    }
                }
            }
            // Constraint, marker and location checks
            let kind = if section == "dependencies" {
                DependencyKind::Main
            } else {
                DependencyKind::Dev
            };
            let dependency = spec.to_dependency(name, kind).map_err(|e| invalid(field.clone(), e.to_string()))?;
            if section == "dependencies" {
                main_names.insert(dependency.name().clone(), dependency.optional);
            } else if main_names.contains_key(dependency.name()) {
                return Err(invalid(field, "also declared in [dependencies]"));
            }
        }
    }

    for (extra, names) in &manifest.extras {
        for name in names {
            match main_names.get(&PackageName::new(name)) {
                Some(true) => {},
                Some(false) => {
                    return Err(invalid(
                        format!("extras.{}", extra),
                        format!("'{}' must be declared with optional = true", name),
                    ))
                },
                None => {
                    return Err(invalid(
                        format!("extras.{}", extra),
                        format!("'{}' is not declared in [dependencies]", name),
                    ))
                },
            }
        }
    }

    if manifest.installer.max_workers == Some(0) {
        return Err(invalid("installer.max-workers", "must be at least 1"));
    }

    Ok(())
}

/// Check that a name is a valid package name
fn is_valid_package_name(name: &str) -> bool {
    let starts_and_ends_alphanumeric = matches!(
        (name.chars().next(), name.chars().last()),
        (Some(first), Some(last)) if first.is_ascii_alphanumeric() && last.is_ascii_alphanumeric()
    );
    starts_and_ends_alphanumeric && name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Walk up from `start` to the nearest directory holding grove.toml
pub fn find_manifest(start: &Utf8Path) -> ConfigResult<Utf8PathBuf> {
    let mut current = Some(start);
    while let Some(dir) = current {
        let candidate = dir.join(MANIFEST_FILE_NAME);
        if candidate.is_file() {
            debug!(path = %candidate, "found manifest");
            return Ok(candidate);
        }
        current = dir.parent();
    }
    Err(GroveError::ManifestNotFound {
        searched_from: start.to_string(),
    })
}

/// A loaded project: its root directory and manifest
#[derive(Debug, Clone)]
pub struct Project {
    pub root: Utf8PathBuf,
    pub manifest_path: Utf8PathBuf,
    pub manifest: Manifest,
}

impl Project {
    /// Find and load the project containing `cwd`
    pub async fn discover(cwd: &Utf8Path) -> ConfigResult<Self> {
        let manifest_path = find_manifest(cwd)?;
        Self::load(&manifest_path).await
    }

    pub async fn load(manifest_path: &Utf8Path) -> ConfigResult<Self> {
        let content = tokio::fs::read_to_string(manifest_path)
            .await
            .map_err(|e| GroveError::io(format!("Failed to read {}", manifest_path), e))?;
        let manifest = parse_manifest(&content, manifest_path.as_str())?;
        let root = manifest_path
            .parent()
            .map(Utf8Path::to_path_buf)
            .unwrap_or_else(|| Utf8PathBuf::from("."));

        Ok(Self {
            root,
            manifest_path: manifest_path.to_path_buf(),
            manifest,
        })
    }
}
