//! Format-preserving grove.toml edits for `add` and `remove`
//!
//! Edits go through `toml_edit`, so comments, key order and whitespace
//! outside the touched entries survive.

use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use toml_edit::{Array, DocumentMut, InlineTable, Item, Table, Value};
use tracing::debug;

use grove_core::error::GroveError;
use grove_core::{DependencyKind, DependencySpec, PackageName};

use crate::manifest::{parse_manifest, Manifest};
use crate::ConfigResult;

fn section(kind: DependencyKind) -> &'static str {
    match kind {
        DependencyKind::Main => "dependencies",
        DependencyKind::Dev => "dev-dependencies",
    }
}

pub struct ManifestEditor {
    path: Utf8PathBuf,
    document: DocumentMut,
}

impl ManifestEditor {
    pub fn parse(content: &str, path: impl Into<Utf8PathBuf>) -> ConfigResult<Self> {
        let path = path.into();
        let document = content
            .parse::<DocumentMut>()
            .map_err(|e| GroveError::toml_parse(path.as_str(), content, e.message(), e.span().map(|s| s.start)))?;
        Ok(Self { path, document })
    }

    pub async fn open(path: &Utf8Path) -> ConfigResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GroveError::io(format!("Failed to read {}", path), e))?;
        Self::parse(&content, path)
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Key under which `name` is declared in `kind`'s table, in its
    /// original spelling
    fn declared_key(&self, name: &str, kind: DependencyKind) -> Option<String> {
        let wanted = PackageName::new(name);
        self.document
            .get(section(kind))
            .and_then(Item::as_table_like)?
            .iter()
            .map(|(key, _)| key)
            .find(|key| PackageName::new(key) == wanted)
            .map(str::to_string)
    }

    /// Declare `name` in `kind`'s table, replacing an existing declaration
    /// in either group. Returns `true` if one was replaced.
    pub fn add_dependency(&mut self, name: &str, spec: &DependencySpec, kind: DependencyKind) -> bool {
        let replaced = [DependencyKind::Main, DependencyKind::Dev]
            .into_iter()
            .filter(|group| *group != kind)
            .any(|group| self.remove_dependency(name, group));

        let key = self.declared_key(name, kind);
        let table = self
            .document
            .entry(section(kind))
            .or_insert(Item::Table(Table::new()));
        let Some(table) = table.as_table_like_mut() else {
            return replaced;
        };

        let item = Item::Value(spec_value(spec));
        let replaced = match key {
            Some(existing) => {
                table.insert(&existing, item);
                true
            },
            None => {
                table.insert(name, item);
                replaced
            },
        };
        debug!(name, section = section(kind), replaced, "added dependency");
        replaced
    }

    /// Remove `name` from `kind`'s table; `false` if it was not declared there
    pub fn remove_dependency(&mut self, name: &str, kind: DependencyKind) -> bool {
        let Some(key) = self.declared_key(name, kind) else {
            return false;
        };
        let removed = self
            .document
            .get_mut(section(kind))
            .and_then(Item::as_table_like_mut)
            .and_then(|table| table.remove(&key))
            .is_some();
        // Drop the name from extras too
        if removed && kind == DependencyKind::Main {
            self.remove_from_extras(name);
        }
        removed
    }

    fn remove_from_extras(&mut self, name: &str) {
        let wanted = PackageName::new(name);
        let Some(extras) = self.document.get_mut("extras").and_then(Item::as_table_like_mut) else {
            return;
        };
        for (_, item) in extras.iter_mut() {
            if let Some(names) = item.as_array_mut() {
                names.retain(|value| value.as_str().map_or(true, |n| PackageName::new(n) != wanted));
            }
        }
    }

    /// The edited document, validated as a manifest
    pub fn manifest(&self) -> ConfigResult<Manifest> {
        parse_manifest(&self.document.to_string(), self.path.as_str())
    }

    pub fn contents(&self) -> String {
        self.document.to_string()
    }

    /// Validate, then atomically replace the file
    pub fn save(&self) -> ConfigResult<Manifest> {
        let manifest = self.manifest()?;
        let dir = self.path.parent().unwrap_or_else(|| Utf8Path::new("."));
        let io_error = |e: std::io::Error| GroveError::io(format!("Failed to write {}", self.path), e);

        let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(io_error)?;
        temp.write_all(self.contents().as_bytes()).map_err(io_error)?;
        temp.persist(&self.path).map_err(|e| io_error(e.error))?;
        debug!(path = %self.path, "saved manifest");
        Ok(manifest)
    }
}

/// Inline form of a dependency spec
fn spec_value(spec: &DependencySpec) -> Value {
    let detailed = match spec {
        DependencySpec::Simple(text) => return Value::from(text.as_str()),
        DependencySpec::Detailed(detailed) => detailed,
    };

    let mut table = InlineTable::new();
    let strings = [
        ("version", &detailed.version),
        ("markers", &detailed.markers),
        ("source", &detailed.source),
        ("path", &detailed.path),
        ("url", &detailed.url),
        ("git", &detailed.git),
        ("rev", &detailed.rev),
    ];
    for (key, value) in strings {
        if let Some(value) = value {
            table.insert(key, Value::from(value.as_str()));
        }
    }
    if !detailed.extras.is_empty() {
        let extras: Array = detailed.extras.iter().map(String::as_str).collect();
        table.insert("extras", Value::Array(extras));
    }
    if detailed.optional {
        table.insert("optional", Value::from(true));
    }
    Value::InlineTable(table)
}
