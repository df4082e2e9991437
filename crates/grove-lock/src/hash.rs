//! Content hash of root requirements

use serde_json::{json, Value};

use grove_core::utils::sha256_hex;
use grove_core::{Dependency, DependencyKind, RootRequirements};

/// `sha256:` + hex SHA-256 of the canonical JSON form of `root`.
///
/// Dependencies are sorted by group then name, so reordering the manifest
/// does not change the hash. The project name is not part of the hash.
pub fn content_hash(root: &RootRequirements) -> String {
    let canonical = canonical_form(root);
    // serde_json maps are sorted, making the serialization canonical
    format!("sha256:{}", sha256_hex(canonical.to_string().as_bytes()))
}

fn canonical_form(root: &RootRequirements) -> Value {
    let mut dependencies: Vec<&Dependency> = root.dependencies.iter().collect();
    dependencies.sort_by(|a, b| (group(a.kind), &a.id).cmp(&(group(b.kind), &b.id)));

    let dependencies: Vec<Value> = dependencies
        .into_iter()
        .map(|dep| {
            json!({
                "group": group(dep.kind),
                "name": dep.name().as_str(),
                "constraint": dep.constraint.text(),
                "source": dep.id.source,
                "marker": dep.marker().map(|m| m.to_string()),
                "extras": dep.extras,
                "optional": dep.optional,
            })
        })
        .collect();

    let extras: serde_json::Map<String, Value> = root
        .extras
        .iter()
        .map(|(extra, names)| {
            let mut names: Vec<&str> = names.iter().map(|n| n.as_str()).collect();
            names.sort_unstable();
            (extra.clone(), json!(names))
        })
        .collect();

    json!({
        "dependencies": dependencies,
        "extras": extras,
    })
}

fn group(kind: DependencyKind) -> &'static str {
    match kind {
        DependencyKind::Main => "main",
        DependencyKind::Dev => "dev",
    }
}
