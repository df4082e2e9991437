//! `grove show`: locked packages, one package, or the dependency tree

use std::collections::BTreeSet;

use clap::Args;
use tracing::warn;

use grove_core::error::GroveResult;
use grove_core::PackageName;
use grove_installer::RunStatus;
use grove_lock::{LockEntry, LockFile};

use super::{unknown_package, Capability, Command, ProjectContext, ResolverContext};

#[derive(Debug, Clone, Default, Args)]
pub struct ShowArgs {
    /// Package to describe
    #[arg(value_name = "PACKAGE")]
    pub package: Option<String>,

    /// Print the dependency tree
    #[arg(short, long)]
    pub tree: bool,

    /// Only list packages with a newer release
    #[arg(short, long, conflicts_with = "tree")]
    pub outdated: bool,
}

impl Command for ShowArgs {
    const CAPABILITY: Capability = Capability::Resolver;
}

pub async fn execute(args: ShowArgs, ctx: &ProjectContext, resolver: &ResolverContext) -> GroveResult<RunStatus> {
    let lock = ctx.lock.read()?;

    let selected: Vec<&LockEntry> = match &args.package {
        Some(name) => {
            let entry = lock
                .entry(&PackageName::new(name))
                .ok_or_else(|| unknown_package(&ctx.output, name, lock.packages.iter().map(|e| e.name.as_str())))?;
            vec![entry]
        },
        None => lock.packages.iter().collect(),
    };

    if args.outdated {
        show_outdated(ctx, resolver, &selected).await;
    } else if args.tree {
        let roots: Vec<(String, String)> = match &args.package {
            Some(_) => selected.iter().map(|e| (e.name.to_string(), e.version.to_string())).collect(),
            None => ctx
                .root_requirements()?
                .dependencies
                .iter()
                .filter(|dep| lock.entry(dep.name()).is_some())
                .map(|dep| (dep.name().to_string(), dep.constraint.text().to_string()))
                .collect(),
        };
        for line in render_tree(&lock, &roots) {
            ctx.output.data(&line);
        }
    } else if let (Some(_), [entry]) = (&args.package, selected.as_slice()) {
        for line in describe(&lock, entry) {
            ctx.output.data(&line);
        }
    } else {
        for line in list(&selected) {
            ctx.output.data(&line);
        }
    }
    Ok(RunStatus::Success)
}

fn list(entries: &[&LockEntry]) -> Vec<String> {
    let width = entries.iter().map(|e| e.name.as_str().len()).max().unwrap_or(0);
    entries
        .iter()
        .map(|entry| {
            let mut line = format!("{:width$} {}", entry.name.as_str(), entry.version, width = width);
            if entry.category.is_dev_only() {
                line.push_str(" (dev)");
            }
            line
        })
        .collect()
}

fn describe(lock: &LockFile, entry: &LockEntry) -> Vec<String> {
    let mut lines = vec![
        format!("name     : {}", entry.name),
        format!("version  : {}", entry.version),
        format!("category : {}", if entry.category.is_dev_only() { "dev" } else { "main" }),
    ];
    if !entry.source.is_registry() {
        lines.push(format!("source   : {}", entry.source));
    }
    if !entry.extras.is_empty() {
        let extras: Vec<&str> = entry.extras.iter().map(String::as_str).collect();
        lines.push(format!("extras   : {}", extras.join(", ")));
    }

    if !entry.dependencies.is_empty() {
        lines.push(String::new());
        lines.push("dependencies".to_string());
        for (name, locked) in &entry.dependencies {
            lines.push(format!(" - {} {}", name, locked.constraint_text()));
        }
    }

    let dependents: Vec<&LockEntry> = lock
        .packages
        .iter()
        .filter(|other| {
            other
                .dependencies
                .keys()
                .any(|name| PackageName::new(name) == entry.name)
        })
        .collect();
    if !dependents.is_empty() {
        lines.push(String::new());
        lines.push("required by".to_string());
        for other in dependents {
            let constraint = other
                .dependencies
                .iter()
                .find(|(name, _)| PackageName::new(name) == entry.name)
                .map(|(_, locked)| locked.constraint_text())
                .unwrap_or("*");
            lines.push(format!(" - {} requires {}", other.name, constraint));
        }
    }
    lines
}

/// Tree lines below each `(name, label)` root; a package already on the
/// current path is not expanded again
pub fn render_tree(lock: &LockFile, roots: &[(String, String)]) -> Vec<String> {
    let mut lines = Vec::new();
    for (name, label) in roots {
        lines.push(format!("{} {}", name, label));
        let mut path = BTreeSet::from([PackageName::new(name)]);
        render_children(lock, &PackageName::new(name), "", &mut path, &mut lines);
    }
    lines
}

fn render_children(
    lock: &LockFile,
    name: &PackageName,
    prefix: &str,
    path: &mut BTreeSet<PackageName>,
    lines: &mut Vec<String>,
) {
    let Some(entry) = lock.entry(name) else {
        return;
    };
    let count = entry.dependencies.len();
    for (index, (child, locked)) in entry.dependencies.iter().enumerate() {
        let last = index + 1 == count;
        let child_name = PackageName::new(child);
        let cycle = path.contains(&child_name);
        lines.push(format!(
            "{}{} {} {}{}",
            prefix,
            if last { "└──" } else { "├──" },
            child,
            locked.constraint_text(),
            if cycle { " (cycle)" } else { "" }
        ));
        if cycle {
            continue;
        }
        path.insert(child_name.clone());
        let nested = format!("{}{}", prefix, if last { "    " } else { "│   " });
        render_children(lock, &child_name, &nested, path, lines);
        path.remove(&child_name);
    }
}

async fn show_outdated(ctx: &ProjectContext, resolver: &ResolverContext, entries: &[&LockEntry]) {
    let width = entries.iter().map(|e| e.name.as_str().len()).max().unwrap_or(0);
    let mut outdated = 0;

    for entry in entries {
        let candidates = match resolver.pool.candidates(&entry.id()).await {
            Ok(candidates) => candidates,
            Err(error) => {
                warn!(package = %entry.name, %error, "cannot check for updates");
                ctx.output.warn(&format!("{}: {}", entry.name, error));
                continue;
            },
        };
        let latest = candidates
            .iter()
            .filter(|candidate| !candidate.yanked && !candidate.is_prerelease())
            .map(|candidate| &candidate.version)
            .next();
        if let Some(latest) = latest.filter(|latest| **latest > entry.version) {
            outdated += 1;
            ctx.output.data(&format!(
                "{:width$} {} -> {}",
                entry.name.as_str(),
                entry.version,
                latest,
                width = width
            ));
        }
    }

    if outdated == 0 {
        ctx.output.info("All locked packages are up to date");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCK: &str = r#"
version = "1"
content-hash = "sha256:00"

[[package]]
name = "a"
version = "1.0.0"
category = "main"

[package.dependencies]
b = ">=1.0"
c = "*"

[[package]]
name = "b"
version = "1.2.0"
category = "main"

[package.dependencies]
a = "*"

[[package]]
name = "c"
version = "2.0.0"
category = "dev"
"#;

    fn lock() -> LockFile {
        LockFile::from_toml(LOCK, "grove.lock").unwrap()
    }

    #[test]
    fn test_tree_marks_cycles() {
        let lines = render_tree(&lock(), &[("a".to_string(), "^1.0".to_string())]);
        assert_eq!(
            lines,
            vec![
                "a ^1.0",
                "├── b >=1.0",
                "│   └── a * (cycle)",
                "└── c *",
            ]
        );
    }

    #[test]
    fn test_list_marks_dev_packages() {
        let lock = lock();
        let entries: Vec<&LockEntry> = lock.packages.iter().collect();
        assert_eq!(list(&entries), vec!["a 1.0.0", "b 1.2.0", "c 2.0.0 (dev)"]);
    }

    #[test]
    fn test_describe_lists_dependents() {
        let lock = lock();
        let b = lock.entry(&PackageName::new("b")).unwrap();
        let lines = describe(&lock, b);
        assert!(lines.contains(&"version  : 1.2.0".to_string()));
        assert!(lines.contains(&" - a *".to_string()));
        assert!(lines.contains(&" - a requires >=1.0".to_string()));
    }
}
