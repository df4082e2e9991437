//! `grove add`
//!
//! The manifest is only saved once the new requirements resolve, so a
//! failed add leaves grove.toml and grove.lock untouched.

use clap::Args;

use grove_config::ManifestEditor;
use grove_core::error::{GroveError, GroveResult};
use grove_core::types::dependency::DetailedDependency;
use grove_core::{Constraint, DependencyKind, DependencySpec, PackageId};
use grove_installer::{InstallOptions, RunStatus};
use grove_lock::LockFile;
use grove_registry::Pool;

use super::{
    install_graph, lock_changes, lock_for, resolve, write_lock, Capability, Command, InstallContext, InstallerFlags,
    ProjectContext,
};

#[derive(Debug, Clone, Default, Args)]
pub struct AddArgs {
    /// Packages as NAME or NAME@CONSTRAINT
    #[arg(required = true, value_name = "PACKAGE")]
    pub packages: Vec<String>,

    /// Add to [dev-dependencies]
    #[arg(short = 'D', long)]
    pub dev: bool,

    /// Declare as optional, to be enabled through an extra
    #[arg(long, conflicts_with = "dev")]
    pub optional: bool,

    /// Print what would change without writing or installing
    #[arg(long)]
    pub dry_run: bool,

    #[command(flatten)]
    pub installer: InstallerFlags,
}

impl Command for AddArgs {
    const CAPABILITY: Capability = Capability::Installer;

    fn settings_layer(&self) -> grove_config::SettingsLayer {
        self.installer.layer()
    }
}

/// Split `NAME@CONSTRAINT`; the constraint is checked but kept as written
pub fn parse_requirement(input: &str) -> GroveResult<(String, Option<String>)> {
    let (name, constraint) = match input.split_once('@') {
        Some((name, constraint)) => (name.trim(), Some(constraint.trim())),
        None => (input.trim(), None),
    };
    if name.is_empty() {
        return Err(GroveError::ConfigValidation {
            field: "package".to_string(),
            reason: format!("'{}' does not name a package", input),
        });
    }

    match constraint {
        Some("") => Err(GroveError::ConfigValidation {
            field: name.to_string(),
            reason: "empty version constraint after '@'".to_string(),
        }),
        Some(constraint) => {
            Constraint::parse(constraint).map_err(|e| GroveError::ConfigValidation {
                field: name.to_string(),
                reason: e.to_string(),
            })?;
            Ok((name.to_string(), Some(constraint.to_string())))
        },
        None => Ok((name.to_string(), None)),
    }
}

/// `^<latest>` for the newest stable, non-yanked release of `name`
async fn latest_constraint(pool: &Pool, name: &str) -> GroveResult<String> {
    let candidates = pool.candidates(&PackageId::registry(name)).await?;
    let usable = || candidates.iter().filter(|candidate| !candidate.yanked);
    let latest = usable()
        .find(|candidate| !candidate.is_prerelease())
        .or_else(|| usable().next())
        .ok_or_else(|| GroveError::PackageNotFound { name: name.to_string() })?;
    Ok(format!("^{}", latest.version))
}

pub async fn execute(args: AddArgs, ctx: &ProjectContext, install_ctx: &InstallContext) -> GroveResult<RunStatus> {
    let kind = if args.dev {
        DependencyKind::Dev
    } else {
        DependencyKind::Main
    };
    let mut editor = ManifestEditor::open(&ctx.project.manifest_path).await?;

    for requirement in &args.packages {
        let (name, constraint) = parse_requirement(requirement)?;
        let constraint = match constraint {
            Some(constraint) => constraint,
            None => latest_constraint(install_ctx.pool(), &name).await?,
        };
        let spec = if args.optional {
            DependencySpec::Detailed(DetailedDependency {
                version: Some(constraint.clone()),
                optional: true,
                ..DetailedDependency::default()
            })
        } else {
            DependencySpec::Simple(constraint.clone())
        };

        if editor.add_dependency(&name, &spec, kind) {
            ctx.output.info(&format!("Updating {} to {}", name, constraint));
        } else {
            ctx.output.info(&format!("Adding {} {}", name, constraint));
        }
    }

    let root = editor.manifest()?.root_requirements()?;
    let previous = ctx.existing_lock()?;
    let preferences = previous.as_ref().map(LockFile::preferences).unwrap_or_default();
    let graph = resolve(ctx, install_ctx.pool(), &root, preferences).await?;
    let lock = lock_for(&graph, &root);

    if args.dry_run {
        for change in lock_changes(previous.as_ref(), &lock) {
            ctx.output.info(&format!("  {}", change));
        }
        ctx.output.info(&format!("Would update {}", editor.path()));
        return Ok(RunStatus::Success);
    }

    editor.save()?;
    write_lock(ctx, previous.as_ref(), &lock)?;
    install_graph(ctx, install_ctx, &graph, &InstallOptions::default()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_requirement() {
        assert_eq!(parse_requirement("requests").unwrap(), ("requests".to_string(), None));
        assert_eq!(
            parse_requirement("requests@^2.31").unwrap(),
            ("requests".to_string(), Some("^2.31".to_string()))
        );
        assert_eq!(
            parse_requirement("idna @ >=3.0,<4.0").unwrap(),
            ("idna".to_string(), Some(">=3.0,<4.0".to_string()))
        );
    }

    #[test]
    fn test_parse_requirement_rejects_bad_input() {
        assert!(parse_requirement("@1.0").is_err());
        assert!(parse_requirement("requests@").is_err());
        assert!(matches!(
            parse_requirement("requests@>>2"),
            Err(GroveError::ConfigValidation { field, .. }) if field == "requests"
        ));
    }
}
