//! `grove update`

use std::collections::{BTreeMap, BTreeSet};

use clap::Args;

use grove_core::error::GroveResult;
use grove_core::PackageName;
use grove_installer::{InstallOptions, RunStatus};

use super::{
    install_graph, lock_changes, lock_for, resolve, unknown_package, write_lock, Capability, Command, InstallContext,
    InstallerFlags, ProjectContext,
};

#[derive(Debug, Clone, Default, Args)]
pub struct UpdateArgs {
    /// Packages to update; everything when none are given
    #[arg(value_name = "PACKAGE")]
    pub packages: Vec<String>,

    /// Print what would change without writing or installing
    #[arg(long)]
    pub dry_run: bool,

    /// Update grove.lock but do not install
    #[arg(long, conflicts_with = "dry_run")]
    pub lock_only: bool,

    #[command(flatten)]
    pub installer: InstallerFlags,
}

impl Command for UpdateArgs {
    const CAPABILITY: Capability = Capability::Installer;

    fn settings_layer(&self) -> grove_config::SettingsLayer {
        self.installer.layer()
    }
}

pub async fn execute(args: UpdateArgs, ctx: &ProjectContext, install_ctx: &InstallContext) -> GroveResult<RunStatus> {
    let root = ctx.root_requirements()?;
    let previous = ctx.existing_lock()?;

    // Named packages are unpinned, everything else stays where it is
    let mut preferences = BTreeMap::new();
    if !args.packages.is_empty() {
        let mut known: BTreeSet<PackageName> = root.dependencies.iter().map(|dep| dep.name().clone()).collect();
        if let Some(lock) = &previous {
            known.extend(lock.packages.iter().map(|entry| entry.name.clone()));
        }

        let mut unpinned = BTreeSet::new();
        for name in &args.packages {
            let name = PackageName::new(name);
            if !known.contains(&name) {
                return Err(unknown_package(&ctx.output, name.as_str(), known.iter().map(PackageName::as_str)));
            }
            unpinned.insert(name);
        }
        if let Some(lock) = &previous {
            preferences = lock
                .preferences()
                .into_iter()
                .filter(|(name, _)| !unpinned.contains(name))
                .collect();
        }
    }

    let graph = resolve(ctx, install_ctx.pool(), &root, preferences).await?;
    let lock = lock_for(&graph, &root);

    if args.dry_run {
        let changes = lock_changes(previous.as_ref(), &lock);
        if changes.is_empty() {
            ctx.output.info("No dependency changes");
        }
        for change in changes {
            ctx.output.info(&format!("  {}", change));
        }
        let options = InstallOptions {
            dry_run: true,
            ..InstallOptions::default()
        };
        return install_graph(ctx, install_ctx, &graph, &options).await;
    }

    write_lock(ctx, previous.as_ref(), &lock)?;
    if args.lock_only {
        return Ok(RunStatus::Success);
    }
    install_graph(ctx, install_ctx, &graph, &InstallOptions::default()).await
}
