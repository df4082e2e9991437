//! `grove install`
//!
//! Installs what grove.lock pins. A missing lock is created first; a stale
//! lock is an error, never silently re-resolved.

use std::collections::BTreeMap;

use clap::Args;

use grove_core::error::{GroveError, GroveResult};
use grove_core::types::marker::normalize_extra;
use grove_core::RootRequirements;
use grove_installer::{InstallMode, InstallOptions, RunStatus, Selection};

use super::{install_graph, lock_for, resolve, write_lock, Capability, Command, InstallContext, InstallerFlags, ProjectContext};

#[derive(Debug, Clone, Default, Args)]
pub struct InstallArgs {
    /// Also remove installed packages the lock does not contain
    #[arg(long)]
    pub sync: bool,

    /// Skip development dependencies
    #[arg(long)]
    pub no_dev: bool,

    /// Enable a project extra
    #[arg(short = 'E', long = "extras", value_name = "EXTRA")]
    pub extras: Vec<String>,

    /// Enable every project extra
    #[arg(long, conflicts_with = "extras")]
    pub all_extras: bool,

    /// Print the operations without running them
    #[arg(long)]
    pub dry_run: bool,

    /// Only check that grove.lock is up to date
    #[arg(long, conflicts_with = "dry_run")]
    pub check: bool,

    #[command(flatten)]
    pub installer: InstallerFlags,
}

impl Command for InstallArgs {
    const CAPABILITY: Capability = Capability::Installer;

    fn settings_layer(&self) -> grove_config::SettingsLayer {
        self.installer.layer()
    }
}

impl InstallArgs {
    pub fn options(&self, root: &RootRequirements) -> GroveResult<InstallOptions> {
        let mut selection = Selection::default();
        if self.no_dev {
            selection = selection.without_dev();
        }

        let extras = if self.all_extras {
            root.extra_names().into_iter().collect()
        } else {
            self.extras.clone()
        };
        for extra in &extras {
            if !root.extras.contains_key(&normalize_extra(extra)) {
                return Err(GroveError::ConfigValidation {
                    field: "extras".to_string(),
                    reason: format!("project '{}' has no extra named '{}'", root.name, extra),
                });
            }
            selection = selection.with_extra(extra);
        }

        Ok(InstallOptions {
            mode: if self.sync {
                InstallMode::Sync
            } else {
                InstallMode::Additive
            },
            selection,
            dry_run: self.dry_run,
        })
    }
}

pub async fn execute(args: InstallArgs, ctx: &ProjectContext, install_ctx: &InstallContext) -> GroveResult<RunStatus> {
    let root = ctx.root_requirements()?;

    if args.check {
        let lock = ctx.lock.read_fresh(&root)?;
        lock.check_consistency()?;
        ctx.output.success(&format!("{} is up to date", ctx.lock.path()));
        return Ok(RunStatus::Success);
    }

    let options = args.options(&root)?;
    let graph = match ctx.lock.read_fresh(&root) {
        Ok(lock) => {
            ctx.output.step(&format!("Installing from {}", ctx.lock.path()));
            lock.to_graph_view(&root)?
        },
        Err(GroveError::LockNotFound { .. }) => {
            ctx.output.warn("No lock file found, resolving dependencies");
            let graph = resolve(ctx, install_ctx.pool(), &root, BTreeMap::new()).await?;
            if !args.dry_run {
                write_lock(ctx, None, &lock_for(&graph, &root))?;
            }
            graph
        },
        Err(error) => return Err(error),
    };

    install_graph(ctx, install_ctx, &graph, &options).await
}
