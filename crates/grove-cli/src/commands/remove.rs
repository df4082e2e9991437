//! `grove remove`

use clap::Args;

use grove_config::ManifestEditor;
use grove_core::error::GroveResult;
use grove_core::DependencyKind;
use grove_installer::{InstallMode, InstallOptions, RunStatus};
use grove_lock::LockFile;

use super::{
    install_graph, lock_changes, lock_for, resolve, unknown_package, write_lock, Capability, Command, InstallContext,
    InstallerFlags, ProjectContext,
};

#[derive(Debug, Clone, Default, Args)]
pub struct RemoveArgs {
    /// Packages to remove
    #[arg(required = true, value_name = "PACKAGE")]
    pub packages: Vec<String>,

    /// Remove from [dev-dependencies]
    #[arg(short = 'D', long)]
    pub dev: bool,

    /// Print what would change without writing or uninstalling
    #[arg(long)]
    pub dry_run: bool,

    #[command(flatten)]
    pub installer: InstallerFlags,
}

impl Command for RemoveArgs {
    const CAPABILITY: Capability = Capability::Installer;

    fn settings_layer(&self) -> grove_config::SettingsLayer {
        self.installer.layer()
    }
}

pub async fn execute(args: RemoveArgs, ctx: &ProjectContext, install_ctx: &InstallContext) -> GroveResult<RunStatus> {
    let (kind, declared) = if args.dev {
        (DependencyKind::Dev, &ctx.project.manifest.dev_dependencies)
    } else {
        (DependencyKind::Main, &ctx.project.manifest.dependencies)
    };
    let mut editor = ManifestEditor::open(&ctx.project.manifest_path).await?;

    for name in &args.packages {
        if !editor.remove_dependency(name, kind) {
            return Err(unknown_package(&ctx.output, name, declared.keys().map(String::as_str)));
        }
        ctx.output.info(&format!("Removing {}", name));
    }

    let root = editor.manifest()?.root_requirements()?;
    let previous = ctx.existing_lock()?;
    let preferences = previous.as_ref().map(LockFile::preferences).unwrap_or_default();
    let graph = resolve(ctx, install_ctx.pool(), &root, preferences).await?;
    let lock = lock_for(&graph, &root);

    let options = InstallOptions {
        mode: InstallMode::Sync,
        dry_run: args.dry_run,
        ..InstallOptions::default()
    };
    if args.dry_run {
        for change in lock_changes(previous.as_ref(), &lock) {
            ctx.output.info(&format!("  {}", change));
        }
        return install_graph(ctx, install_ctx, &graph, &options).await;
    }

    editor.save()?;
    write_lock(ctx, previous.as_ref(), &lock)?;
    install_graph(ctx, install_ctx, &graph, &options).await
}
