//! `grove export`: requirements-style listing of grove.lock

use std::path::PathBuf;

use clap::Args;

use grove_core::error::{GroveError, GroveResult};
use grove_installer::RunStatus;
use grove_lock::{requirements, ExportOptions};

use super::{Capability, Command, ProjectContext};

#[derive(Debug, Clone, Default, Args)]
pub struct ExportArgs {
    /// Write to FILE instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Leave out the --hash options
    #[arg(long)]
    pub without_hashes: bool,

    /// Include development dependencies
    #[arg(long)]
    pub with_dev: bool,
}

impl Command for ExportArgs {
    const CAPABILITY: Capability = Capability::Project;
}

pub async fn execute(args: ExportArgs, ctx: &ProjectContext) -> GroveResult<RunStatus> {
    let root = ctx.root_requirements()?;
    let lock = ctx.lock.read_fresh(&root)?;
    let options = ExportOptions {
        with_hashes: !args.without_hashes,
        with_dev: args.with_dev,
    };
    let text = requirements(&lock, &options);

    match args.output {
        Some(path) => {
            let path = ctx.cwd.as_std_path().join(path);
            tokio::fs::write(&path, &text)
                .await
                .map_err(|e| GroveError::io(format!("Failed to write {}", path.display()), e))?;
            ctx.output.success(&format!("Exported {} requirements to {}", text.lines().count(), path.display()));
        },
        None => {
            for line in text.lines() {
                ctx.output.data(line);
            }
        },
    }
    Ok(RunStatus::Success)
}
