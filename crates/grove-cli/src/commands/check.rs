//! `grove check`
//!
//! grove.toml is validated while the project loads; this adds the lock:
//! it must be internally consistent and match the manifest.

use clap::Args;

use grove_core::error::{GroveError, GroveResult};
use grove_installer::RunStatus;
use grove_lock::{Freshness, LockStore};

use super::{Capability, Command, ProjectContext};

#[derive(Debug, Clone, Default, Args)]
pub struct CheckArgs {}

impl Command for CheckArgs {
    const CAPABILITY: Capability = Capability::Project;
}

pub async fn execute(_args: CheckArgs, ctx: &ProjectContext) -> GroveResult<RunStatus> {
    let root = ctx.root_requirements()?;
    ctx.output.success(&format!("{} is valid", ctx.project.manifest_path));

    let Some(lock) = ctx.existing_lock()? else {
        ctx.output.warn(&format!("{} does not exist yet; run 'grove lock'", ctx.lock.path()));
        return Ok(RunStatus::Success);
    };

    lock.check_consistency()?;
    match LockStore::validate(&lock, &root) {
        Freshness::Fresh => {
            ctx.output.success(&format!("{} is consistent and up to date", ctx.lock.path()));
            Ok(RunStatus::Success)
        },
        Freshness::Stale { expected, found } => Err(GroveError::LockStale { expected, found }),
    }
}
