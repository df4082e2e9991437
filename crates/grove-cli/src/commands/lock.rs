//! `grove lock`

use std::collections::BTreeMap;

use clap::Args;

use grove_core::error::GroveResult;
use grove_installer::RunStatus;
use grove_lock::LockFile;

use super::{lock_for, resolve, write_lock, Capability, Command, ProjectContext, ResolverContext};

#[derive(Debug, Clone, Default, Args)]
pub struct LockArgs {
    /// Keep locked versions where they still satisfy the constraints
    #[arg(long)]
    pub no_update: bool,

    /// Only check that grove.lock is up to date
    #[arg(long, conflicts_with = "no_update")]
    pub check: bool,
}

impl Command for LockArgs {
    const CAPABILITY: Capability = Capability::Resolver;
}

pub async fn execute(args: LockArgs, ctx: &ProjectContext, resolver: &ResolverContext) -> GroveResult<RunStatus> {
    let root = ctx.root_requirements()?;

    if args.check {
        ctx.lock.read_fresh(&root)?.check_consistency()?;
        ctx.output.success(&format!("{} is up to date", ctx.lock.path()));
        return Ok(RunStatus::Success);
    }

    let previous = ctx.existing_lock()?;
    let preferences = if args.no_update {
        previous.as_ref().map(LockFile::preferences).unwrap_or_default()
    } else {
        BTreeMap::new()
    };

    let graph = resolve(ctx, &resolver.pool, &root, preferences).await?;
    write_lock(ctx, previous.as_ref(), &lock_for(&graph, &root))?;
    Ok(RunStatus::Success)
}
