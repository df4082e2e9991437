//! Command implementations and dispatch.
//!
//! Every `Commands` variant carries its argument struct, whose `Command`
//! impl declares the capability it needs. Dispatch builds that context
//! once and hands it to the command's `execute` function by reference.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use clap::Args;
use tracing::{debug, info};

use grove_cache::CasStore;
use grove_config::{Project, Settings, SettingsLayer, SettingsLoader};
use grove_core::error::{GroveError, GroveResult};
use grove_core::utils::path::local_path_from_location;
use grove_core::{MarkerEnvironment, PackageName, RootRequirements, SourceRef, Version};
use grove_installer::{
    DirectoryEnvironment, EnvironmentProvider, ExecutorMode, InstallOptions, Installer, RunStatus,
};
use grove_lock::{content_hash, LockFile, LockStore};
use grove_registry::{AuthConfig, LocalIndex, PackageSource, Pool, PoolConfig, RegistryClient, RetryConfig};
use grove_resolver::{ResolvedGraph, Resolver, ResolverOptions};

use crate::output::OutputHandler;
use crate::Commands;

pub mod add;
pub mod cache;
pub mod check;
pub mod export;
pub mod install;
pub mod lock;
pub mod remove;
pub mod show;
pub mod update;


/// What a command needs to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Settings only, no project
    Global,
    /// A loaded project and its lock file
    Project,
    /// Project plus a package Pool
    Resolver,
    /// Resolver plus an environment to install into
    Installer,
}

/// Implemented by every command's argument struct
pub trait Command {
    const CAPABILITY: Capability;

    /// Settings overrides given on the command line
    fn settings_layer(&self) -> SettingsLayer {
        SettingsLayer::default()
    }
}

impl Commands {
    pub fn capability(&self) -> Capability {
        match self {
            Commands::Install(args) => capability_of(args),
            Commands::Update(args) => capability_of(args),
            Commands::Lock(args) => capability_of(args),
            Commands::Add(args) => capability_of(args),
            Commands::Remove(args) => capability_of(args),
            Commands::Show(args) => capability_of(args),
            Commands::Export(args) => capability_of(args),
            Commands::Check(args) => capability_of(args),
            Commands::Cache(command) => capability_of(command),
        }
    }

    fn settings_layer(&self) -> SettingsLayer {
        match self {
            Commands::Install(args) => args.settings_layer(),
            Commands::Update(args) => args.settings_layer(),
            Commands::Add(args) => args.settings_layer(),
            Commands::Remove(args) => args.settings_layer(),
            _ => SettingsLayer::default(),
        }
    }
}

fn capability_of<C: Command>(_: &C) -> Capability {
    C::CAPABILITY
}

/// Installer flags shared by the commands that install
#[derive(Debug, Clone, Default, Args)]
pub struct InstallerFlags {
    /// Run installer operations concurrently
    #[arg(long)]
    pub parallel: bool,

    /// Upper bound of concurrent operations
    #[arg(long, value_name = "N")]
    pub max_workers: Option<usize>,
}

impl InstallerFlags {
    pub fn layer(&self) -> SettingsLayer {
        let mut layer = SettingsLayer::default();
        if self.parallel {
            layer.installer.parallel = Some(true);
        }
        layer.installer.max_workers = self.max_workers;
        layer
    }
}

/// Per-invocation project state, built once and passed by reference
pub struct ProjectContext {
    pub cwd: Utf8PathBuf,
    pub project: Project,
    pub settings: Settings,
    pub lock: LockStore,
    pub output: OutputHandler,
}

impl ProjectContext {
    pub async fn load(cwd: &Utf8Path, loader: &SettingsLoader, cli: &SettingsLayer, output: OutputHandler) -> GroveResult<Self> {
        let project = Project::discover(cwd).await?;
        let settings = loader
            .load(Some(&project.manifest.installer), &SettingsLayer::collect_env_vars(), cli)
            .await?;
        let lock = LockStore::in_project(&project.root);
        debug!(root = %project.root, "loaded project {}", project.manifest.project.name);

        Ok(Self {
            cwd: cwd.to_path_buf(),
            project,
            settings,
            lock,
            output,
        })
    }

    pub fn root_requirements(&self) -> GroveResult<RootRequirements> {
        self.project.manifest.root_requirements()
    }

    /// The existing lock, if there is one that can be read
    pub fn existing_lock(&self) -> GroveResult<Option<LockFile>> {
        match self.lock.read() {
            Ok(lock) => Ok(Some(lock)),
            Err(GroveError::LockNotFound { .. }) => Ok(None),
            Err(error) => Err(error),
        }
    }
}

/// Package Pool over the project's sources
pub struct ResolverContext {
    pub pool: Arc<Pool>,
}

impl ResolverContext {
    pub fn new(ctx: &ProjectContext) -> GroveResult<Self> {
        Ok(Self {
            pool: Arc::new(build_pool(&ctx.project, &ctx.settings)?),
        })
    }
}

/// Everything an installing command needs on top of the project
pub struct InstallContext {
    pub resolver: ResolverContext,
    pub provider: Arc<dyn EnvironmentProvider>,
    pub executor_mode: ExecutorMode,
}

impl InstallContext {
    pub fn new(ctx: &ProjectContext) -> GroveResult<Self> {
        let resolver = ResolverContext::new(ctx)?;
        let cache = CasStore::new(&ctx.settings.cache_dir)?;
        let env_dir = ctx.settings.env_dir_in(&ctx.project.root);
        let provider = DirectoryEnvironment::new(env_dir, resolver.pool.clone()).with_cache(Arc::new(cache));

        let installer = &ctx.settings.installer;
        let executor_mode = if installer.parallel {
            ExecutorMode::parallel(installer.max_workers)
        } else {
            ExecutorMode::Sequential
        };

        Ok(Self {
            resolver,
            provider: Arc::new(provider),
            executor_mode,
        })
    }

    pub fn pool(&self) -> &Pool {
        &self.resolver.pool
    }

    pub fn installer(&self) -> Installer {
        Installer::new(self.provider.clone(), self.executor_mode)
    }
}

/// Default index plus every `[[source]]` of the manifest
pub fn build_pool(project: &Project, settings: &Settings) -> GroveResult<Pool> {
    let timeout = Duration::from_secs(settings.network.timeout_secs);
    let mut sources: Vec<Arc<dyn PackageSource>> = vec![default_source(&settings.index_url, timeout)?];

    for source in &project.manifest.sources {
        let origin = SourceRef::Index {
            name: source.name.clone(),
        };
        match (&source.url, &source.path) {
            (Some(url), _) => {
                let auth = source
                    .token_env
                    .as_deref()
                    .and_then(|var| std::env::var(var).ok())
                    .map(|token| AuthConfig {
                        token: Some(token),
                        ..AuthConfig::default()
                    });
                sources.push(Arc::new(RegistryClient::with_config(&source.name, origin, url, auth, timeout)?));
            },
            (None, Some(path)) => {
                sources.push(Arc::new(LocalIndex::named(&source.name, project.root.join(path))));
            },
            (None, None) => {
                return Err(GroveError::ConfigValidation {
                    field: format!("source.{}", source.name),
                    reason: "exactly one of 'url' or 'path' must be given".to_string(),
                })
            },
        }
    }

    let config = PoolConfig {
        retry: RetryConfig {
            max_retries: settings.network.retries,
            ..RetryConfig::default()
        },
        fetch_timeout: timeout,
        environment: MarkerEnvironment::current(),
    };
    Ok(Pool::new(sources, config))
}

/// An `http(s)` index URL, or a local index directory
fn default_source(index_url: &str, timeout: Duration) -> GroveResult<Arc<dyn PackageSource>> {
    match local_path_from_location(index_url) {
        Some(path) => Ok(Arc::new(LocalIndex::new(path))),
        None => {
            let client = RegistryClient::with_config("default", SourceRef::Registry, index_url, None, timeout)?;
            Ok(Arc::new(client))
        },
    }
}

/// Entry point from `main`: build the context the command needs, then run it
pub async fn run(command: Commands, cwd: PathBuf, quiet: bool) -> GroveResult<RunStatus> {
    let cwd = Utf8PathBuf::from_path_buf(cwd).map_err(|path| GroveError::ConfigValidation {
        field: "directory".to_string(),
        reason: format!("{} is not valid UTF-8", path.display()),
    })?;
    let output = OutputHandler::new(quiet);
    let loader = SettingsLoader::new();

    if command.capability() == Capability::Global {
        let settings = loader
            .load(None, &SettingsLayer::collect_env_vars(), &SettingsLayer::default())
            .await?;
        if let Commands::Cache(command) = command {
            return cache::execute(command, &settings, &output).await;
        }
    }

    let ctx = ProjectContext::load(&cwd, &loader, &command.settings_layer(), output).await?;
    dispatch(command, &ctx).await
}

/// Dispatch a project command to its handler
pub async fn dispatch(command: Commands, ctx: &ProjectContext) -> GroveResult<RunStatus> {
    match command {
        Commands::Install(args) => {
            info!(sync = args.sync, dry_run = args.dry_run, check = args.check, "install");
            let install_ctx = InstallContext::new(ctx)?;
            install::execute(args, ctx, &install_ctx).await
        },
        Commands::Update(args) => {
            info!(packages = ?args.packages, lock_only = args.lock_only, "update");
            let install_ctx = InstallContext::new(ctx)?;
            update::execute(args, ctx, &install_ctx).await
        },
        Commands::Lock(args) => {
            info!(no_update = args.no_update, check = args.check, "lock");
            let resolver = ResolverContext::new(ctx)?;
            lock::execute(args, ctx, &resolver).await
        },
        Commands::Add(args) => {
            info!(packages = ?args.packages, dev = args.dev, "add");
            let install_ctx = InstallContext::new(ctx)?;
            add::execute(args, ctx, &install_ctx).await
        },
        Commands::Remove(args) => {
            info!(packages = ?args.packages, dev = args.dev, "remove");
            let install_ctx = InstallContext::new(ctx)?;
            remove::execute(args, ctx, &install_ctx).await
        },
        Commands::Show(args) => {
            info!(package = ?args.package, tree = args.tree, outdated = args.outdated, "show");
            let resolver = ResolverContext::new(ctx)?;
            show::execute(args, ctx, &resolver).await
        },
        Commands::Export(args) => {
            info!(output = ?args.output, "export");
            export::execute(args, ctx).await
        },
        Commands::Check(args) => {
            info!("check");
            check::execute(args, ctx).await
        },
        Commands::Cache(command) => cache::execute(command, &ctx.settings, &ctx.output).await,
    }
}

/// Resolve `root`, preferring the given versions
pub async fn resolve(
    ctx: &ProjectContext,
    pool: &Pool,
    root: &RootRequirements,
    preferences: BTreeMap<PackageName, Version>,
) -> GroveResult<ResolvedGraph> {
    ctx.output.step("Resolving dependencies");
    let options = ResolverOptions {
        preferences,
        ..ResolverOptions::default()
    };
    let graph = Resolver::new(pool, options).resolve(root).await?;
    info!(packages = graph.package_count(), "resolved");
    Ok(graph)
}

/// The lock for a resolution of `root`, not yet written
pub fn lock_for(graph: &ResolvedGraph, root: &RootRequirements) -> LockFile {
    LockFile::from_graph(graph, content_hash(root))
}

/// Write `lock` and print how it differs from `previous`
pub fn write_lock(ctx: &ProjectContext, previous: Option<&LockFile>, lock: &LockFile) -> GroveResult<()> {
    print_lock_changes(&ctx.output, previous, lock);
    ctx.lock.write_lock(lock)?;
    ctx.output.success(&format!("Wrote {} ({} packages)", ctx.lock.path(), lock.packages.len()));
    Ok(())
}

/// Version changes between two locks, in name order
pub fn lock_changes(previous: Option<&LockFile>, next: &LockFile) -> Vec<String> {
    let before: BTreeMap<&PackageName, &Version> = previous
        .map(|lock| lock.packages.iter().map(|e| (&e.name, &e.version)).collect())
        .unwrap_or_default();
    let after: BTreeMap<&PackageName, &Version> = next.packages.iter().map(|e| (&e.name, &e.version)).collect();

    let mut changes = Vec::new();
    for (name, version) in &after {
        match before.get(name) {
            None => changes.push(format!("+ {} {}", name, version)),
            Some(old) if old != version => changes.push(format!("~ {} {} -> {}", name, old, version)),
            Some(_) => {},
        }
    }
    for (name, version) in &before {
        if !after.contains_key(name) {
            changes.push(format!("- {} {}", name, version));
        }
    }
    changes.sort_by(|a, b| a[2..].cmp(&b[2..]));
    changes
}

fn print_lock_changes(output: &OutputHandler, previous: Option<&LockFile>, next: &LockFile) {
    for change in lock_changes(previous, next) {
        output.info(&format!("  {}", change));
    }
}

/// Run the installer over `graph` and print the outcome table
pub async fn install_graph(
    ctx: &ProjectContext,
    install_ctx: &InstallContext,
    graph: &ResolvedGraph,
    options: &InstallOptions,
) -> GroveResult<RunStatus> {
    ctx.output.step(if options.dry_run {
        "Planning installation"
    } else {
        "Installing packages"
    });
    let report = install_ctx.installer().install(graph, options).await?;
    ctx.output.report(&report);
    Ok(report.status())
}

/// Closest of `candidates` to `input`, if any is near enough
pub fn suggest_similar<'a>(input: &str, candidates: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
    candidates
        .into_iter()
        .map(|candidate| (edit_distance(input, candidate), candidate))
        .filter(|(distance, _)| *distance <= 2)
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, candidate)| candidate)
}

/// Levenshtein distance
fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for i in 1..=a.len() {
        current[0] = i;
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            current[j] = (previous[j] + 1).min(current[j - 1] + 1).min(previous[j - 1] + cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

/// `PackageNotFound` for `name`, with a hint when one of `known` is close
pub fn unknown_package<'a>(output: &OutputHandler, name: &str, known: impl IntoIterator<Item = &'a str>) -> GroveError {
    if let Some(similar) = suggest_similar(name, known) {
        output.info(&format!("Did you mean '{}'?", similar));
    }
    GroveError::PackageNotFound {
        name: name.to_string(),
    }
}
