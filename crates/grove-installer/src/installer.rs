//! Installer entry point: locate, snapshot, plan, execute

use std::sync::Arc;

use tracing::{info, instrument};

use grove_core::error::GroveError;
use grove_resolver::ResolvedGraph;

use crate::environment::{EnvironmentHandle, EnvironmentProvider, OperationError};
use crate::executor::{Executor, ExecutorMode};
use crate::plan::{InstallMode, Plan, Selection};
use crate::report::InstallReport;
use crate::InstallResult;

#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    pub mode: InstallMode,
    pub selection: Selection,
    /// Plan only; nothing is executed
    pub dry_run: bool,
}

pub struct Installer {
    provider: Arc<dyn EnvironmentProvider>,
    executor_mode: ExecutorMode,
}

impl Installer {
    pub fn new(provider: Arc<dyn EnvironmentProvider>, executor_mode: ExecutorMode) -> Self {
        Self {
            provider,
            executor_mode,
        }
    }

    /// Locate the environment and compute the operations that bring it to
    /// the selected part of `graph`
    pub async fn plan(&self, graph: &ResolvedGraph, options: &InstallOptions) -> InstallResult<(EnvironmentHandle, Plan)> {
        let handle = self.provider.locate().await.map_err(unavailable)?;
        let snapshot = self.provider.installed_snapshot(&handle).await.map_err(unavailable)?;
        let plan = Plan::build(graph, &snapshot, &options.selection, options.mode)?;

        let (installs, updates, removes) = plan.counts();
        info!(
            installs,
            updates,
            removes,
            unchanged = plan.unchanged(),
            "planned {} operations",
            plan.len()
        );
        Ok((handle, plan))
    }

    /// Bring the environment in line with `graph`
    ///
    /// Per-package failures are reported in the returned report; only a
    /// failure to reach the environment at all is an error.
    #[instrument(skip_all, fields(mode = ?options.mode, dry_run = options.dry_run))]
    pub async fn install(&self, graph: &ResolvedGraph, options: &InstallOptions) -> InstallResult<InstallReport> {
        let (handle, plan) = self.plan(graph, options).await?;

        if options.dry_run {
            return Ok(InstallReport {
                operations: plan.operations().to_vec(),
                dry_run: true,
                ..Default::default()
            });
        }

        let executor = Executor::new(self.provider.clone(), self.executor_mode);
        Ok(executor.execute(&handle, &plan).await)
    }
}

fn unavailable(error: OperationError) -> GroveError {
    GroveError::EnvironmentUnavailable { message: error.message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grove_core::{Constraint, Dependency, PackageCandidate, PackageId, PackageName, RootRequirements};
    use grove_lock::{content_hash, LockFile};
    use grove_resolver::{ResolvedEdge, ResolvedNode};

    use crate::environment::MemoryEnvironment;
    use crate::report::Outcome;

    fn id(name: &str) -> PackageId {
        PackageId::registry(name)
    }

    fn root() -> RootRequirements {
        RootRequirements::new("app")
            .with_dependency(Dependency::parse("web", ">=1.0").unwrap())
            .with_dependency(Dependency::parse("pytest", "*").unwrap().dev())
    }

    /// app -> web -> idna; dev: pytest
    fn graph() -> ResolvedGraph {
        let mut graph = ResolvedGraph::new(root());
        for (name, version) in [("web", "1.2.0"), ("idna", "3.4.0"), ("pytest", "7.0.0")] {
            graph.add_package(ResolvedNode::new(Arc::new(PackageCandidate::new(
                id(name),
                version.parse().unwrap(),
            ))));
        }
        graph
            .add_dependency(&id("web"), &id("idna"), ResolvedEdge::new(Constraint::any()))
            .unwrap();
        graph
    }

    fn installer(env: &Arc<MemoryEnvironment>, mode: ExecutorMode) -> Installer {
        Installer::new(env.clone(), mode)
    }

    fn names(env: &MemoryEnvironment) -> Vec<String> {
        env.installed().keys().map(PackageName::to_string).collect()
    }

    #[tokio::test]
    async fn test_install_is_idempotent() {
        let env = Arc::new(MemoryEnvironment::new());
        let installer = installer(&env, ExecutorMode::parallel(4));
        let options = InstallOptions::default();

        let first = installer.install(&graph(), &options).await.unwrap();
        assert!(first.is_success());
        assert_eq!(first.summary(), "3 installed, 0 updated, 0 removed");

        let second = installer.install(&graph(), &options).await.unwrap();
        assert!(second.operations.is_empty());
        assert_eq!(env.started().len(), 3);
    }

    #[tokio::test]
    async fn test_sync_removes_extraneous_packages() {
        let env = Arc::new(
            MemoryEnvironment::new()
                .with_installed("pytest", "7.0.0")
                .with_installed("leftover", "0.1.0"),
        );
        let options = InstallOptions {
            mode: InstallMode::Sync,
            selection: Selection::default().without_dev(),
            dry_run: false,
        };

        let report = installer(&env, ExecutorMode::Sequential)
            .install(&graph(), &options)
            .await
            .unwrap();

        assert_eq!(report.outcomes[&PackageName::new("leftover")], Outcome::Removed);
        assert_eq!(report.outcomes[&PackageName::new("pytest")], Outcome::Removed);
        assert_eq!(names(&env), vec!["idna", "web"]);
    }

    #[tokio::test]
    async fn test_additive_keeps_extraneous_packages() {
        let env = Arc::new(MemoryEnvironment::new().with_installed("leftover", "0.1.0"));
        installer(&env, ExecutorMode::Sequential)
            .install(&graph(), &InstallOptions::default())
            .await
            .unwrap();

        assert_eq!(names(&env), vec!["idna", "leftover", "pytest", "web"]);
    }

    #[tokio::test]
    async fn test_dry_run_changes_nothing() {
        let env = Arc::new(MemoryEnvironment::new().with_installed("idna", "3.0.0"));
        let options = InstallOptions {
            dry_run: true,
            ..Default::default()
        };

        let report = installer(&env, ExecutorMode::Sequential)
            .install(&graph(), &options)
            .await
            .unwrap();

        assert!(report.dry_run);
        assert_eq!(report.summary(), "would install 2, update 1, remove 0");
        assert!(env.started().is_empty());
        assert_eq!(names(&env), vec!["idna"]);
    }

    #[tokio::test]
    async fn test_unavailable_environment_is_an_error() {
        let env = Arc::new(MemoryEnvironment::new().unavailable());
        let error = installer(&env, ExecutorMode::Sequential)
            .install(&graph(), &InstallOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(error, GroveError::EnvironmentUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_unknown_target_is_an_error() {
        let env = Arc::new(MemoryEnvironment::new());
        let options = InstallOptions {
            selection: Selection::default().with_target("missing"),
            ..Default::default()
        };

        let error = installer(&env, ExecutorMode::Sequential)
            .install(&graph(), &options)
            .await
            .unwrap_err();
        assert!(matches!(error, GroveError::PackageNotFound { .. }));
    }

    #[tokio::test]
    async fn test_installing_from_lock_matches_resolution() {
        let resolved = graph();
        let lock = LockFile::from_graph(&resolved, content_hash(&root()));
        let parsed = LockFile::from_toml(&lock.to_toml().unwrap(), "grove.lock").unwrap();
        let from_lock = parsed.to_graph_view(&root()).unwrap();

        let options = InstallOptions {
            mode: InstallMode::Sync,
            ..Default::default()
        };
        let direct = Arc::new(MemoryEnvironment::new());
        let locked = Arc::new(MemoryEnvironment::new());
        installer(&direct, ExecutorMode::Sequential)
            .install(&resolved, &options)
            .await
            .unwrap();
        installer(&locked, ExecutorMode::parallel(2))
            .install(&from_lock, &options)
            .await
            .unwrap();

        assert_eq!(direct.installed(), locked.installed());
    }
}
