//! Plan execution
//!
//! `Sequential` runs operations one at a time in plan order. `Parallel`
//! keeps up to `max_workers` operations in flight; an operation starts once
//! every operation on its transitive dependencies has succeeded.
//!
//! In both modes a failure marks the operations depending on it as skipped
//! while unrelated operations continue. An `EnvironmentUnavailable` error
//! stops new starts: running operations finish, the rest are cancelled.
//! Removes run after all installs and updates, and only if none failed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::environment::{EnvironmentHandle, EnvironmentProvider, OperationError, OperationErrorKind};
use crate::operation::Operation;
use crate::plan::Plan;
use crate::report::{InstallReport, Outcome, OutcomeTable};

/// Execution strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecutorMode {
    #[default]
    Sequential,
    Parallel { max_workers: usize },
}

impl ExecutorMode {
    pub fn parallel(max_workers: usize) -> Self {
        ExecutorMode::Parallel {
            max_workers: max_workers.max(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Pending,
    Running,
    Succeeded,
    /// Failed or skipped: dependents must not start
    Blocked,
    Finished,
}

/// Scheduling state of one run. Only the scheduler loop touches it.
struct Schedule<'a> {
    plan: &'a Plan,
    states: Vec<State>,
    table: Arc<OutcomeTable>,
    cancelled: Arc<AtomicBool>,
}

impl<'a> Schedule<'a> {
    fn new(plan: &'a Plan) -> Self {
        Self {
            plan,
            states: vec![State::Pending; plan.len()],
            table: Arc::new(OutcomeTable::new()),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    fn operation(&self, index: usize) -> &'a Operation {
        &self.plan.operations()[index]
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Pending installs and updates whose prerequisites all succeeded
    fn ready(&self) -> Vec<usize> {
        (0..self.plan.len())
            .filter(|&i| self.states[i] == State::Pending && !self.operation(i).is_remove())
            .filter(|&i| self.plan.prerequisites(i).iter().all(|&p| self.states[p] == State::Succeeded))
            .collect()
    }

    fn start(&mut self, index: usize) {
        self.states[index] = State::Running;
    }

    /// Record the result of operation `index`
    fn complete(&mut self, index: usize, result: Result<(), OperationError>) {
        let operation = self.operation(index);
        match result {
            Ok(()) => {
                self.states[index] = State::Succeeded;
                debug!(%operation, "operation succeeded");
            },
            Err(error) => {
                warn!(%operation, %error, "operation failed");
                if error.is_fatal() {
                    self.cancelled.store(true, Ordering::SeqCst);
                }
                self.states[index] = State::Blocked;
                self.table.record(
                    operation.name(),
                    Outcome::Failed {
                        kind: error.kind,
                        message: error.message,
                    },
                );
                self.skip_dependents(index);
            },
        }
    }

    fn skip_dependents(&mut self, failed: usize) {
        let dependency = self.operation(failed).name().clone();
        for dependent in self.plan.dependents(failed) {
            if self.states[dependent] == State::Pending {
                self.states[dependent] = State::Blocked;
                self.table.record(
                    self.operation(dependent).name(),
                    Outcome::SkippedDueToDependency {
                        dependency: dependency.clone(),
                    },
                );
            }
        }
    }

    fn any_failed(&self) -> bool {
        self.states.iter().any(|state| *state == State::Blocked)
    }

    /// Removes run only once every install and update succeeded
    fn removes(&mut self) -> Vec<usize> {
        let removes: Vec<usize> = (0..self.plan.len()).filter(|&i| self.operation(i).is_remove()).collect();
        if self.any_failed() || self.is_cancelled() {
            for &index in &removes {
                self.states[index] = State::Finished;
                self.table.record(self.operation(index).name(), Outcome::Deferred);
            }
            if !removes.is_empty() {
                info!(removes = removes.len(), "deferring removes after failed operations");
            }
            return Vec::new();
        }
        removes
    }

    /// Anything still pending after a fatal error
    fn cancel_pending(&mut self) {
        for index in 0..self.plan.len() {
            if self.states[index] == State::Pending {
                self.states[index] = State::Finished;
                self.table.record(self.operation(index).name(), Outcome::Cancelled);
            }
        }
    }

    fn finish(mut self) -> InstallReport {
        self.cancel_pending();
        let operations = self.plan.operations().to_vec();
        let outcomes = match Arc::try_unwrap(self.table) {
            Ok(table) => table.into_inner(),
            Err(shared) => shared.snapshot(),
        };
        InstallReport {
            operations,
            outcomes,
            dry_run: false,
        }
    }
}

pub struct Executor {
    provider: Arc<dyn EnvironmentProvider>,
    mode: ExecutorMode,
}

impl Executor {
    pub fn new(provider: Arc<dyn EnvironmentProvider>, mode: ExecutorMode) -> Self {
        Self { provider, mode }
    }

    pub fn mode(&self) -> ExecutorMode {
        self.mode
    }

    pub async fn execute(&self, handle: &EnvironmentHandle, plan: &Plan) -> InstallReport {
        info!(operations = plan.len(), mode = ?self.mode, "executing plan");
        let mut schedule = Schedule::new(plan);

        match self.mode {
            ExecutorMode::Sequential => {
                let installs: Vec<usize> = (0..plan.len()).filter(|&i| !plan.operations()[i].is_remove()).collect();
                self.run_sequential(handle, &mut schedule, installs).await;
                let removes = schedule.removes();
                self.run_sequential(handle, &mut schedule, removes).await;
            },
            ExecutorMode::Parallel { max_workers } => {
                let semaphore = Arc::new(Semaphore::new(max_workers.max(1)));
                self.run_parallel(handle, &mut schedule, &semaphore, None).await;
                let removes = schedule.removes();
                self.run_parallel(handle, &mut schedule, &semaphore, Some(removes)).await;
            },
        }

        let report = schedule.finish();
        info!(summary = %report.summary(), "execution finished");
        report
    }

    async fn run_sequential(&self, handle: &EnvironmentHandle, schedule: &mut Schedule<'_>, indices: Vec<usize>) {
        for index in indices {
            if schedule.is_cancelled() {
                return;
            }
            if schedule.states[index] != State::Pending {
                continue;
            }
            let operation = schedule.operation(index);
            schedule.start(index);
            let result = self.provider.execute_operation(handle, operation).await;
            if result.is_ok() {
                schedule.table.record(operation.name(), Outcome::success_of(operation));
            }
            schedule.complete(index, result);
        }
    }

    /// Run installs and updates as their prerequisites complete, or the
    /// given removes, which have none
    async fn run_parallel(
        &self,
        handle: &EnvironmentHandle,
        schedule: &mut Schedule<'_>,
        semaphore: &Arc<Semaphore>,
        removes: Option<Vec<usize>>,
    ) {
        let mut remaining_removes = removes;
        let mut tasks: JoinSet<(usize, Result<(), OperationError>)> = JoinSet::new();

        loop {
            if !schedule.is_cancelled() {
                let ready = match remaining_removes.as_mut() {
                    Some(removes) => std::mem::take(removes),
                    None => schedule.ready(),
                };
                let mut ready = ready.into_iter();
                while let Some(index) = ready.next() {
                    let Ok(permit) = semaphore.clone().try_acquire_owned() else {
                        // Put back what could not start
                        if let Some(removes) = remaining_removes.as_mut() {
                            removes.push(index);
                            removes.extend(ready);
                        }
                        break;
                    };

                    schedule.start(index);
                    let operation = schedule.operation(index).clone();
                    let provider = self.provider.clone();
                    let handle = handle.clone();
                    let table = schedule.table.clone();
                    let cancelled = schedule.cancelled.clone();
                    debug!(%operation, "starting operation");
                    tasks.spawn(async move {
                        let _permit = permit;
                        let result = provider.execute_operation(&handle, &operation).await;
                        match &result {
                            Ok(()) => table.record(operation.name(), Outcome::success_of(&operation)),
                            Err(error) if error.is_fatal() => cancelled.store(true, Ordering::SeqCst),
                            Err(_) => {},
                        }
                        (index, result)
                    });
                }
            }

            let Some(joined) = tasks.join_next().await else {
                break;
            };
            match joined {
                Ok((index, result)) => schedule.complete(index, result),
                Err(e) => {
                    warn!(error = %e, "operation worker panicked");
                    schedule.cancelled.store(true, Ordering::SeqCst);
                },
            }
        }

        // Only a panicked worker leaves its operation running
        for index in 0..schedule.plan.len() {
            if schedule.states[index] == State::Running {
                let error = OperationError::new(OperationErrorKind::Install, "operation worker panicked");
                schedule.complete(index, Err(error));
            }
        }
    }
}
