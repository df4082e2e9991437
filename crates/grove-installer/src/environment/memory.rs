//! In-memory environment for tests and benchmarks
//!
//! Applies operations to an in-memory snapshot and records when each one
//! started and finished, so tests can check ordering and concurrency.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use camino::Utf8PathBuf;
use parking_lot::Mutex;

use grove_core::{PackageName, Version};

use super::{EnvironmentHandle, EnvironmentProvider, OperationError, OperationErrorKind, Snapshot};
use crate::operation::{InstalledPackage, Operation};

/// Execution event recorded by `MemoryEnvironment`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Started(String),
    Finished(String),
}

#[derive(Debug, Default)]
pub struct MemoryEnvironment {
    installed: Mutex<Snapshot>,
    failures: BTreeMap<PackageName, OperationErrorKind>,
    latency: BTreeMap<PackageName, Duration>,
    default_latency: Option<Duration>,
    events: Mutex<Vec<Event>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
    unavailable: AtomicBool,
}

impl MemoryEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_installed(self, name: &str, version: &str) -> Self {
        let version: Version = version.parse().unwrap_or_else(|_| Version::new(0, 0, 0));
        self.installed
            .lock()
            .insert(PackageName::new(name), InstalledPackage::new(name, version));
        self
    }

    /// Every operation on `name` fails with `kind`
    pub fn fail(mut self, name: &str, kind: OperationErrorKind) -> Self {
        self.failures.insert(PackageName::new(name), kind);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.default_latency = Some(latency);
        self
    }

    pub fn with_package_latency(mut self, name: &str, latency: Duration) -> Self {
        self.latency.insert(PackageName::new(name), latency);
        self
    }

    /// Make `locate` fail
    pub fn unavailable(self) -> Self {
        self.unavailable.store(true, Ordering::SeqCst);
        self
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Operation descriptions in the order they started
    pub fn started(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                Event::Started(op) => Some(op.clone()),
                Event::Finished(_) => None,
            })
            .collect()
    }

    /// Highest number of operations observed running at once
    pub fn max_concurrency(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    pub fn installed(&self) -> Snapshot {
        self.installed.lock().clone()
    }
}

#[async_trait]
impl EnvironmentProvider for MemoryEnvironment {
    async fn locate(&self) -> Result<EnvironmentHandle, OperationError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(OperationError::unavailable("memory environment is unavailable"));
        }
        Ok(EnvironmentHandle {
            root: Utf8PathBuf::from("memory://"),
        })
    }

    async fn installed_snapshot(&self, _handle: &EnvironmentHandle) -> Result<Snapshot, OperationError> {
        Ok(self.installed())
    }

    async fn execute_operation(&self, _handle: &EnvironmentHandle, operation: &Operation) -> Result<(), OperationError> {
        let label = operation.to_string();
        self.events.lock().push(Event::Started(label.clone()));
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(running, Ordering::SeqCst);

        let latency = self.latency.get(operation.name()).copied().or(self.default_latency);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let result = match self.failures.get(operation.name()) {
            Some(kind) => Err(OperationError::new(*kind, format!("injected failure for {}", operation.name()))),
            None => {
                let mut installed = self.installed.lock();
                match operation {
                    Operation::Install(target) | Operation::Update { to: target, .. } => {
                        installed.insert(target.name().clone(), InstalledPackage::of(target));
                    },
                    Operation::Remove(package) => {
                        installed.remove(&package.name);
                    },
                }
                Ok(())
            },
        };

        self.running.fetch_sub(1, Ordering::SeqCst);
        self.events.lock().push(Event::Finished(label));
        result
    }
}
