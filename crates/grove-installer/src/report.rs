//! Per-package outcomes of an installer run

use std::collections::BTreeMap;
use std::fmt;

use parking_lot::Mutex;

use grove_core::PackageName;

use crate::environment::OperationErrorKind;
use crate::operation::Operation;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Installed,
    Updated,
    Removed,
    Failed { kind: OperationErrorKind, message: String },
    /// A dependency of the package failed or was skipped itself
    SkippedDueToDependency { dependency: PackageName },
    /// Not started after a fatal error
    Cancelled,
    /// A remove held back because an install or update failed
    Deferred,
}

impl Outcome {
    /// Outcome of a successful `operation`
    pub fn success_of(operation: &Operation) -> Self {
        match operation {
            Operation::Install(_) => Outcome::Installed,
            Operation::Update { .. } => Outcome::Updated,
            Operation::Remove(_) => Outcome::Removed,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Installed | Outcome::Updated | Outcome::Removed)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed { .. })
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Installed => write!(f, "installed"),
            Outcome::Updated => write!(f, "updated"),
            Outcome::Removed => write!(f, "removed"),
            Outcome::Failed { kind, message } => write!(f, "failed ({}): {}", kind, message),
            Outcome::SkippedDueToDependency { dependency } => write!(f, "skipped: {} failed", dependency),
            Outcome::Cancelled => write!(f, "cancelled"),
            Outcome::Deferred => write!(f, "deferred"),
        }
    }
}

/// Outcome table shared by the scheduler and its workers
#[derive(Debug, Default)]
pub struct OutcomeTable {
    outcomes: Mutex<BTreeMap<PackageName, Outcome>>,
}

impl OutcomeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, name: &PackageName, outcome: Outcome) {
        self.outcomes.lock().insert(name.clone(), outcome);
    }

    pub fn get(&self, name: &PackageName) -> Option<Outcome> {
        self.outcomes.lock().get(name).cloned()
    }

    pub fn into_inner(self) -> BTreeMap<PackageName, Outcome> {
        self.outcomes.into_inner()
    }

    pub fn snapshot(&self) -> BTreeMap<PackageName, Outcome> {
        self.outcomes.lock().clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    PartialFailure,
}

/// Result of one installer run
#[derive(Debug, Clone, Default)]
pub struct InstallReport {
    /// Planned operations, in execution order
    pub operations: Vec<Operation>,
    pub outcomes: BTreeMap<PackageName, Outcome>,
    pub dry_run: bool,
}

impl InstallReport {
    pub fn status(&self) -> RunStatus {
        if self.outcomes.values().any(Outcome::is_failure) {
            RunStatus::PartialFailure
        } else {
            RunStatus::Success
        }
    }

    pub fn is_success(&self) -> bool {
        self.status() == RunStatus::Success
    }

    pub fn failures(&self) -> impl Iterator<Item = (&PackageName, &Outcome)> {
        self.outcomes.iter().filter(|(_, outcome)| outcome.is_failure())
    }

    fn count(&self, predicate: impl Fn(&Outcome) -> bool) -> usize {
        self.outcomes.values().filter(|o| predicate(o)).count()
    }

    /// One-line summary, e.g. `2 installed, 1 updated, 0 removed`
    pub fn summary(&self) -> String {
        if self.dry_run {
            let (installs, updates, removes) = self.operations.iter().fold((0, 0, 0), |(i, u, r), op| match op {
                Operation::Install(_) => (i + 1, u, r),
                Operation::Update { .. } => (i, u + 1, r),
                Operation::Remove(_) => (i, u, r + 1),
            });
            return format!(
                "would install {}, update {}, remove {}",
                installs, updates, removes
            );
        }

        let mut summary = format!(
            "{} installed, {} updated, {} removed",
            self.count(|o| *o == Outcome::Installed),
            self.count(|o| *o == Outcome::Updated),
            self.count(|o| *o == Outcome::Removed),
        );
        let failed = self.count(Outcome::is_failure);
        let skipped = self.count(|o| matches!(o, Outcome::SkippedDueToDependency { .. }));
        let cancelled = self.count(|o| *o == Outcome::Cancelled);
        let deferred = self.count(|o| *o == Outcome::Deferred);
        for (count, label) in [(failed, "failed"), (skipped, "skipped"), (cancelled, "cancelled"), (deferred, "deferred")] {
            if count > 0 {
                summary.push_str(&format!(", {} {}", count, label));
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_table_is_shared_across_threads() {
        let table = Arc::new(OutcomeTable::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let table = table.clone();
                std::thread::spawn(move || table.record(&PackageName::new(&format!("pkg{}", i)), Outcome::Installed))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(table.snapshot().len(), 8);
    }

    #[test]
    fn test_status_and_summary() {
        let mut report = InstallReport::default();
        report.outcomes.insert(PackageName::new("a"), Outcome::Installed);
        report.outcomes.insert(PackageName::new("b"), Outcome::Updated);
        assert_eq!(report.status(), RunStatus::Success);
        assert_eq!(report.summary(), "1 installed, 1 updated, 0 removed");

        report.outcomes.insert(
            PackageName::new("c"),
            Outcome::Failed {
                kind: OperationErrorKind::Download,
                message: "timeout".to_string(),
            },
        );
        report.outcomes.insert(
            PackageName::new("d"),
            Outcome::SkippedDueToDependency {
                dependency: PackageName::new("c"),
            },
        );
        report.outcomes.insert(PackageName::new("e"), Outcome::Deferred);
        assert_eq!(report.status(), RunStatus::PartialFailure);
        assert_eq!(
            report.summary(),
            "1 installed, 1 updated, 0 removed, 1 failed, 1 skipped, 1 deferred"
        );
        assert_eq!(report.failures().count(), 1);
    }
}
