//! Terminal output formatting.
//!
//! Status messages go to stderr so that command data (`show`, `export`)
//! written to stdout stays pipeable.

pub mod colors;
pub mod errors;

use grove_installer::{InstallReport, Outcome};

/// Output handler for consistent terminal formatting
pub struct OutputHandler {
    colors: colors::ColorSupport,
    quiet: bool,
}

impl OutputHandler {
    pub fn new(quiet: bool) -> Self {
        Self {
            colors: colors::ColorSupport::detect(),
            quiet,
        }
    }

    /// Handler without colors, for tests
    pub fn plain(quiet: bool) -> Self {
        Self {
            colors: colors::ColorSupport::disabled(),
            quiet,
        }
    }

    pub fn info(&self, message: &str) {
        if !self.quiet {
            eprintln!("{}", self.colors.dim(message));
        }
    }

    pub fn success(&self, message: &str) {
        if !self.quiet {
            eprintln!("{} {}", self.colors.green("✓"), message);
        }
    }

    pub fn warn(&self, message: &str) {
        if !self.quiet {
            eprintln!("{} {}", self.colors.yellow("⚠"), message);
        }
    }

    /// Errors are printed even when quiet
    pub fn error(&self, message: &str) {
        eprintln!("{} {}", self.colors.red("✗"), message);
    }

    /// Progress step of a command
    pub fn step(&self, message: &str) {
        if !self.quiet {
            eprintln!("{} {}", self.colors.bold("::"), message);
        }
    }

    /// Command data on stdout
    pub fn data(&self, line: &str) {
        println!("{}", line);
    }

    /// Per-package outcomes of an installer run, then the summary
    pub fn report(&self, report: &InstallReport) {
        if report.dry_run {
            for operation in &report.operations {
                self.info(&format!("  would {}", operation));
            }
            self.info(&report.summary());
            return;
        }

        for operation in &report.operations {
            let Some(outcome) = report.outcomes.get(operation.name()) else {
                continue;
            };
            match outcome {
                Outcome::Installed | Outcome::Updated | Outcome::Removed => {
                    self.success(&format!("{}", operation));
                },
                Outcome::Failed { kind, message } => {
                    self.error(&format!("{}: {} failed: {}", operation, kind, message));
                },
                Outcome::SkippedDueToDependency { dependency } => {
                    self.warn(&format!("{}: skipped, {} failed", operation, dependency));
                },
                Outcome::Cancelled => self.warn(&format!("{}: cancelled", operation)),
                Outcome::Deferred => self.warn(&format!("{}: deferred", operation)),
            }
        }

        if report.is_success() {
            self.success(&report.summary());
        } else {
            self.error(&report.summary());
        }
    }
}

impl Default for OutputHandler {
    fn default() -> Self {
        Self::new(false)
    }
}
