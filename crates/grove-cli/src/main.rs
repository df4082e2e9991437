//! # grove
//!
//! Command line entry point of the Grove dependency manager.
//!
//! Parses the command line, sets up logging, builds the context the chosen
//! command needs and maps the outcome to a process exit code.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use grove_core::error::GroveError;
use grove_installer::RunStatus;

mod commands;
mod output;

use commands::{add, cache, check, export, install, lock, remove, show, update};
use output::errors::ErrorFormatter;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (built ",
    env!("GROVE_BUILD_DATE"),
    " with ",
    env!("GROVE_RUSTC_VERSION"),
    ")"
);

/// Dependency manager with reproducible lock files
#[derive(Debug, Parser)]
#[command(name = "grove", version, long_version = LONG_VERSION, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// More output; repeat for more detail
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only print errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Run as if grove was started in DIR
    #[arg(long, global = true, value_name = "DIR")]
    pub directory: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Install the locked dependencies, locking first if needed
    Install(install::InstallArgs),
    /// Re-resolve dependencies and update the lock file
    Update(update::UpdateArgs),
    /// Resolve dependencies and write grove.lock
    Lock(lock::LockArgs),
    /// Add dependencies to grove.toml
    Add(add::AddArgs),
    /// Remove dependencies from grove.toml
    Remove(remove::RemoveArgs),
    /// Show locked packages
    Show(show::ShowArgs),
    /// Export the lock file as a requirements list
    Export(export::ExportArgs),
    /// Validate grove.toml and grove.lock
    Check(check::CheckArgs),
    /// Inspect or clear the artifact cache
    #[command(subcommand)]
    Cache(cache::CacheCommand),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);
    setup_panic_handler();

    debug!("starting grove v{}", env!("CARGO_PKG_VERSION"));

    let result = run_cli(cli);
    if let Err(error) = &result {
        eprint!("{}", ErrorFormatter::new().format_error(error));
    }
    ExitCode::from(exit_code(&result))
}

fn run_cli(cli: Cli) -> Result<RunStatus, GroveError> {
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| GroveError::io("Failed to create async runtime".to_string(), e))?;

    let cwd = match cli.directory {
        Some(dir) => dir,
        None => std::env::current_dir().map_err(|e| GroveError::io("Failed to get current directory".to_string(), e))?,
    };

    runtime.block_on(commands::run(cli.command, cwd, cli.quiet))
}

/// Process exit code for a command result
fn exit_code(result: &Result<RunStatus, GroveError>) -> u8 {
    match result {
        Ok(RunStatus::Success) => 0,
        Ok(RunStatus::PartialFailure) => 1,
        Err(GroveError::ResolutionFailure { .. }) => 2,
        Err(GroveError::LockStale { .. }) => 3,
        Err(_) => 1,
    }
}

/// `RUST_LOG` wins over the verbosity flags
fn log_filter(verbose: u8, quiet: bool) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };
    let crates = [
        "grove",
        "grove_core",
        "grove_config",
        "grove_registry",
        "grove_resolver",
        "grove_lock",
        "grove_installer",
        "grove_cache",
    ];
    let directives: Vec<String> = crates.iter().map(|name| format!("{}={}", name, level)).collect();
    EnvFilter::new(directives.join(","))
}

fn setup_logging(verbose: u8, quiet: bool) {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(verbose, quiet))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|panic_info| {
        error!("grove panicked: {}", panic_info);
        eprintln!("grove crashed! This is a bug.");
        eprintln!("Please report it at: https://github.com/grove-pm/grove/issues");
        eprintln!("Error: {}", panic_info);
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::try_parse_from(["grove", "-vv", "--directory", "/tmp/app", "install", "--sync"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.directory, Some(PathBuf::from("/tmp/app")));
        assert!(matches!(cli.command, Commands::Install(ref args) if args.sync));

        assert!(Cli::try_parse_from(["grove", "-q", "-v", "lock"]).is_err());
    }

    #[test]
    fn test_add_arguments() {
        let cli = Cli::try_parse_from(["grove", "add", "requests@^2.31", "flask", "--dev"]).unwrap();
        match cli.command {
            Commands::Add(args) => {
                assert_eq!(args.packages, vec!["requests@^2.31", "flask"]);
                assert!(args.dev);
            },
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(&Ok(RunStatus::Success)), 0);
        assert_eq!(exit_code(&Ok(RunStatus::PartialFailure)), 1);
        assert_eq!(
            exit_code(&Err(GroveError::ResolutionFailure {
                report: "no versions of a match".to_string()
            })),
            2
        );
        assert_eq!(
            exit_code(&Err(GroveError::LockStale {
                expected: "sha256:a".to_string(),
                found: "sha256:b".to_string()
            })),
            3
        );
        assert_eq!(
            exit_code(&Err(GroveError::LockNotFound {
                path: "grove.lock".to_string()
            })),
            1
        );
    }
}
