//! `grove cache list` / `grove cache clear`

use clap::Subcommand;

use grove_cache::{format_size, CacheEntry, CasStore};
use grove_config::Settings;
use grove_core::error::GroveResult;
use grove_installer::RunStatus;

use super::{Capability, Command};
use crate::output::OutputHandler;

#[derive(Debug, Clone, Subcommand)]
pub enum CacheCommand {
    /// List cached archives
    List,
    /// Remove every cached archive
    Clear,
}

impl Command for CacheCommand {
    const CAPABILITY: Capability = Capability::Global;
}

pub async fn execute(command: CacheCommand, settings: &Settings, output: &OutputHandler) -> GroveResult<RunStatus> {
    let store = CasStore::new(&settings.cache_dir)?;

    match command {
        CacheCommand::List => {
            let entries = store.entries();
            for line in list_lines(&entries) {
                output.data(&line);
            }
            let total: u64 = entries.iter().map(|entry| entry.size).sum();
            output.info(&format!(
                "{} entries, {} in {}",
                entries.len(),
                format_size(total),
                store.root_path()
            ));
        },
        CacheCommand::Clear => {
            let summary = store.clear()?;
            output.success(&format!(
                "Removed {} entries, freed {}",
                summary.entries_removed,
                summary.format_freed_space()
            ));
        },
    }
    Ok(RunStatus::Success)
}

fn list_lines(entries: &[CacheEntry]) -> Vec<String> {
    entries
        .iter()
        .map(|entry| {
            let hex = entry.hash.to_hex();
            format!("{}  {:>10}  {}", &hex[..12], format_size(entry.size), entry.label)
        })
        .collect()
}
