//! Settings layering: defaults, global config file, project `[installer]`
//! table, `GROVE_*` environment variables, then command-line flags

use std::collections::HashMap;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use tracing::debug;

use grove_core::error::GroveError;

use crate::manifest::InstallerTable;
use crate::ConfigResult;

pub const DEFAULT_INDEX_URL: &str = "https://index.grove-pm.org/packages";
pub const DEFAULT_ENV_DIR: &str = ".grove/env";
pub const DEFAULT_MAX_WORKERS: usize = 8;
const GLOBAL_CONFIG_FILE: &str = "config.toml";

/// Effective settings for one invocation
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub index_url: String,
    pub cache_dir: Utf8PathBuf,
    /// Environment directory; relative paths are resolved against the
    /// project root
    pub env_dir: Utf8PathBuf,
    pub installer: InstallerSettings,
    pub network: NetworkSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallerSettings {
    pub parallel: bool,
    pub max_workers: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkSettings {
    pub retries: u32,
    pub timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        let cache_dir = dirs::cache_dir()
            .and_then(|dir| Utf8PathBuf::from_path_buf(dir).ok())
            .map(|dir| dir.join("grove"))
            .unwrap_or_else(|| Utf8PathBuf::from(".grove/cache"));
        Self {
            index_url: DEFAULT_INDEX_URL.to_string(),
            cache_dir,
            env_dir: Utf8PathBuf::from(DEFAULT_ENV_DIR),
            installer: InstallerSettings {
                parallel: false,
                max_workers: DEFAULT_MAX_WORKERS,
            },
            network: NetworkSettings {
                retries: 3,
                timeout_secs: 30,
            },
        }
    }
}

impl Settings {
    /// Environment directory for a project rooted at `project_root`
    pub fn env_dir_in(&self, project_root: &Utf8Path) -> Utf8PathBuf {
        if self.env_dir.is_absolute() {
            self.env_dir.clone()
        } else {
            project_root.join(&self.env_dir)
        }
    }

    /// Apply `layers` in order over the defaults; later layers win
    pub fn layered<'a>(layers: impl IntoIterator<Item = &'a SettingsLayer>) -> ConfigResult<Self> {
        let mut settings = Settings::default();
        for layer in layers {
            layer.apply(&mut settings);
        }
        if settings.installer.max_workers == 0 {
            return Err(GroveError::ConfigValidation {
                field: "installer.max-workers".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(settings)
    }
}

/// One source of settings; unset fields leave lower layers alone.
///
/// Also the format of the global config file:
///
/// ```toml
/// index-url = "https://index.example.com"
/// cache-dir = "/var/cache/grove"
///
/// [installer]
/// parallel = true
/// max-workers = 4
///
/// [network]
/// retries = 5
/// timeout = 60
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SettingsLayer {
    pub index_url: Option<String>,
    pub cache_dir: Option<Utf8PathBuf>,
    pub env_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub installer: InstallerLayer,
    #[serde(default)]
    pub network: NetworkLayer,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct InstallerLayer {
    pub parallel: Option<bool>,
    pub max_workers: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkLayer {
    pub retries: Option<u32>,
    /// Seconds
    pub timeout: Option<u64>,
}

impl SettingsLayer {
    fn apply(&self, settings: &mut Settings) {
        if let Some(url) = &self.index_url {
            settings.index_url = url.clone();
        }
        if let Some(dir) = &self.cache_dir {
            settings.cache_dir = dir.clone();
        }
        if let Some(dir) = &self.env_dir {
            settings.env_dir = dir.clone();
        }
        if let Some(parallel) = self.installer.parallel {
            settings.installer.parallel = parallel;
        }
        if let Some(workers) = self.installer.max_workers {
            settings.installer.max_workers = workers;
        }
        if let Some(retries) = self.network.retries {
            settings.network.retries = retries;
        }
        if let Some(timeout) = self.network.timeout {
            settings.network.timeout_secs = timeout;
        }
    }

    /// Parse a global config file
    pub fn parse(content: &str, file: &str) -> ConfigResult<Self> {
        toml::from_str(content)
            .map_err(|e| GroveError::toml_parse(file, content, e.message(), e.span().map(|span| span.start)))
    }

    /// The project's `[installer]` table
    pub fn from_project(table: &InstallerTable) -> Self {
        Self {
            env_dir: table.env_dir.as_ref().map(Utf8PathBuf::from),
            installer: InstallerLayer {
                parallel: table.parallel,
                max_workers: table.max_workers,
            },
            ..Self::default()
        }
    }

    /// Overrides from `GROVE_*` variables
    pub fn from_env(vars: &HashMap<String, String>) -> ConfigResult<Self> {
        let mut layer = Self::default();
        for (key, value) in vars {
            match key.as_str() {
                "GROVE_INDEX_URL" => layer.index_url = Some(value.clone()),
                "GROVE_CACHE_DIR" => layer.cache_dir = Some(Utf8PathBuf::from(value)),
                "GROVE_ENV_DIR" => layer.env_dir = Some(Utf8PathBuf::from(value)),
                "GROVE_INSTALLER_PARALLEL" => layer.installer.parallel = Some(parse_bool(key, value)?),
                "GROVE_INSTALLER_MAX_WORKERS" => {
                    layer.installer.max_workers = Some(value.trim().parse().map_err(|_| GroveError::ConfigValidation {
                        field: key.clone(),
                        reason: format!("'{}' is not a positive number", value),
                    })?);
                },
                _ => {
                    // Unknown variable, ignore
                },
            }
        }
        Ok(layer)
    }

    /// Collect `GROVE_*` variables from the process environment
    pub fn collect_env_vars() -> HashMap<String, String> {
        std::env::vars().filter(|(key, _)| key.starts_with("GROVE_")).collect()
    }
}

fn parse_bool(key: &str, value: &str) -> ConfigResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(GroveError::ConfigValidation {
            field: key.to_string(),
            reason: format!("'{}' is not a boolean", value),
        }),
    }
}

/// Loads the global config file
#[derive(Debug, Clone)]
pub struct SettingsLoader {
    global_path: Option<Utf8PathBuf>,
}

impl SettingsLoader {
    /// Loader for `~/.config/grove/config.toml` (or the platform equivalent)
    pub fn new() -> Self {
        let global_path = dirs::config_dir()
            .and_then(|dir| Utf8PathBuf::from_path_buf(dir).ok())
            .map(|dir| dir.join("grove").join(GLOBAL_CONFIG_FILE));
        Self { global_path }
    }

    pub fn with_global_path(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            global_path: Some(path.into()),
        }
    }

    pub fn global_path(&self) -> Option<&Utf8Path> {
        self.global_path.as_deref()
    }

    /// The global layer; empty when the file does not exist
    pub async fn load_global(&self) -> ConfigResult<SettingsLayer> {
        let Some(path) = &self.global_path else {
            return Ok(SettingsLayer::default());
        };
        match tokio::fs::read_to_string(path).await {
            Ok(content) => {
                debug!(%path, "loaded global settings");
                SettingsLayer::parse(&content, path.as_str())
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SettingsLayer::default()),
            Err(e) => Err(GroveError::io(format!("Failed to read {}", path), e)),
        }
    }

    /// Resolve all layers for a project
    pub async fn load(
        &self,
        project: Option<&InstallerTable>,
        env_vars: &HashMap<String, String>,
        cli: &SettingsLayer,
    ) -> ConfigResult<Settings> {
        let global = self.load_global().await?;
        let project = project.map(SettingsLayer::from_project).unwrap_or_default();
        let env = SettingsLayer::from_env(env_vars)?;
        Settings::layered([&global, &project, &env, cli])
    }
}

impl Default for SettingsLoader {
    fn default() -> Self {
        Self::new()
    }
}
