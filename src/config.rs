//! Runtime configuration for the box store and the VM build.
//!
//! Values are layered: built-in defaults, an optional JSON config file,
//! environment overrides, then command-line flags. The resolved [`Config`] is
//! passed explicitly to every component; nothing reads globals after startup.
use crate::error::{BoxError, IoContext, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_INSTALL_DIR: &str = "/opt/vagrant_boxes";
pub const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost/boxes";
pub const DEFAULT_VAGRANT_COMMAND: &str = "vagrant";
pub const DEFAULT_PROVIDER: &str = "virtualbox";

pub const CONFIG_ENV: &str = "BOXMAN_CONFIG";
pub const INSTALL_DIR_ENV: &str = "BOXMAN_INSTALL_DIR";
pub const PUBLIC_URL_ENV: &str = "BOXMAN_PUBLIC_URL";

/// Resolved settings for one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Root holding `boxes/` and `build_templates/`.
    pub install_dir: PathBuf,
    /// URL prefix under which `boxes/` is served; used for manifest `url` fields.
    pub public_base_url: String,
    /// Local scratch area for per-build working directories.
    pub build_root: PathBuf,
    /// Vagrant invocation, split shell-style (`sudo -u builder vagrant`).
    pub vagrant_command: String,
    /// Provider name recorded in the manifest's `providers` entries.
    pub provider: String,
    /// Upper bound for each vagrant invocation; `None` waits indefinitely.
    pub build_timeout_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            install_dir: PathBuf::from(DEFAULT_INSTALL_DIR),
            public_base_url: DEFAULT_PUBLIC_BASE_URL.to_string(),
            build_root: env::temp_dir(),
            vagrant_command: DEFAULT_VAGRANT_COMMAND.to_string(),
            provider: DEFAULT_PROVIDER.to_string(),
            build_timeout_secs: None,
        }
    }
}

/// Partial config as written in a config file; every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub install_dir: Option<PathBuf>,
    #[serde(default)]
    pub public_base_url: Option<String>,
    #[serde(default)]
    pub build_root: Option<PathBuf>,
    #[serde(default)]
    pub vagrant_command: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub build_timeout_secs: Option<u64>,
}

/// Command-line overrides applied last.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub config_path: Option<PathBuf>,
    pub install_dir: Option<PathBuf>,
    pub public_base_url: Option<String>,
}

impl Config {
    /// Resolve the effective config for this process.
    pub fn resolve(overrides: &ConfigOverrides) -> Result<Self> {
        let mut config = Config::default();

        if let Some(path) = config_file_path(overrides.config_path.as_deref()) {
            tracing::debug!(path = %path.display(), "loading config file");
            config.apply_file(load_config_file(&path)?);
        }

        if let Some(dir) = env::var_os(INSTALL_DIR_ENV).filter(|value| !value.is_empty()) {
            config.install_dir = PathBuf::from(dir);
        }
        if let Ok(url) = env::var(PUBLIC_URL_ENV) {
            if !url.is_empty() {
                config.public_base_url = url;
            }
        }

        if let Some(dir) = &overrides.install_dir {
            config.install_dir = dir.clone();
        }
        if let Some(url) = &overrides.public_base_url {
            config.public_base_url = url.clone();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn apply_file(&mut self, file: ConfigFile) {
        if let Some(install_dir) = file.install_dir {
            self.install_dir = install_dir;
        }
        if let Some(public_base_url) = file.public_base_url {
            self.public_base_url = public_base_url;
        }
        if let Some(build_root) = file.build_root {
            self.build_root = build_root;
        }
        if let Some(vagrant_command) = file.vagrant_command {
            self.vagrant_command = vagrant_command;
        }
        if let Some(provider) = file.provider {
            self.provider = provider;
        }
        if file.build_timeout_secs.is_some() {
            self.build_timeout_secs = file.build_timeout_secs;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.install_dir.is_absolute() {
            return Err(BoxError::Config(format!(
                "install_dir must be an absolute path (got {})",
                self.install_dir.display()
            )));
        }
        if !self.build_root.is_absolute() {
            return Err(BoxError::Config(format!(
                "build_root must be an absolute path (got {})",
                self.build_root.display()
            )));
        }
        let url = self.public_base_url.trim();
        if url.is_empty() {
            return Err(BoxError::Config("public_base_url must be non-empty".into()));
        }
        if !["http://", "https://", "file://"]
            .iter()
            .any(|scheme| url.starts_with(scheme))
        {
            return Err(BoxError::Config(format!(
                "public_base_url must use http, https or file (got {url:?})"
            )));
        }
        if self.vagrant_argv()?.is_empty() {
            return Err(BoxError::Config("vagrant_command must be non-empty".into()));
        }
        if self.provider.trim().is_empty() {
            return Err(BoxError::Config("provider must be non-empty".into()));
        }
        if self.build_timeout_secs == Some(0) {
            return Err(BoxError::Config(
                "build_timeout_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Split `vagrant_command` into program and leading arguments.
    pub fn vagrant_argv(&self) -> Result<Vec<String>> {
        shell_words::split(&self.vagrant_command).map_err(|err| {
            BoxError::Config(format!(
                "parse vagrant_command {:?}: {err}",
                self.vagrant_command
            ))
        })
    }
}

fn config_file_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(path) = env::var_os(CONFIG_ENV).filter(|value| !value.is_empty()) {
        return Some(PathBuf::from(path));
    }
    let default = dirs::config_dir()?.join("boxman").join("config.json");
    default.is_file().then_some(default)
}

/// Read a JSON config file; a missing explicit file is an error.
pub fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let bytes = fs::read(path).io_context(|| format!("read config {}", path.display()))?;
    serde_json::from_slice(&bytes)
        .map_err(|err| BoxError::Config(format!("parse config {}: {err}", path.display())))
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
