//! Infrastructure implementation of the `ConfigStore` port, plus secrets
//! from the environment.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::application::ports::ConfigStore;
use crate::domain::config::{Credentials, DejimaConfig};

pub const CONFIG_ENV: &str = "DEJIMA_CONFIG";

/// `~/.dejima`.
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn dejima_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.join(".dejima"))
}

/// Resolve a configured file path: absolute as given, relative against
/// `base`, or `base/default_name` when unset.
#[must_use]
pub fn resolve_path(base: &Path, configured: Option<&str>, default_name: &str) -> PathBuf {
    match configured {
        Some(p) if Path::new(p).is_absolute() => PathBuf::from(p),
        Some(p) => base.join(p),
        None => base.join(default_name),
    }
}

/// `DEJIMA_*` secrets. Unset variables stay `None`.
///
/// # Errors
///
/// Returns an error if a variable is set but not valid unicode.
pub fn load_credentials() -> Result<Credentials> {
    envy::prefixed("DEJIMA_")
        .from_env::<Credentials>()
        .context("reading DEJIMA_* environment")
}

/// YAML file on disk; `DEJIMA_CONFIG` overrides the location.
#[derive(Debug, Default)]
pub struct YamlConfigStore {
    path: Option<PathBuf>,
}

impl YamlConfigStore {
    /// Store pinned to `path`, ignoring the environment.
    #[must_use]
    pub fn at(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }
}

impl ConfigStore for YamlConfigStore {
    fn load(&self) -> Result<DejimaConfig> {
        let path = self.path()?;
        if !path.exists() {
            return Ok(DejimaConfig::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        serde_yaml::from_str(&content).with_context(|| format!("cannot parse {}", path.display()))
    }

    fn path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.path {
            return Ok(path.clone());
        }
        if let Ok(val) = std::env::var(CONFIG_ENV) {
            return Ok(PathBuf::from(val));
        }
        Ok(dejima_dir()?.join("config.yaml"))
    }
}
