//! Read-only agent registry backed by a JSON file.

use std::path::PathBuf;

use anyhow::{Context, Result};
use dejima_common::AgentRecord;

use crate::application::ports::AgentRegistry;

/// Accepts either a bare array of records or `{"agents": [...]}`.
#[derive(serde::Deserialize)]
#[serde(untagged)]
enum RegistryFile {
    Wrapped { agents: Vec<AgentRecord> },
    Bare(Vec<AgentRecord>),
}

pub struct FileAgentRegistry {
    path: PathBuf,
}

impl FileAgentRegistry {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// All records; a missing file is an empty registry.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn all(&self) -> Result<Vec<AgentRecord>> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<AgentRecord>> {
            if !path.exists() {
                return Ok(Vec::new());
            }
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("reading registry {}", path.display()))?;
            let file: RegistryFile = serde_json::from_str(&content)
                .with_context(|| format!("parsing registry {}", path.display()))?;
            Ok(match file {
                RegistryFile::Wrapped { agents } | RegistryFile::Bare(agents) => agents,
            })
        })
        .await
        .context("registry load task panicked")?
    }
}

impl AgentRegistry for FileAgentRegistry {
    async fn get(&self, agent_id: &str) -> Result<Option<AgentRecord>> {
        Ok(self.all().await?.into_iter().find(|a| a.agent_id == agent_id))
    }
}
