// lib/crates/dejima-common/src/agent.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a registered agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    #[default]
    Alive,
    Dead,
    Reproducing,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Alive => f.write_str("alive"),
            Self::Dead => f.write_str("dead"),
            Self::Reproducing => f.write_str("reproducing"),
        }
    }
}

/// Registry entry for an agent. Key material never lives here; the wallet
/// service resolves `wallet_address` on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub agent_id: String,
    /// `None` for a genesis agent.
    #[serde(default)]
    pub parent_id: Option<String>,
    pub wallet_address: String,
    pub model: String,
    #[serde(default)]
    pub status: AgentStatus,
    /// 0 = genesis, 1 = child, 2 = grandchild...
    #[serde(default)]
    pub generation: u32,
    pub created_at: DateTime<Utc>,
}
