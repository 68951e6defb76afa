//! Domain types for Dejima configuration.
//!
//! Pure data only. Loading lives in `infra::config`.

use serde::{Deserialize, Serialize};

use crate::domain::gate::MIN_BALANCE_TO_REPRODUCE;
use crate::domain::instance::{DEFAULT_LOCAL_PORT, GpuCandidate, default_candidates};

// ── Constants ────────────────────────────────────────────────────────────────

pub const DEFAULT_MODEL: &str = "Qwen/Qwen2.5-7B-Instruct-AWQ";
pub const DEFAULT_TREASURY: &str = "dejima-treasury";

// ── Config schema ────────────────────────────────────────────────────────────

/// Which provider adapter a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderChoice {
    #[default]
    Gcp,
    Vast,
}

impl std::fmt::Display for ProviderChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gcp => write!(f, "gcp"),
            Self::Vast => write!(f, "vast"),
        }
    }
}

/// Top-level configuration stored in `~/.dejima/config.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DejimaConfig {
    /// Address settlements are paid into.
    pub treasury_address: String,
    pub min_reproduce_balance: f64,
    pub default_model: String,
    pub default_local_port: u16,
    pub default_provider: ProviderChoice,
    /// Addresses the stub compliance check sends to human review.
    pub compliance_deny_list: Vec<String>,
    pub paths: PathsConfig,
    pub cloud: CloudConfig,
    pub marketplace: MarketplaceConfig,
}

impl Default for DejimaConfig {
    fn default() -> Self {
        Self {
            treasury_address: DEFAULT_TREASURY.to_string(),
            min_reproduce_balance: MIN_BALANCE_TO_REPRODUCE,
            default_model: DEFAULT_MODEL.to_string(),
            default_local_port: DEFAULT_LOCAL_PORT,
            default_provider: ProviderChoice::Gcp,
            compliance_deny_list: Vec::new(),
            paths: PathsConfig::default(),
            cloud: CloudConfig::default(),
            marketplace: MarketplaceConfig::default(),
        }
    }
}

/// File locations. Relative paths resolve against the config directory;
/// `None` means the default under `~/.dejima/`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub ledger: Option<String>,
    pub registry: Option<String>,
    pub signals: Option<String>,
}

/// Poll timings shared by both provider adapters, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessTimings {
    pub running_timeout_secs: u64,
    pub running_interval_secs: u64,
    /// Pause between the instance reporting running and the first remote step.
    pub boot_grace_secs: u64,
    pub ssh_timeout_secs: u64,
    pub ssh_interval_secs: u64,
    pub verify_attempts: u32,
    pub verify_backoff_secs: u64,
    pub tunnel_settle_secs: u64,
    pub model_timeout_secs: u64,
    pub model_interval_secs: u64,
    pub probe_timeout_secs: u64,
}

impl ReadinessTimings {
    #[must_use]
    pub fn cloud_vm() -> Self {
        Self {
            running_timeout_secs: 300,
            running_interval_secs: 5,
            boot_grace_secs: 10,
            ssh_timeout_secs: 180,
            ssh_interval_secs: 8,
            verify_attempts: 4,
            verify_backoff_secs: 8,
            tunnel_settle_secs: 5,
            model_timeout_secs: 900,
            model_interval_secs: 10,
            probe_timeout_secs: 30,
        }
    }

    #[must_use]
    pub fn marketplace() -> Self {
        Self {
            boot_grace_secs: 5,
            ssh_timeout_secs: 0,
            verify_backoff_secs: 5,
            model_timeout_secs: 600,
            ..Self::cloud_vm()
        }
    }

    /// Shortest waits that still exercise every step.
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            running_timeout_secs: 1,
            running_interval_secs: 1,
            boot_grace_secs: 0,
            ssh_timeout_secs: 1,
            ssh_interval_secs: 1,
            verify_attempts: 2,
            verify_backoff_secs: 0,
            tunnel_settle_secs: 0,
            model_timeout_secs: 1,
            model_interval_secs: 1,
            probe_timeout_secs: 1,
        }
    }
}

impl Default for ReadinessTimings {
    fn default() -> Self {
        Self::cloud_vm()
    }
}

/// Cloud VM settings for the `gcloud` adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    /// Project passed as `--project`; the CLI's active project when unset.
    pub project: Option<String>,
    pub image_family: String,
    pub image_project: String,
    pub boot_disk_gb: u32,
    pub instance_prefix: String,
    /// Tried strictly in order.
    pub candidates: Vec<GpuCandidate>,
    pub timings: ReadinessTimings,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            project: None,
            image_family: "common-cu124-debian-11-py310".to_string(),
            image_project: "deeplearning-platform-release".to_string(),
            boot_disk_gb: 80,
            instance_prefix: "dejima-gpu".to_string(),
            candidates: default_candidates(),
            timings: ReadinessTimings::cloud_vm(),
        }
    }
}

/// Marketplace settings for the REST adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketplaceConfig {
    pub api_base: String,
    pub image: String,
    pub disk_gb: u32,
    pub min_disk_gb: u32,
    pub max_hourly_price: f64,
    pub min_gpu_ram_mb: u32,
    /// Offers fetched per search.
    pub search_limit: u32,
    pub label: String,
    pub timings: ReadinessTimings,
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            api_base: "https://console.vast.ai/api/v0".to_string(),
            image: "vllm/vllm-openai:latest".to_string(),
            disk_gb: 40,
            min_disk_gb: 40,
            max_hourly_price: 1.0,
            min_gpu_ram_mb: 14_000,
            search_limit: 20,
            label: "dejima-gpu".to_string(),
            timings: ReadinessTimings::marketplace(),
        }
    }
}

/// Secrets read from `DEJIMA_*` environment variables, never from the file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Credentials {
    pub vast_api_key: Option<String>,
    pub stripe_secret_key: Option<String>,
    /// Private key path; discovered under `~/.ssh` when unset.
    pub ssh_identity: Option<String>,
}

// ── Unit tests ───────────────────────────────────────────────────────────────
