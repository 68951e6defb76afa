use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Settlement of the requester's payment into the treasury.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub transaction_ref: String,
    pub treasury_address: String,
    pub amount_settled: f64,
}

/// How a compliance decision was reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComplianceMethod {
    #[default]
    AutoApproved,
    HistoryBased,
    HumanReview,
}

/// Outcome of the compliance step. The pipeline never proceeds past it
/// unless `approved` is set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplianceResult {
    pub approved: bool,
    pub subject_id: String,
    pub address: String,
    pub verified_at: DateTime<Utc>,
    pub method: ComplianceMethod,
    pub notes: String,
}

/// Simulated conversion of the settled amount into the target currency.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversionResult {
    pub source_amount: f64,
    pub source_unit_price_usd: f64,
    pub usd_value: f64,
    pub demo_multiplier: f64,
    pub target_amount: f64,
}

/// Billing charge status, mirroring payment-intent states.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChargeStatus {
    RequiresPaymentMethod,
    Succeeded,
    Skipped,
    #[default]
    Canceled,
}

impl ChargeStatus {
    /// Map a provider status string onto the known states.
    ///
    /// Anything the provider reports that is not settled or skipped is kept
    /// as awaiting a payment method, which is how test-mode intents stay.
    #[must_use]
    pub fn from_provider(status: &str) -> Self {
        match status {
            "succeeded" => Self::Succeeded,
            "canceled" => Self::Canceled,
            "skipped" => Self::Skipped,
            _ => Self::RequiresPaymentMethod,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeResult {
    pub charge_ref: String,
    pub amount: f64,
    pub currency: String,
    pub status: ChargeStatus,
}

impl ChargeResult {
    /// Substitute used when the billing provider is unreachable.
    #[must_use]
    pub fn skipped(amount: f64) -> Self {
        Self {
            charge_ref: "skipped".to_string(),
            amount,
            currency: "USD".to_string(),
            status: ChargeStatus::Skipped,
        }
    }
}

impl Default for ChargeResult {
    fn default() -> Self {
        Self {
            charge_ref: String::new(),
            amount: 0.0,
            currency: "USD".to_string(),
            status: ChargeStatus::Canceled,
        }
    }
}

/// Which provider adapter produced an instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    #[default]
    CloudVm,
    Marketplace,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CloudVm => f.write_str("cloud-vm"),
            Self::Marketplace => f.write_str("marketplace"),
        }
    }
}

/// How far an instance has progressed toward serving requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReadinessState {
    #[default]
    Provisioning,
    ModelLoading,
    Ready,
}

impl std::fmt::Display for ReadinessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Provisioning => f.write_str("provisioning"),
            Self::ModelLoading => f.write_str("model-loading"),
            Self::Ready => f.write_str("ready"),
        }
    }
}

/// Provider-neutral view of a provisioned instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceDescriptor {
    pub provider: ProviderKind,
    pub instance_id: String,
    /// Public address; `None` until the provider assigns one.
    pub host: Option<String>,
    pub ssh_port: Option<u16>,
    pub region: String,
    pub hardware_tag: String,
    pub hourly_price: f64,
    pub verification_output: String,
    pub local_endpoint: String,
    pub remote_endpoint: String,
    pub model: String,
    pub readiness: ReadinessState,
    pub provisioned_at: DateTime<Utc>,
}

/// Credentials and endpoint handed to the recipient.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub instance_id: String,
    pub host: Option<String>,
    pub local_endpoint: String,
    pub remote_endpoint: String,
    pub issued_api_key: String,
    pub model: String,
    pub config_injected: bool,
    pub model_loaded: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HandoffResult {
    pub recipient_id: String,
    pub server_config: ServerConfig,
    pub handed_off_at: DateTime<Utc>,
}

/// Aggregate result of one pipeline run.
///
/// When `success` is false, fields for steps that never ran hold their
/// `Default` value; they are never partially constructed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub success: bool,
    pub agent_id: String,
    pub payment: PaymentReceipt,
    pub compliance: ComplianceResult,
    pub conversion: ConversionResult,
    pub charge: ChargeResult,
    pub instance: InstanceDescriptor,
    pub server: ServerConfig,
    pub handoff: HandoffResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Answer of the pre-pipeline reproduction gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateDecision {
    pub allowed: bool,
    pub reason: String,
}

impl GateDecision {
    #[must_use]
    pub fn allow(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
        }
    }
}
