//! GPU instance domain types: placement candidates, marketplace offers, and
//! the provider-tagged instance union with its normalisation into
//! [`InstanceDescriptor`].
//!
//! Pure data in, data out; no I/O.

use chrono::{DateTime, Utc};
use dejima_common::{InstanceDescriptor, ProviderKind, ReadinessState};
use serde::{Deserialize, Serialize};

/// Port the inference server listens on inside the instance.
pub const MODEL_PORT: u16 = 8000;

/// Local tunnel port used when the caller does not pick one.
pub const DEFAULT_LOCAL_PORT: u16 = 8001;

/// One (zone, hardware, price) placement considered for a cloud VM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuCandidate {
    pub zone: String,
    pub machine_type: String,
    pub gpu_type: String,
    pub hourly_price: f64,
}

impl GpuCandidate {
    fn new(zone: &str, machine_type: &str, gpu_type: &str, hourly_price: f64) -> Self {
        Self {
            zone: zone.to_string(),
            machine_type: machine_type.to_string(),
            gpu_type: gpu_type.to_string(),
            hourly_price,
        }
    }
}

/// Default candidate list, tried strictly in this order.
#[must_use]
pub fn default_candidates() -> Vec<GpuCandidate> {
    vec![
        GpuCandidate::new("us-central1-b", "n1-standard-4", "nvidia-tesla-t4", 0.54),
        GpuCandidate::new("us-central1-c", "n1-standard-4", "nvidia-tesla-t4", 0.54),
        GpuCandidate::new("us-central1-f", "n1-standard-4", "nvidia-tesla-t4", 0.54),
        GpuCandidate::new("us-central1-a", "g2-standard-4", "nvidia-l4", 0.92),
        GpuCandidate::new("us-central1-b", "g2-standard-4", "nvidia-l4", 0.92),
        GpuCandidate::new("us-east1-c", "n1-standard-4", "nvidia-tesla-t4", 0.54),
    ]
}

/// Whether a creation failure means "this zone is out of capacity, try the
/// next candidate" rather than a hard error.
///
/// Matches on the provider's error text; the CLI exposes no structured code.
#[must_use]
pub fn is_resource_exhausted(detail: &str) -> bool {
    detail.contains("ZONE_RESOURCE_POOL_EXHAUSTED")
        || detail.contains("does not have enough resources")
}

/// A live marketplace listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuOffer {
    pub id: u64,
    #[serde(default)]
    pub gpu_name: String,
    /// Total hourly price; some listings omit it.
    #[serde(default, rename = "dph_total")]
    pub hourly_price: Option<f64>,
    #[serde(default)]
    pub gpu_ram: Option<f64>,
    #[serde(default)]
    pub geolocation: Option<String>,
}

impl GpuOffer {
    /// Listings without a price sort last.
    #[must_use]
    pub fn effective_price(&self) -> f64 {
        self.hourly_price.unwrap_or(99.0)
    }
}

/// Pick the cheapest offer within `max_hourly_price`; ties go to the
/// earliest listing.
///
/// The ceiling is re-applied here because the search filter only sees listed
/// prices, and unpriced listings fall back to a price above any sane ceiling.
#[must_use]
pub fn select_cheapest(offers: &[GpuOffer], max_hourly_price: f64) -> Option<&GpuOffer> {
    offers
        .iter()
        .filter(|o| o.effective_price() <= max_hourly_price)
        .min_by(|a, b| a.effective_price().total_cmp(&b.effective_price()))
}

/// Bid placed on an offer: slightly above its floor so it is filled quickly.
#[must_use]
pub fn bid_price(offer: &GpuOffer) -> f64 {
    offer.effective_price() * 1.1
}

/// One row of the marketplace's instance listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceListing {
    pub id: u64,
    #[serde(default)]
    pub actual_status: Option<String>,
    #[serde(default)]
    pub ssh_host: Option<String>,
    #[serde(default)]
    pub ssh_port: Option<u16>,
    #[serde(default)]
    pub status_msg: Option<String>,
}

impl InstanceListing {
    /// Running and reachable: the status says so and SSH coordinates are set.
    #[must_use]
    pub fn ssh_endpoint(&self) -> Option<(&str, u16)> {
        if self.actual_status.as_deref() != Some("running") {
            return None;
        }
        match (self.ssh_host.as_deref(), self.ssh_port) {
            (Some(host), Some(port)) if !host.is_empty() => Some((host, port)),
            _ => None,
        }
    }

    #[must_use]
    pub fn has_failed(&self) -> bool {
        matches!(self.actual_status.as_deref(), Some("error" | "failed"))
    }
}

#[must_use]
pub fn local_endpoint(local_port: u16) -> String {
    format!("http://localhost:{local_port}/v1")
}

#[must_use]
pub fn remote_endpoint(host: &str) -> String {
    format!("http://{host}:{MODEL_PORT}/v1")
}

// ── Provider-specific shapes ──────────────────────────────────────────────────

/// Instance created through the cloud VM CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudVmInstance {
    pub instance_name: String,
    pub zone: String,
    pub machine_type: String,
    pub gpu_type: String,
    pub external_ip: String,
    pub hourly_price: f64,
    pub verification_output: String,
    pub local_port: u16,
    pub model: String,
    pub readiness: ReadinessState,
    pub provisioned_at: DateTime<Utc>,
}

/// Instance rented from the bare-metal marketplace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketplaceInstance {
    pub contract_id: u64,
    pub offer_id: u64,
    pub ssh_host: String,
    pub ssh_port: u16,
    pub gpu_name: String,
    pub hourly_price: f64,
    pub geolocation: Option<String>,
    pub verification_output: String,
    pub local_port: u16,
    pub model: String,
    pub readiness: ReadinessState,
    pub provisioned_at: DateTime<Utc>,
}

/// Result of a provider adapter, tagged by provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "kebab-case")]
pub enum ProvisionedInstance {
    CloudVm(CloudVmInstance),
    Marketplace(MarketplaceInstance),
}

/// What cleanup needs to tear an instance down again.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceHandle {
    pub provider: ProviderKind,
    pub instance_id: String,
    /// Zone or geolocation when the provider needs it for deletion.
    pub region: Option<String>,
}

impl ProvisionedInstance {
    #[must_use]
    pub fn kind(&self) -> ProviderKind {
        match self {
            Self::CloudVm(_) => ProviderKind::CloudVm,
            Self::Marketplace(_) => ProviderKind::Marketplace,
        }
    }

    #[must_use]
    pub fn readiness(&self) -> ReadinessState {
        match self {
            Self::CloudVm(i) => i.readiness,
            Self::Marketplace(i) => i.readiness,
        }
    }

    #[must_use]
    pub fn handle(&self) -> InstanceHandle {
        match self {
            Self::CloudVm(i) => InstanceHandle {
                provider: ProviderKind::CloudVm,
                instance_id: i.instance_name.clone(),
                region: Some(i.zone.clone()),
            },
            Self::Marketplace(i) => InstanceHandle {
                provider: ProviderKind::Marketplace,
                instance_id: i.contract_id.to_string(),
                region: i.geolocation.clone(),
            },
        }
    }

    /// Normalise into the provider-neutral descriptor.
    #[must_use]
    pub fn descriptor(&self) -> InstanceDescriptor {
        match self {
            Self::CloudVm(i) => InstanceDescriptor {
                provider: ProviderKind::CloudVm,
                instance_id: i.instance_name.clone(),
                host: (!i.external_ip.is_empty()).then(|| i.external_ip.clone()),
                ssh_port: None,
                region: i.zone.clone(),
                hardware_tag: i.gpu_type.clone(),
                hourly_price: i.hourly_price,
                verification_output: i.verification_output.clone(),
                local_endpoint: local_endpoint(i.local_port),
                remote_endpoint: remote_endpoint(&i.external_ip),
                model: i.model.clone(),
                readiness: i.readiness,
                provisioned_at: i.provisioned_at,
            },
            Self::Marketplace(i) => InstanceDescriptor {
                provider: ProviderKind::Marketplace,
                instance_id: i.contract_id.to_string(),
                host: (!i.ssh_host.is_empty()).then(|| i.ssh_host.clone()),
                ssh_port: Some(i.ssh_port),
                region: i.geolocation.clone().unwrap_or_else(|| "unknown".to_string()),
                hardware_tag: i.gpu_name.clone(),
                hourly_price: i.hourly_price,
                verification_output: i.verification_output.clone(),
                local_endpoint: local_endpoint(i.local_port),
                remote_endpoint: remote_endpoint(&i.ssh_host),
                model: i.model.clone(),
                readiness: i.readiness,
                provisioned_at: i.provisioned_at,
            },
        }
    }
}
