//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain` and the shared
//! `dejima_common` data model — never from `crate::infra`,
//! `crate::commands`, or `crate::output`.

use std::path::PathBuf;
use std::process::Output;
use std::time::Duration;

use anyhow::Result;
use dejima_common::{
    AgentRecord, ChargeStatus, ComplianceMethod, CostSignal, PaymentReceipt, RevenueSignal,
};

use crate::domain::config::DejimaConfig;
use crate::domain::instance::{GpuOffer, InstanceListing};

// ── Value Types ───────────────────────────────────────────────────────────────

/// A background port-forward: the program to spawn and the local port it binds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelSpec {
    pub program: String,
    pub args: Vec<String>,
    pub local_port: u16,
}

/// Launch parameters for a cloud VM.
pub struct VmCreateSpec<'a> {
    pub name: &'a str,
    pub zone: &'a str,
    pub machine_type: &'a str,
    /// Accelerator type, attached with count 1.
    pub gpu_type: &'a str,
    pub image_family: &'a str,
    pub image_project: &'a str,
    pub boot_disk_gb: u32,
    pub startup_script: &'a str,
}

/// What `describe` reports about a cloud VM.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VmStatus {
    /// Provider status string, e.g. `RUNNING`, `STAGING`.
    pub status: String,
    /// External NAT address, once assigned.
    pub external_ip: Option<String>,
}

/// Where a plain SSH connection goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    pub host: String,
    pub port: u16,
    pub user: String,
}

/// Offer search filters.
#[derive(Debug, Clone, PartialEq)]
pub struct OfferQuery {
    pub min_disk_gb: u32,
    pub max_hourly_price: f64,
    pub min_gpu_ram_mb: u32,
    pub limit: u32,
}

/// Rental parameters for a marketplace offer.
#[derive(Debug, Clone, PartialEq)]
pub struct RentSpec {
    pub image: String,
    pub disk_gb: u32,
    pub label: String,
    pub onstart: String,
    pub bid_price: f64,
}

/// Outcome of a compliance check.
#[derive(Debug, Clone, PartialEq)]
pub struct ComplianceDecision {
    pub approved: bool,
    pub method: ComplianceMethod,
    pub notes: String,
}

/// What the billing provider returned for a charge.
#[derive(Debug, Clone, PartialEq)]
pub struct BillingReceipt {
    pub reference: String,
    pub status: ChargeStatus,
}

// ── Command Runner Port ───────────────────────────────────────────────────────

/// Abstracts process execution so infrastructure can be swapped or mocked.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run a program and capture its output.
    ///
    /// Implementations should delegate to `run_with_timeout` using the
    /// instance's configured default timeout.
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output>;
    /// Run a program with a custom timeout override.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or exceeds `timeout`.
    /// On timeout, the child process must be killed (not left orphaned).
    async fn run_with_timeout(&self, program: &str, args: &[&str], timeout: Duration)
    -> Result<Output>;
    /// Spawn a long-lived background process with detached stdio.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned.
    fn spawn(&self, program: &str, args: &[&str]) -> Result<tokio::process::Child>;
}

// ── Progress Reporting Port ───────────────────────────────────────────────────

/// Abstracts progress reporting so services can emit events without
/// depending on the Presentation layer. Sync trait — no async needed.
pub trait ProgressReporter {
    /// Emit an in-progress step message.
    fn step(&self, message: &str);
    /// Emit a success message.
    fn success(&self, message: &str);
    /// Emit a warning message.
    fn warn(&self, message: &str);
}

// ── Configuration Port ────────────────────────────────────────────────────────

/// Abstracts where configuration comes from.
pub trait ConfigStore {
    /// Load the configuration, falling back to defaults if no file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    fn load(&self) -> Result<DejimaConfig>;
    /// Path of the configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    fn path(&self) -> Result<PathBuf>;
}

// ── Payment-side Collaborators ────────────────────────────────────────────────

/// Moves funds between addresses. Key custody lives behind this port.
#[allow(async_fn_in_trait)]
pub trait WalletService {
    /// Transfer `amount` from `from` to `to`, returning the settlement receipt.
    async fn settle(&self, from: &str, to: &str, amount: f64) -> Result<PaymentReceipt>;
    /// Current balance of `address`.
    async fn balance(&self, address: &str) -> Result<f64>;
}

#[allow(async_fn_in_trait)]
pub trait ComplianceService {
    async fn check(&self, subject_id: &str, address: &str) -> Result<ComplianceDecision>;
}

#[allow(async_fn_in_trait)]
pub trait BillingService {
    /// Charge `amount_usd` in the billing provider's base currency.
    async fn charge(&self, amount_usd: f64, description: &str) -> Result<BillingReceipt>;
}

/// Cost and revenue sink. Emission is fire-and-forget from the caller's
/// point of view; implementations de-duplicate on the idempotency key.
#[allow(async_fn_in_trait)]
pub trait SignalRecorder {
    async fn record_cost(&self, signal: &CostSignal) -> Result<()>;
    async fn record_revenue(&self, signal: &RevenueSignal) -> Result<()>;
}

/// Read-only view of the agent registry.
#[allow(async_fn_in_trait)]
pub trait AgentRegistry {
    async fn get(&self, agent_id: &str) -> Result<Option<AgentRecord>>;
}

// ── Compute Provider Ports ────────────────────────────────────────────────────

/// Cloud VM operations, shaped after the provider's CLI.
#[allow(async_fn_in_trait)]
pub trait CloudCompute {
    /// Create the VM. The raw output is returned so the caller can classify
    /// a failed exit by its stderr.
    async fn create(&self, spec: &VmCreateSpec<'_>) -> Result<Output>;
    async fn describe(&self, name: &str, zone: &str) -> Result<VmStatus>;
    /// Run `command` on the VM through the provider's SSH wrapper.
    async fn ssh(&self, name: &str, zone: &str, command: &str, timeout: Duration)
    -> Result<Output>;
    async fn delete(&self, name: &str, zone: &str) -> Result<Output>;
    /// How to forward `local_port` to the model port on the VM.
    fn tunnel_spec(&self, name: &str, zone: &str, local_port: u16) -> TunnelSpec;
}

/// Marketplace REST operations.
#[allow(async_fn_in_trait)]
pub trait MarketplaceApi {
    /// Id of the account the API key belongs to.
    async fn current_user(&self) -> Result<u64>;
    /// Register a public key at account level so new instances accept it.
    async fn set_account_key(&self, user_id: u64, public_key: &str) -> Result<()>;
    async fn search_offers(&self, query: &OfferQuery) -> Result<Vec<GpuOffer>>;
    /// Rent an offer, returning the new instance id.
    async fn create_instance(&self, offer_id: u64, spec: &RentSpec) -> Result<u64>;
    async fn list_instances(&self) -> Result<Vec<InstanceListing>>;
    async fn attach_key(&self, instance_id: u64, public_key: &str) -> Result<()>;
    async fn destroy(&self, instance_id: u64) -> Result<()>;
}

/// Plain SSH to a host the caller already knows.
#[allow(async_fn_in_trait)]
pub trait RemoteShell {
    async fn exec(&self, target: &SshTarget, command: &str, timeout: Duration) -> Result<Output>;
    /// How to forward `local_port` to the model port on `target`.
    fn tunnel_spec(&self, target: &SshTarget, local_port: u16) -> TunnelSpec;
}

/// The OpenAI-compatible inference server's HTTP surface.
#[allow(async_fn_in_trait)]
pub trait ModelEndpoint {
    /// Ids of the models the server has loaded. Empty while still loading.
    async fn list_models(&self, base_url: &str) -> Result<Vec<String>>;
    /// Send one chat completion and return the reply text.
    async fn chat_probe(
        &self,
        base_url: &str,
        model: &str,
        prompt: &str,
        timeout: Duration,
    ) -> Result<String>;
}

/// Background port-forwards, one per instance id.
pub trait Tunnels {
    /// Open a tunnel for `instance_id`, replacing any tunnel already held for it.
    ///
    /// # Errors
    ///
    /// Returns an error if the forwarding process cannot be spawned.
    fn open(&self, instance_id: &str, spec: &TunnelSpec) -> Result<()>;
    /// Close the tunnel for `instance_id`. No-op if none is open.
    fn close(&self, instance_id: &str);
    fn is_open(&self, instance_id: &str) -> bool;
}
