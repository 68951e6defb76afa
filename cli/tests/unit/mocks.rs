//! Shared port doubles for unit tests.
//!
//! Each double records the calls it receives so tests can assert on what a
//! service did, not just on what it returned.

#![allow(dead_code, clippy::unwrap_used)]

use std::collections::HashMap;
use std::process::Output;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use dejima_common::{
    AgentRecord, ChargeStatus, ComplianceMethod, CostSignal, PaymentReceipt, ProviderKind,
    RevenueSignal,
};
use dejima_cli::application::ports::{
    AgentRegistry, BillingReceipt, BillingService, CloudCompute, ComplianceDecision,
    ComplianceService, MarketplaceApi, ModelEndpoint, OfferQuery, ProgressReporter, RemoteShell,
    RentSpec, SignalRecorder, SshTarget, TunnelSpec, Tunnels, VmCreateSpec, VmStatus,
    WalletService,
};
use dejima_cli::application::services::provision::{ProviderAdapter, ProvisionRequest};
use dejima_cli::application::services::scope::RunScope;
use dejima_cli::domain::instance::{
    GpuOffer, InstanceHandle, InstanceListing, ProvisionedInstance,
};

use crate::helpers::{cloud_instance, ok_output};

fn unexpected<T>(what: &str) -> Result<T> {
    anyhow::bail!("{what} not expected in this test")
}

// ── Reporter ─────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingReporter {
    pub lines: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

impl ProgressReporter for RecordingReporter {
    fn step(&self, message: &str) {
        self.lines.lock().unwrap().push(format!("step: {message}"));
    }
    fn success(&self, message: &str) {
        self.lines.lock().unwrap().push(format!("ok: {message}"));
    }
    fn warn(&self, message: &str) {
        self.lines.lock().unwrap().push(format!("warn: {message}"));
    }
}

// ── Wallet ───────────────────────────────────────────────────────────────────

/// In-memory balances. `settle` succeeds unless `fail_settle` is set.
#[derive(Default)]
pub struct FakeWallet {
    pub balances: HashMap<String, f64>,
    pub fail_settle: bool,
    pub fail_balance: bool,
    pub settled: Mutex<Vec<(String, String, f64)>>,
}

impl FakeWallet {
    pub fn with_balance(address: &str, amount: f64) -> Self {
        Self {
            balances: HashMap::from([(address.to_string(), amount)]),
            ..Self::default()
        }
    }

    pub fn settled(&self) -> Vec<(String, String, f64)> {
        self.settled.lock().unwrap().clone()
    }
}

impl WalletService for FakeWallet {
    async fn settle(&self, from: &str, to: &str, amount: f64) -> Result<PaymentReceipt> {
        self.settled
            .lock()
            .unwrap()
            .push((from.to_string(), to.to_string(), amount));
        if self.fail_settle {
            anyhow::bail!("insufficient balance in {from}");
        }
        Ok(PaymentReceipt {
            transaction_ref: "tx-0001".to_string(),
            treasury_address: to.to_string(),
            amount_settled: amount,
        })
    }

    async fn balance(&self, address: &str) -> Result<f64> {
        if self.fail_balance {
            anyhow::bail!("ledger unreadable");
        }
        self.balances
            .get(address)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("unknown wallet {address}"))
    }
}

// ── Compliance ───────────────────────────────────────────────────────────────

pub enum FakeCompliance {
    Approve,
    Deny,
    Fail,
}

impl ComplianceService for FakeCompliance {
    async fn check(&self, _: &str, _: &str) -> Result<ComplianceDecision> {
        match self {
            Self::Approve => Ok(ComplianceDecision {
                approved: true,
                method: ComplianceMethod::AutoApproved,
                notes: "ok".to_string(),
            }),
            Self::Deny => Ok(ComplianceDecision {
                approved: false,
                method: ComplianceMethod::HumanReview,
                notes: "address on deny list".to_string(),
            }),
            Self::Fail => anyhow::bail!("screening service unreachable"),
        }
    }
}

// ── Billing ──────────────────────────────────────────────────────────────────

pub struct FakeBilling {
    pub outcome: Result<ChargeStatus, String>,
    pub charged: Mutex<Vec<f64>>,
}

impl FakeBilling {
    pub fn succeeding() -> Self {
        Self {
            outcome: Ok(ChargeStatus::Succeeded),
            charged: Mutex::default(),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            outcome: Err(message.to_string()),
            charged: Mutex::default(),
        }
    }
}

impl BillingService for FakeBilling {
    async fn charge(&self, amount_usd: f64, _: &str) -> Result<BillingReceipt> {
        self.charged.lock().unwrap().push(amount_usd);
        match &self.outcome {
            Ok(status) => Ok(BillingReceipt {
                reference: "pi_test_123".to_string(),
                status: *status,
            }),
            Err(message) => anyhow::bail!("{message}"),
        }
    }
}

// ── Signals ──────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSignals {
    pub costs: Mutex<Vec<CostSignal>>,
    pub revenues: Mutex<Vec<RevenueSignal>>,
}

impl RecordingSignals {
    pub fn costs(&self) -> Vec<CostSignal> {
        self.costs.lock().unwrap().clone()
    }

    pub fn revenues(&self) -> Vec<RevenueSignal> {
        self.revenues.lock().unwrap().clone()
    }
}

impl SignalRecorder for RecordingSignals {
    async fn record_cost(&self, signal: &CostSignal) -> Result<()> {
        self.costs.lock().unwrap().push(signal.clone());
        Ok(())
    }
    async fn record_revenue(&self, signal: &RevenueSignal) -> Result<()> {
        self.revenues.lock().unwrap().push(signal.clone());
        Ok(())
    }
}

/// Recorder whose journal is unwritable.
pub struct FailingSignals;

impl SignalRecorder for FailingSignals {
    async fn record_cost(&self, _: &CostSignal) -> Result<()> {
        anyhow::bail!("signals.jsonl: read-only file system")
    }
    async fn record_revenue(&self, _: &RevenueSignal) -> Result<()> {
        anyhow::bail!("signals.jsonl: read-only file system")
    }
}

// ── Registry ─────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeRegistry {
    pub agents: Vec<AgentRecord>,
    pub broken: bool,
}

impl FakeRegistry {
    pub fn with(agents: Vec<AgentRecord>) -> Self {
        Self {
            agents,
            broken: false,
        }
    }
}

impl AgentRegistry for FakeRegistry {
    async fn get(&self, agent_id: &str) -> Result<Option<AgentRecord>> {
        if self.broken {
            anyhow::bail!("registry file is not valid JSON");
        }
        Ok(self.agents.iter().find(|a| a.agent_id == agent_id).cloned())
    }
}

// ── Provider adapter ─────────────────────────────────────────────────────────

/// What [`FakeProvider::provision`] does.
pub enum ProvisionBehavior {
    /// Return a ready instance.
    Succeed,
    /// Create (and track) an instance, then fail.
    FailAfterCreate,
    /// Fail before anything exists.
    FailEarly,
}

pub struct FakeProvider {
    pub behavior: ProvisionBehavior,
    pub provisioned: Mutex<u32>,
    pub destroyed: Mutex<Vec<InstanceHandle>>,
}

impl FakeProvider {
    pub fn new(behavior: ProvisionBehavior) -> Self {
        Self {
            behavior,
            provisioned: Mutex::new(0),
            destroyed: Mutex::default(),
        }
    }

    pub fn provision_calls(&self) -> u32 {
        *self.provisioned.lock().unwrap()
    }

    pub fn destroyed(&self) -> Vec<InstanceHandle> {
        self.destroyed.lock().unwrap().clone()
    }
}

impl ProviderAdapter for FakeProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::CloudVm
    }

    async fn provision(
        &self,
        request: &ProvisionRequest,
        scope: &RunScope,
    ) -> Result<ProvisionedInstance> {
        *self.provisioned.lock().unwrap() += 1;
        match self.behavior {
            ProvisionBehavior::FailEarly => anyhow::bail!("no GPU instances available right now"),
            ProvisionBehavior::FailAfterCreate => {
                scope.track(InstanceHandle {
                    provider: ProviderKind::CloudVm,
                    instance_id: "dejima-gpu-1".to_string(),
                    region: Some("us-central1-b".to_string()),
                });
                anyhow::bail!("instance dejima-gpu-1 did not become running within 300s")
            }
            ProvisionBehavior::Succeed => {
                let mut instance =
                    cloud_instance("dejima-gpu-1", dejima_common::ReadinessState::Ready);
                instance.model.clone_from(&request.model);
                instance.local_port = request.local_port;
                scope.track(ProvisionedInstance::CloudVm(instance.clone()).handle());
                Ok(ProvisionedInstance::CloudVm(instance))
            }
        }
    }

    async fn destroy(&self, handle: &InstanceHandle) -> Result<()> {
        self.destroyed.lock().unwrap().push(handle.clone());
        Ok(())
    }
}

// ── Tunnels and model endpoint ───────────────────────────────────────────────

#[derive(Default)]
pub struct FakeTunnels {
    pub fail_open: bool,
    pub opened: Mutex<Vec<(String, TunnelSpec)>>,
    pub closed: Mutex<Vec<String>>,
}

impl FakeTunnels {
    pub fn opened(&self) -> Vec<(String, TunnelSpec)> {
        self.opened.lock().unwrap().clone()
    }

    pub fn closed(&self) -> Vec<String> {
        self.closed.lock().unwrap().clone()
    }
}

impl Tunnels for FakeTunnels {
    fn open(&self, instance_id: &str, spec: &TunnelSpec) -> Result<()> {
        if self.fail_open {
            anyhow::bail!("ssh: command not found");
        }
        self.opened
            .lock()
            .unwrap()
            .push((instance_id.to_string(), spec.clone()));
        Ok(())
    }
    fn close(&self, instance_id: &str) {
        self.closed.lock().unwrap().push(instance_id.to_string());
    }
    fn is_open(&self, instance_id: &str) -> bool {
        self.opened().iter().any(|(id, _)| id == instance_id)
    }
}

/// Answers `/v1/models` with `loaded` (empty = still loading).
pub struct FakeModels {
    pub loaded: Vec<String>,
}

impl FakeModels {
    pub fn ready() -> Self {
        Self {
            loaded: vec!["qwen-7b".to_string()],
        }
    }

    pub fn loading() -> Self {
        Self { loaded: Vec::new() }
    }
}

impl ModelEndpoint for FakeModels {
    async fn list_models(&self, _: &str) -> Result<Vec<String>> {
        Ok(self.loaded.clone())
    }
    async fn chat_probe(&self, _: &str, _: &str, _: &str, _: Duration) -> Result<String> {
        Ok("DEJIMA_ONLINE".to_string())
    }
}

// ── Cloud compute ────────────────────────────────────────────────────────────

/// Canned `gcloud` behaviour keyed by zone. Zones without an entry create
/// successfully.
#[derive(Default)]
pub struct FakeCloud {
    pub create_results: HashMap<String, Output>,
    /// Zones where `delete` succeeds. Empty means every zone.
    pub deletable_in: Vec<String>,
    pub gpu_listing_fails: bool,
    /// How long `create` blocks after the provider has accepted the VM.
    pub create_delay: Option<Duration>,
    pub created_in: Mutex<Vec<String>>,
    pub deleted: Mutex<Vec<(String, String)>>,
}

impl FakeCloud {
    pub fn created_in(&self) -> Vec<String> {
        self.created_in.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<(String, String)> {
        self.deleted.lock().unwrap().clone()
    }
}

impl CloudCompute for FakeCloud {
    async fn create(&self, spec: &VmCreateSpec<'_>) -> Result<Output> {
        self.created_in.lock().unwrap().push(spec.zone.to_string());
        if let Some(delay) = self.create_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self
            .create_results
            .get(spec.zone)
            .cloned()
            .unwrap_or_else(|| ok_output(b"")))
    }

    async fn describe(&self, _: &str, _: &str) -> Result<VmStatus> {
        Ok(VmStatus {
            status: "RUNNING".to_string(),
            external_ip: Some("34.1.2.3".to_string()),
        })
    }

    async fn ssh(&self, _: &str, _: &str, command: &str, _: Duration) -> Result<Output> {
        if command == "nvidia-smi" && self.gpu_listing_fails {
            return Ok(crate::helpers::err_output(9, b"NVIDIA-SMI has failed"));
        }
        Ok(ok_output(b"Tesla T4, 15360 MiB"))
    }

    async fn delete(&self, name: &str, zone: &str) -> Result<Output> {
        self.deleted
            .lock()
            .unwrap()
            .push((name.to_string(), zone.to_string()));
        if self.deletable_in.is_empty() || self.deletable_in.iter().any(|z| z == zone) {
            Ok(ok_output(b""))
        } else {
            Ok(crate::helpers::err_output(1, b"was not found"))
        }
    }

    fn tunnel_spec(&self, name: &str, zone: &str, local_port: u16) -> TunnelSpec {
        TunnelSpec {
            program: "gcloud".to_string(),
            args: vec![
                "compute".to_string(),
                "ssh".to_string(),
                name.to_string(),
                format!("--zone={zone}"),
            ],
            local_port,
        }
    }
}

// ── Marketplace ──────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeMarket {
    pub offers: Vec<GpuOffer>,
    pub listing: Option<InstanceListing>,
    pub rented: Mutex<Vec<(u64, RentSpec)>>,
    pub account_keys: Mutex<Vec<String>>,
    pub attached: Mutex<Vec<(u64, String)>>,
    pub fail_attach: bool,
    /// How long `create_instance` blocks after the rental is accepted.
    pub create_delay: Option<Duration>,
    pub destroyed: Mutex<Vec<u64>>,
    /// Every API call in order, plus remote commands from [`JournaledShell`].
    pub calls: Mutex<Vec<String>>,
}

impl FakeMarket {
    pub const INSTANCE_ID: u64 = 4242;

    pub fn rented(&self) -> Vec<(u64, RentSpec)> {
        self.rented.lock().unwrap().clone()
    }

    pub fn destroyed(&self) -> Vec<u64> {
        self.destroyed.lock().unwrap().clone()
    }

    pub fn attached(&self) -> Vec<(u64, String)> {
        self.attached.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn log(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }
}

impl MarketplaceApi for FakeMarket {
    async fn current_user(&self) -> Result<u64> {
        self.log("current_user");
        Ok(7)
    }
    async fn set_account_key(&self, _: u64, public_key: &str) -> Result<()> {
        self.log("set_account_key");
        self.account_keys.lock().unwrap().push(public_key.to_string());
        Ok(())
    }
    async fn search_offers(&self, _: &OfferQuery) -> Result<Vec<GpuOffer>> {
        self.log("search_offers");
        Ok(self.offers.clone())
    }
    async fn create_instance(&self, offer_id: u64, spec: &RentSpec) -> Result<u64> {
        self.log("create_instance");
        self.rented.lock().unwrap().push((offer_id, spec.clone()));
        if let Some(delay) = self.create_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(Self::INSTANCE_ID)
    }
    async fn list_instances(&self) -> Result<Vec<InstanceListing>> {
        self.log("list_instances");
        Ok(self.listing.clone().into_iter().collect())
    }
    async fn attach_key(&self, instance_id: u64, public_key: &str) -> Result<()> {
        self.log("attach_key");
        if self.fail_attach {
            anyhow::bail!("HTTP 500: ssh key service unavailable");
        }
        self.attached
            .lock()
            .unwrap()
            .push((instance_id, public_key.to_string()));
        Ok(())
    }
    async fn destroy(&self, instance_id: u64) -> Result<()> {
        self.log("destroy");
        self.destroyed.lock().unwrap().push(instance_id);
        Ok(())
    }
}

/// Marketplace that must never be reached.
pub struct UntouchedMarket;

impl MarketplaceApi for UntouchedMarket {
    async fn current_user(&self) -> Result<u64> {
        unexpected("current_user")
    }
    async fn set_account_key(&self, _: u64, _: &str) -> Result<()> {
        unexpected("set_account_key")
    }
    async fn search_offers(&self, _: &OfferQuery) -> Result<Vec<GpuOffer>> {
        unexpected("search_offers")
    }
    async fn create_instance(&self, _: u64, _: &RentSpec) -> Result<u64> {
        unexpected("create_instance")
    }
    async fn list_instances(&self) -> Result<Vec<InstanceListing>> {
        unexpected("list_instances")
    }
    async fn attach_key(&self, _: u64, _: &str) -> Result<()> {
        unexpected("attach_key")
    }
    async fn destroy(&self, _: u64) -> Result<()> {
        unexpected("destroy")
    }
}

pub struct FakeShell;

impl RemoteShell for FakeShell {
    async fn exec(&self, _: &SshTarget, _: &str, _: Duration) -> Result<Output> {
        Ok(ok_output(b"NVIDIA RTX 4090, 24564 MiB"))
    }

    fn tunnel_spec(&self, target: &SshTarget, local_port: u16) -> TunnelSpec {
        TunnelSpec {
            program: "ssh".to_string(),
            args: vec!["-p".to_string(), target.port.to_string(), target.host.clone()],
            local_port,
        }
    }
}

/// Shell that writes each remote command into the market's call log, so
/// tests can see where it ran relative to the API calls.
pub struct JournaledShell<'a> {
    pub market: &'a FakeMarket,
}

impl RemoteShell for JournaledShell<'_> {
    async fn exec(&self, target: &SshTarget, command: &str, timeout: Duration) -> Result<Output> {
        self.market.log(&format!("exec {command}"));
        FakeShell.exec(target, command, timeout).await
    }

    fn tunnel_spec(&self, target: &SshTarget, local_port: u16) -> TunnelSpec {
        FakeShell.tunnel_spec(target, local_port)
    }
}
