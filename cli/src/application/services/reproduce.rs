//! Application service — the reproduction gate and the gated pipeline run.

use chrono::Utc;
use dejima_common::{AgentRecord, CostSignal, GateDecision, PipelineResult};
use serde::Serialize;

use crate::application::ports::{
    AgentRegistry, BillingService, ComplianceService, ProgressReporter, SignalRecorder,
    WalletService,
};
use crate::application::services::pipeline::{PaymentPipeline, ReproductionRequest};
use crate::application::services::provision::ProviderAdapter;
use crate::application::services::scope::RunScope;
use crate::domain::gate::{check_balance, check_record};
use crate::domain::payment::idempotency_key;

/// Inputs for [`reproduce`]. The paying wallet comes from the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct ReproduceOptions {
    pub agent_id: String,
    pub amount: f64,
    pub model: String,
    pub local_port: u16,
    pub treasury_address: String,
    pub min_balance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReproductionOutcome {
    pub gate: GateDecision,
    /// Recipient of the handed-off server; set only when the run succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child_id: Option<String>,
    /// `None` when the gate denied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<PipelineResult>,
}

async fn evaluate(
    registry: &impl AgentRegistry,
    wallet: &impl WalletService,
    agent_id: &str,
    threshold: f64,
) -> (GateDecision, Option<AgentRecord>) {
    let record = match registry.get(agent_id).await {
        Ok(record) => record,
        Err(err) => {
            return (
                GateDecision::deny(format!("registry unavailable: {err:#}")),
                None,
            );
        }
    };
    let record = match check_record(agent_id, record.as_ref()) {
        Ok(record) => record.clone(),
        Err(denied) => return (denied, None),
    };
    let balance = wallet
        .balance(&record.wallet_address)
        .await
        .map_err(|e| format!("{e:#}"));
    let decision = check_balance(balance, threshold);
    tracing::info!(agent = agent_id, allowed = decision.allowed, reason = %decision.reason, "gate evaluated");
    (decision, Some(record))
}

/// Whether `agent_id` may reproduce right now. Read-only and fail-closed:
/// any lookup failure denies.
pub async fn can_reproduce(
    registry: &impl AgentRegistry,
    wallet: &impl WalletService,
    agent_id: &str,
    threshold: f64,
) -> GateDecision {
    evaluate(registry, wallet, agent_id, threshold).await.0
}

/// Run the gate, then the pipeline paid from the agent's own wallet.
pub async fn reproduce<W, C, B, S, P, R>(
    registry: &impl AgentRegistry,
    wallet: &W,
    pipeline: &PaymentPipeline<'_, W, C, B, S, P, R>,
    opts: &ReproduceOptions,
    scope: &RunScope,
) -> ReproductionOutcome
where
    W: WalletService,
    C: ComplianceService,
    B: BillingService,
    S: SignalRecorder,
    P: ProviderAdapter,
    R: ProgressReporter,
{
    let (gate, record) = evaluate(registry, wallet, &opts.agent_id, opts.min_balance).await;
    let Some(record) = record.filter(|_| gate.allowed) else {
        return ReproductionOutcome {
            gate,
            child_id: None,
            pipeline: None,
        };
    };
    let request = ReproductionRequest {
        agent_id: opts.agent_id.clone(),
        from_wallet: record.wallet_address,
        treasury_address: opts.treasury_address.clone(),
        amount: opts.amount,
        model: opts.model.clone(),
        local_port: opts.local_port,
    };
    let result = pipeline.run(&request, scope).await;
    let child_id = result.success.then(|| result.handoff.recipient_id.clone());
    if result.success {
        record_reproduction(pipeline.signals(), &result).await;
    }
    ReproductionOutcome {
        gate,
        child_id,
        pipeline: Some(result),
    }
}

/// The whole reproduction, priced at the settled amount, as one cost to the
/// parent. Logged and dropped on failure like every other signal.
async fn record_reproduction(signals: &impl SignalRecorder, result: &PipelineResult) {
    let signal = CostSignal {
        subject_id: result.agent_id.clone(),
        model: "reproduction".to_string(),
        tokens_in: 0,
        tokens_out: 0,
        amount_usd: result.conversion.usd_value,
        idempotency_key: idempotency_key(
            "reproduce",
            Some(&result.payment.transaction_ref),
            Utc::now(),
        ),
        recorded_at: Utc::now(),
    };
    if let Err(err) = signals.record_cost(&signal).await {
        tracing::warn!(key = %signal.idempotency_key, error = %err, "cost signal dropped");
    }
}
