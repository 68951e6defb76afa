//! Application service — the seven-step reproduction pipeline.
//!
//! Settle → compliance → convert → charge → provision → inject → handoff,
//! strictly in order on the caller's task. Every collaborator arrives through
//! a port, so the whole run can be driven by test doubles.

use anyhow::{Context, Result};
use chrono::Utc;
use dejima_common::{
    ChargeResult, ChargeStatus, ComplianceMethod, ComplianceResult, CostSignal, PipelineResult,
    RevenueSignal,
};

use crate::application::ports::{
    BillingService, ComplianceDecision, ComplianceService, ProgressReporter, SignalRecorder,
    WalletService,
};
use crate::application::services::provision::{ProviderAdapter, ProvisionRequest};
use crate::application::services::scope::RunScope;
use crate::domain::error::is_cancelled;
use crate::domain::payment::{SOURCE_UNIT_PRICE_USD, convert, idempotency_key};
use crate::domain::server::{generate_api_key, handoff, inject_config, recipient_id};

pub const STEPS: usize = 7;

/// The non-compute collaborators a run talks to.
pub struct Collaborators<'a, W, C, B, S> {
    pub wallet: &'a W,
    pub compliance: &'a C,
    pub billing: &'a B,
    pub signals: &'a S,
}

/// Inputs for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct ReproductionRequest {
    pub agent_id: String,
    pub from_wallet: String,
    pub treasury_address: String,
    pub amount: f64,
    pub model: String,
    pub local_port: u16,
}

pub struct PaymentPipeline<'a, W, C, B, S, P, R> {
    collaborators: Collaborators<'a, W, C, B, S>,
    provider: &'a P,
    reporter: &'a R,
}

impl<'a, W, C, B, S, P, R> PaymentPipeline<'a, W, C, B, S, P, R>
where
    W: WalletService,
    C: ComplianceService,
    B: BillingService,
    S: SignalRecorder,
    P: ProviderAdapter,
    R: ProgressReporter,
{
    pub fn new(
        collaborators: Collaborators<'a, W, C, B, S>,
        provider: &'a P,
        reporter: &'a R,
    ) -> Self {
        Self {
            collaborators,
            provider,
            reporter,
        }
    }

    #[must_use]
    pub fn signals(&self) -> &'a S {
        self.collaborators.signals
    }

    /// Execute one run. Never fails: a failed step is reported through
    /// `success`/`error`, with every later artifact left at its zero value.
    ///
    /// On failure, instances this run created are destroyed before return.
    /// On success the instance is released from `scope` and its tunnel is
    /// left open for the recipient.
    pub async fn run(&self, request: &ReproductionRequest, scope: &RunScope) -> PipelineResult {
        let mut result = PipelineResult {
            agent_id: request.agent_id.clone(),
            ..PipelineResult::default()
        };
        match self.execute(request, scope, &mut result).await {
            Ok(()) => {
                result.success = true;
                scope.release(&result.instance.instance_id);
            }
            Err(err) => {
                let message = if is_cancelled(&err) {
                    "cancelled".to_string()
                } else {
                    format!("{err:#}")
                };
                tracing::warn!(agent = %request.agent_id, error = %message, "pipeline failed");
                self.reporter.warn(&message);
                self.cleanup(scope).await;
                result.success = false;
                result.error = Some(message);
            }
        }
        result
    }

    /// Destroy every instance still tracked by `scope`, closing its tunnel.
    /// Safe to call more than once.
    pub async fn cleanup(&self, scope: &RunScope) {
        for handle in scope.take_tracked() {
            tracing::info!(instance = %handle.instance_id, "destroying instance created by this run");
            if let Err(err) = self.provider.destroy(&handle).await {
                tracing::warn!(instance = %handle.instance_id, error = %format!("{err:#}"), "cleanup failed");
                self.reporter
                    .warn(&format!("could not destroy {}: {err:#}", handle.instance_id));
            }
        }
    }

    async fn execute(
        &self,
        request: &ReproductionRequest,
        scope: &RunScope,
        result: &mut PipelineResult,
    ) -> Result<()> {
        let Collaborators {
            wallet,
            compliance,
            billing,
            ..
        } = &self.collaborators;
        let agent = request.agent_id.as_str();

        // 1. Settle
        self.step(1, "Settling payment");
        let payment = scope
            .guard(wallet.settle(
                &request.from_wallet,
                &request.treasury_address,
                request.amount,
            ))
            .await
            .context("settlement failed")?;
        self.reporter.success(&format!(
            "settled {} ({})",
            payment.amount_settled, payment.transaction_ref
        ));
        self.cost(CostSignal {
            subject_id: agent.to_string(),
            model: "infrastructure".to_string(),
            tokens_in: 0,
            tokens_out: 0,
            amount_usd: request.amount * SOURCE_UNIT_PRICE_USD,
            idempotency_key: idempotency_key(
                "settle",
                Some(&payment.transaction_ref),
                Utc::now(),
            ),
            recorded_at: Utc::now(),
        })
        .await;
        result.payment = payment;

        // 2. Compliance
        self.step(2, "Checking compliance");
        let (decision, failure) = match scope
            .guard(compliance.check(agent, &request.from_wallet))
            .await
        {
            Ok(decision) => (decision, None),
            Err(err) if is_cancelled(&err) => return Err(err),
            Err(err) => (
                ComplianceDecision {
                    approved: false,
                    method: ComplianceMethod::HumanReview,
                    notes: format!("compliance check failed: {err:#}"),
                },
                Some(format!("{err:#}")),
            ),
        };
        result.compliance = ComplianceResult {
            approved: decision.approved,
            subject_id: agent.to_string(),
            address: request.from_wallet.clone(),
            verified_at: Utc::now(),
            method: decision.method,
            notes: decision.notes,
        };
        if !decision.approved {
            match failure {
                Some(detail) => anyhow::bail!("compliance rejected: {detail}"),
                None => anyhow::bail!("compliance rejected"),
            }
        }
        self.reporter.success("compliance approved");

        // 3. Convert
        self.step(3, "Converting settlement");
        let conversion = convert(request.amount);
        self.reporter.success(&format!(
            "{} × ${}/unit × {}x = ${:.2}",
            conversion.source_amount,
            conversion.source_unit_price_usd,
            conversion.demo_multiplier,
            conversion.target_amount
        ));
        result.conversion = conversion;

        // 4. Charge
        self.step(4, "Charging billing provider");
        let target = result.conversion.target_amount;
        let description = format!("Dejima compute provisioning for agent {agent}");
        let charge = match scope.guard(billing.charge(target, &description)).await {
            Ok(receipt) => ChargeResult {
                charge_ref: receipt.reference,
                amount: target,
                currency: "USD".to_string(),
                status: receipt.status,
            },
            Err(err) if is_cancelled(&err) => return Err(err),
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "billing unavailable, charge skipped");
                self.reporter.warn(&format!("charge skipped: {err:#}"));
                ChargeResult::skipped(target)
            }
        };
        let earned = if charge.status == ChargeStatus::Succeeded {
            charge.amount
        } else {
            0.0
        };
        let charge_key_id = if charge.status == ChargeStatus::Skipped {
            result.payment.transaction_ref.as_str()
        } else {
            charge.charge_ref.as_str()
        };
        self.revenue(RevenueSignal {
            subject_id: agent.to_string(),
            source: "billing".to_string(),
            amount_usd: earned,
            description: description.clone(),
            idempotency_key: idempotency_key("charge", Some(charge_key_id), Utc::now()),
            recorded_at: Utc::now(),
        })
        .await;
        result.charge = charge;

        // 5. Provision
        self.step(
            5,
            &format!("Provisioning GPU instance ({})", self.provider.kind()),
        );
        let provision = ProvisionRequest {
            model: request.model.clone(),
            local_port: request.local_port,
        };
        let instance = self
            .provider
            .provision(&provision, scope)
            .await
            .context("provisioning failed")?
            .descriptor();
        self.reporter.success(&format!(
            "{} on {} at ${:.3}/hr ({})",
            instance.instance_id, instance.hardware_tag, instance.hourly_price, instance.readiness
        ));
        self.cost(CostSignal {
            subject_id: agent.to_string(),
            model: format!("gpu:{}", instance.hardware_tag),
            tokens_in: 0,
            tokens_out: 0,
            amount_usd: instance.hourly_price,
            idempotency_key: idempotency_key(
                "provision",
                Some(&instance.instance_id),
                Utc::now(),
            ),
            recorded_at: Utc::now(),
        })
        .await;
        result.instance = instance;

        // 6. Inject
        self.step(6, "Injecting server config");
        let server = inject_config(&result.instance, generate_api_key());
        self.cost(CostSignal {
            subject_id: agent.to_string(),
            model: format!("model:{}", server.model),
            tokens_in: 0,
            tokens_out: 0,
            amount_usd: 0.0,
            idempotency_key: idempotency_key("inject", Some(&server.instance_id), Utc::now()),
            recorded_at: Utc::now(),
        })
        .await;
        self.reporter.success(&format!(
            "endpoint {} (model loaded: {})",
            server.local_endpoint, server.model_loaded
        ));

        // 7. Handoff
        self.step(7, "Handing server to child");
        let recipient = recipient_id(agent, Utc::now());
        let handed = handoff(recipient.clone(), server.clone(), Utc::now());
        self.revenue(RevenueSignal {
            subject_id: agent.to_string(),
            source: "gpu_provisioning".to_string(),
            amount_usd: result.conversion.usd_value,
            description: format!(
                "GPU server delivered to {recipient}: {} via {}",
                result.instance.hardware_tag,
                self.provider.kind()
            ),
            idempotency_key: idempotency_key("handoff", Some(&recipient), Utc::now()),
            recorded_at: Utc::now(),
        })
        .await;
        self.reporter.success(&format!("{recipient} received the server"));
        result.server = server;
        result.handoff = handed;
        Ok(())
    }

    fn step(&self, n: usize, message: &str) {
        tracing::info!(step = n, "{message}");
        self.reporter.step(&format!("[{n}/{STEPS}] {message}"));
    }

    async fn cost(&self, signal: CostSignal) {
        if let Err(err) = self.collaborators.signals.record_cost(&signal).await {
            tracing::warn!(key = %signal.idempotency_key, error = %err, "cost signal dropped");
        }
    }

    async fn revenue(&self, signal: RevenueSignal) {
        if let Err(err) = self.collaborators.signals.record_revenue(&signal).await {
            tracing::warn!(key = %signal.idempotency_key, error = %err, "revenue signal dropped");
        }
    }
}
