//! Unit tests for the seven-step reproduction pipeline.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use dejima_common::{ChargeStatus, ComplianceMethod, ConversionResult, ProviderKind};
use dejima_cli::application::services::pipeline::{
    Collaborators, PaymentPipeline, ReproductionRequest,
};
use dejima_cli::application::services::scope::RunScope;
use dejima_cli::domain::instance::InstanceHandle;

use crate::mocks::{
    FailingSignals, FakeBilling, FakeCompliance, FakeProvider, FakeWallet, ProvisionBehavior,
    RecordingReporter, RecordingSignals,
};

fn request(amount: f64) -> ReproductionRequest {
    ReproductionRequest {
        agent_id: "agent-7".to_string(),
        from_wallet: "wallet-7".to_string(),
        treasury_address: "dejima-treasury".to_string(),
        amount,
        model: "qwen-7b".to_string(),
        local_port: 8001,
    }
}

struct Harness {
    wallet: FakeWallet,
    compliance: FakeCompliance,
    billing: FakeBilling,
    signals: RecordingSignals,
    provider: FakeProvider,
    reporter: RecordingReporter,
}

impl Harness {
    fn new(compliance: FakeCompliance, billing: FakeBilling, behavior: ProvisionBehavior) -> Self {
        Self {
            wallet: FakeWallet::with_balance("wallet-7", 10.0),
            compliance,
            billing,
            signals: RecordingSignals::default(),
            provider: FakeProvider::new(behavior),
            reporter: RecordingReporter::default(),
        }
    }

    fn happy() -> Self {
        Self::new(
            FakeCompliance::Approve,
            FakeBilling::succeeding(),
            ProvisionBehavior::Succeed,
        )
    }

    async fn run(&self, amount: f64, scope: &RunScope) -> dejima_common::PipelineResult {
        let pipeline = PaymentPipeline::new(
            Collaborators {
                wallet: &self.wallet,
                compliance: &self.compliance,
                billing: &self.billing,
                signals: &self.signals,
            },
            &self.provider,
            &self.reporter,
        );
        pipeline.run(&request(amount), scope).await
    }
}

#[tokio::test]
async fn successful_run_fills_every_artifact() {
    let h = Harness::happy();
    let scope = RunScope::new();

    let result = h.run(0.5, &scope).await;

    assert!(result.success, "unexpected failure: {:?}", result.error);
    assert!(result.error.is_none());
    assert_eq!(result.payment.transaction_ref, "tx-0001");
    assert_eq!(result.payment.treasury_address, "dejima-treasury");
    assert!(result.compliance.approved);
    assert_eq!(result.compliance.subject_id, "agent-7");
    assert_eq!(result.compliance.address, "wallet-7");
    assert!((result.conversion.usd_value - 75.0).abs() < 1e-9);
    assert!((result.conversion.target_amount - 75_000.0).abs() < 1e-6);
    assert_eq!(result.charge.status, ChargeStatus::Succeeded);
    assert_eq!(result.charge.charge_ref, "pi_test_123");
    assert_eq!(result.instance.provider, ProviderKind::CloudVm);
    assert_eq!(result.instance.instance_id, "dejima-gpu-1");
    assert_eq!(result.server.instance_id, "dejima-gpu-1");
    assert!(result.server.config_injected);
    assert!(result.server.model_loaded);
    assert!(result.server.issued_api_key.starts_with("sk-dejima-"));
    assert!(result.handoff.recipient_id.starts_with("agent-7-child-"));
    assert_eq!(result.handoff.server_config, result.server);
}

#[tokio::test]
async fn successful_run_settles_from_the_requesting_wallet() {
    let h = Harness::happy();
    h.run(0.5, &RunScope::new()).await;
    assert_eq!(
        h.wallet.settled(),
        vec![("wallet-7".to_string(), "dejima-treasury".to_string(), 0.5)]
    );
    assert_eq!(*h.billing.charged.lock().unwrap(), vec![75_000.0]);
}

#[tokio::test]
async fn successful_run_releases_the_instance_from_the_scope() {
    let h = Harness::happy();
    let scope = RunScope::new();
    let result = h.run(0.5, &scope).await;
    assert!(result.success);
    assert!(scope.tracked().is_empty());
    assert!(h.provider.destroyed().is_empty());
}

#[tokio::test]
async fn successful_run_emits_cost_and_revenue_signals() {
    let h = Harness::happy();
    h.run(0.5, &RunScope::new()).await;

    let costs = h.signals.costs();
    let models: Vec<&str> = costs.iter().map(|c| c.model.as_str()).collect();
    assert_eq!(models, vec!["infrastructure", "gpu:nvidia-tesla-t4", "model:qwen-7b"]);
    assert!((costs[0].amount_usd - 75.0).abs() < 1e-9);
    assert!((costs[1].amount_usd - 0.54).abs() < 1e-9);
    assert!(costs.iter().all(|c| c.subject_id == "agent-7"));

    let revenues = h.signals.revenues();
    let sources: Vec<&str> = revenues.iter().map(|r| r.source.as_str()).collect();
    assert_eq!(sources, vec!["billing", "gpu_provisioning"]);
    assert!((revenues[0].amount_usd - 75_000.0).abs() < 1e-6);
    assert!((revenues[1].amount_usd - 75.0).abs() < 1e-9);

    let mut keys: Vec<&str> = costs
        .iter()
        .map(|c| c.idempotency_key.as_str())
        .chain(revenues.iter().map(|r| r.idempotency_key.as_str()))
        .collect();
    keys.sort_unstable();
    keys.dedup();
    assert_eq!(keys.len(), 5, "idempotency keys must be distinct");
}

#[tokio::test]
async fn successful_run_reports_seven_steps_in_order() {
    let h = Harness::happy();
    h.run(0.5, &RunScope::new()).await;
    let steps: Vec<String> = h
        .reporter
        .lines()
        .into_iter()
        .filter(|l| l.starts_with("step: "))
        .collect();
    assert_eq!(steps.len(), 7);
    assert!(steps[0].contains("[1/7] Settling payment"));
    assert!(steps[6].contains("[7/7] Handing server to child"));
}

#[tokio::test]
async fn settlement_failure_stops_before_compliance() {
    let mut h = Harness::happy();
    h.wallet.fail_settle = true;

    let result = h.run(0.5, &RunScope::new()).await;

    assert!(!result.success);
    let error = result.error.expect("error set");
    assert!(error.contains("settlement failed"), "{error}");
    assert!(!result.compliance.approved);
    assert_eq!(result.conversion, ConversionResult::default());
    assert_eq!(h.provider.provision_calls(), 0);
    assert!(h.signals.costs().is_empty());
}

#[tokio::test]
async fn compliance_rejection_leaves_later_artifacts_at_zero() {
    let h = Harness::new(
        FakeCompliance::Deny,
        FakeBilling::succeeding(),
        ProvisionBehavior::Succeed,
    );

    let result = h.run(0.5, &RunScope::new()).await;

    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("compliance rejected"));
    assert_eq!(result.payment.transaction_ref, "tx-0001");
    assert!(!result.compliance.approved);
    assert_eq!(result.compliance.method, ComplianceMethod::HumanReview);
    assert_eq!(result.conversion, ConversionResult::default());
    assert_eq!(result.charge.charge_ref, "");
    assert_eq!(result.instance.instance_id, "");
    assert!(!result.server.config_injected);
    assert_eq!(result.handoff.recipient_id, "");
    assert!(h.billing.charged.lock().unwrap().is_empty());
    assert_eq!(h.provider.provision_calls(), 0);
}

#[tokio::test]
async fn compliance_error_counts_as_rejection() {
    let h = Harness::new(
        FakeCompliance::Fail,
        FakeBilling::succeeding(),
        ProvisionBehavior::Succeed,
    );

    let result = h.run(0.5, &RunScope::new()).await;

    assert!(!result.success);
    let error = result.error.expect("error set");
    assert!(error.starts_with("compliance rejected"), "{error}");
    assert!(error.contains("screening service unreachable"), "{error}");
    assert_eq!(result.compliance.method, ComplianceMethod::HumanReview);
    assert!(result.compliance.notes.contains("compliance check failed"));
    assert_eq!(h.provider.provision_calls(), 0);
}

#[tokio::test]
async fn billing_outage_is_skipped_and_provisioning_continues() {
    let h = Harness::new(
        FakeCompliance::Approve,
        FakeBilling::failing("billing provider returned 500"),
        ProvisionBehavior::Succeed,
    );

    let result = h.run(0.5, &RunScope::new()).await;

    assert!(result.success, "unexpected failure: {:?}", result.error);
    assert_eq!(result.charge.status, ChargeStatus::Skipped);
    assert_eq!(result.charge.charge_ref, "skipped");
    assert!((result.charge.amount - 75_000.0).abs() < 1e-6);
    assert_eq!(h.provider.provision_calls(), 1);

    let billing = &h.signals.revenues()[0];
    assert_eq!(billing.source, "billing");
    assert!(billing.amount_usd.abs() < f64::EPSILON);
    assert!(
        h.reporter
            .lines()
            .iter()
            .any(|l| l.starts_with("warn: charge skipped"))
    );
}

#[tokio::test]
async fn provisioning_failure_destroys_what_was_created() {
    let h = Harness::new(
        FakeCompliance::Approve,
        FakeBilling::succeeding(),
        ProvisionBehavior::FailAfterCreate,
    );
    let scope = RunScope::new();

    let result = h.run(0.5, &scope).await;

    assert!(!result.success);
    let error = result.error.expect("error set");
    assert!(error.starts_with("provisioning failed"), "{error}");
    assert!(error.contains("did not become running"), "{error}");
    assert_eq!(result.charge.status, ChargeStatus::Succeeded);
    assert_eq!(result.instance.instance_id, "");
    assert_eq!(
        h.provider.destroyed(),
        vec![InstanceHandle {
            provider: ProviderKind::CloudVm,
            instance_id: "dejima-gpu-1".to_string(),
            region: Some("us-central1-b".to_string()),
        }]
    );
    assert!(scope.tracked().is_empty());
}

#[tokio::test]
async fn provisioning_failure_without_instance_destroys_nothing() {
    let h = Harness::new(
        FakeCompliance::Approve,
        FakeBilling::succeeding(),
        ProvisionBehavior::FailEarly,
    );
    let result = h.run(0.5, &RunScope::new()).await;
    assert!(!result.success);
    assert!(h.provider.destroyed().is_empty());
}

#[tokio::test]
async fn cancelled_scope_fails_with_cancelled() {
    let h = Harness::happy();
    let scope = RunScope::new();
    scope.cancel();

    let result = h.run(0.5, &scope).await;

    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("cancelled"));
    assert!(h.wallet.settled().is_empty());
    assert_eq!(h.provider.provision_calls(), 0);
}

#[tokio::test]
async fn cleanup_twice_is_harmless() {
    let h = Harness::new(
        FakeCompliance::Approve,
        FakeBilling::succeeding(),
        ProvisionBehavior::FailAfterCreate,
    );
    let scope = RunScope::new();
    h.run(0.5, &scope).await;

    let pipeline = PaymentPipeline::new(
        Collaborators {
            wallet: &h.wallet,
            compliance: &h.compliance,
            billing: &h.billing,
            signals: &h.signals,
        },
        &h.provider,
        &h.reporter,
    );
    pipeline.cleanup(&scope).await;
    assert_eq!(h.provider.destroyed().len(), 1);
}

#[tokio::test]
async fn unwritable_signal_journal_does_not_affect_the_run() {
    let wallet = FakeWallet::with_balance("wallet-7", 10.0);
    let compliance = FakeCompliance::Approve;
    let billing = FakeBilling::succeeding();
    let provider = FakeProvider::new(ProvisionBehavior::Succeed);
    let reporter = RecordingReporter::default();
    let pipeline = PaymentPipeline::new(
        Collaborators {
            wallet: &wallet,
            compliance: &compliance,
            billing: &billing,
            signals: &FailingSignals,
        },
        &provider,
        &reporter,
    );
    let scope = RunScope::new();

    let result = pipeline.run(&request(0.5), &scope).await;

    assert!(result.success, "unexpected failure: {:?}", result.error);
    assert!(result.error.is_none());
    assert_eq!(result.payment.transaction_ref, "tx-0001");
    assert!(result.compliance.approved);
    assert!((result.conversion.target_amount - 75_000.0).abs() < 1e-6);
    assert_eq!(result.charge.status, ChargeStatus::Succeeded);
    assert_eq!(result.instance.instance_id, "dejima-gpu-1");
    assert!(result.server.config_injected);
    assert!(result.handoff.recipient_id.starts_with("agent-7-child-"));
    assert!(provider.destroyed().is_empty());
}
