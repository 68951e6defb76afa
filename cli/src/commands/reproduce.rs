//! `dejima reproduce` — gate, pay for, provision and hand off a GPU server.

use anyhow::Result;
use clap::Args;
use dejima_common::ProviderKind;

use crate::app::AppContext;
use crate::application::ports::Tunnels;
use crate::application::services::pipeline::{Collaborators, PaymentPipeline};
use crate::application::services::provision::ProviderAdapter;
use crate::application::services::reproduce::{ReproduceOptions, ReproductionOutcome, reproduce};
use crate::application::services::scope::RunScope;
use crate::commands::provider::ProviderKit;
use crate::commands::{ProviderArg, RunFailed};
use crate::domain::config::ProviderChoice;
use crate::output::human::HumanRenderer;

#[derive(Args)]
pub struct ReproduceArgs {
    /// Agent id as registered
    #[arg(long)]
    pub agent: String,

    /// Amount settled into the treasury
    #[arg(long, default_value_t = 0.5)]
    pub amount: f64,

    /// Model to serve (defaults to the configured model)
    #[arg(long)]
    pub model: Option<String>,

    /// Compute provider (defaults to the configured provider)
    #[arg(long, value_enum)]
    pub provider: Option<ProviderArg>,

    /// Local tunnel port
    #[arg(long)]
    pub port: Option<u16>,

    /// Keep the tunnel open until ctrl-c
    #[arg(long)]
    pub hold: bool,
}

/// Run `dejima reproduce`.
///
/// # Errors
///
/// Returns an error if the provider cannot be set up, or [`RunFailed`] once
/// the failed outcome has been printed.
pub async fn run(args: &ReproduceArgs, app: &AppContext) -> Result<()> {
    anyhow::ensure!(
        args.amount.is_finite() && args.amount > 0.0,
        "amount must be positive, got {}",
        args.amount
    );
    let choice = args
        .provider
        .map_or(app.config.default_provider, ProviderChoice::from);
    let opts = ReproduceOptions {
        agent_id: args.agent.clone(),
        amount: args.amount,
        model: args
            .model
            .clone()
            .unwrap_or_else(|| app.config.default_model.clone()),
        local_port: args.port.unwrap_or(app.config.default_local_port),
        treasury_address: app.config.treasury_address.clone(),
        min_balance: app.config.min_reproduce_balance,
    };
    tracing::info!(agent = %opts.agent_id, provider = %choice, amount = opts.amount, "reproduce requested");

    let kit = ProviderKit::new(app);
    let scope = RunScope::new();
    let interrupt = {
        let token = scope.token().clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, cancelling run");
                token.cancel();
            }
        })
    };

    let outcome = match choice {
        ProviderChoice::Gcp => drive(app, &kit.cloud_vm(app), &opts, &scope).await,
        ProviderChoice::Vast => drive(app, &kit.marketplace(app)?, &opts, &scope).await,
    };
    interrupt.abort();

    report(app, &opts.agent_id, &outcome)?;

    let Some(result) = outcome.pipeline.as_ref().filter(|p| p.success) else {
        let reason = outcome.pipeline.as_ref().map_or_else(
            || outcome.gate.reason.clone(),
            |p| p.error.clone().unwrap_or_default(),
        );
        return Err(RunFailed(reason).into());
    };

    if !app.is_json() {
        print_teardown_hint(app, &result.instance);
    }
    if args.hold && kit.tunnels.is_open(&result.instance.instance_id) {
        app.output.info(&format!(
            "Tunnel open at {}. Press ctrl-c to close it.",
            result.instance.local_endpoint
        ));
        tokio::signal::ctrl_c().await?;
        kit.tunnels.close_all();
    } else if !args.hold {
        app.output
            .info("The local tunnel closes when dejima exits; pass --hold to keep it.");
    }
    Ok(())
}

async fn drive<P: ProviderAdapter>(
    app: &AppContext,
    provider: &P,
    opts: &ReproduceOptions,
    scope: &RunScope,
) -> ReproductionOutcome {
    let wallet = app.ledger();
    let compliance = app.compliance();
    let billing = app.billing();
    let signals = app.signals();
    let reporter = app.terminal_reporter();
    let pipeline = PaymentPipeline::new(
        Collaborators {
            wallet: &wallet,
            compliance: &compliance,
            billing: &billing,
            signals: &signals,
        },
        provider,
        &reporter,
    );
    reproduce(&app.registry(), &wallet, &pipeline, opts, scope).await
}

fn report(app: &AppContext, agent_id: &str, outcome: &ReproductionOutcome) -> Result<()> {
    if app.is_json() {
        return crate::output::json::print(outcome);
    }
    let renderer = HumanRenderer::new(&app.output);
    renderer.render_gate(agent_id, &outcome.gate);
    if let Some(result) = &outcome.pipeline {
        renderer.render_pipeline(result);
    }
    Ok(())
}

fn print_teardown_hint(app: &AppContext, instance: &dejima_common::InstanceDescriptor) {
    let command = match instance.provider {
        ProviderKind::CloudVm => format!(
            "dejima destroy --provider gcp --instance {} --zone {}",
            instance.instance_id, instance.region
        ),
        ProviderKind::Marketplace => format!(
            "dejima destroy --provider vast --instance {}",
            instance.instance_id
        ),
    };
    app.output.kv("tear down:", &command);
}
