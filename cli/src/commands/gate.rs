//! `dejima gate` — ask whether an agent may reproduce right now.

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::application::services::reproduce::can_reproduce;
use crate::commands::RunFailed;
use crate::output::human::HumanRenderer;

#[derive(Args)]
pub struct GateArgs {
    /// Agent id as registered
    pub agent: String,

    /// Minimum wallet balance (defaults to the configured threshold)
    #[arg(long)]
    pub min_balance: Option<f64>,
}

/// Run `dejima gate`. A denial is reported, then surfaced as [`RunFailed`].
///
/// # Errors
///
/// Returns [`RunFailed`] when the gate denies.
pub async fn run(args: &GateArgs, app: &AppContext) -> Result<()> {
    let threshold = args.min_balance.unwrap_or(app.config.min_reproduce_balance);
    let decision = can_reproduce(&app.registry(), &app.ledger(), &args.agent, threshold).await;

    if app.is_json() {
        crate::output::json::print(&decision)?;
    } else {
        HumanRenderer::new(&app.output).render_gate(&args.agent, &decision);
    }
    if decision.allowed {
        Ok(())
    } else {
        Err(RunFailed(decision.reason).into())
    }
}
