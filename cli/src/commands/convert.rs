//! `dejima convert` — show what a settlement amount converts to.

use anyhow::Result;
use clap::Args;

use crate::domain::payment::convert;
use crate::output::OutputContext;
use crate::output::human::HumanRenderer;

#[derive(Args)]
pub struct ConvertArgs {
    /// Settlement amount to convert
    pub amount: f64,
}

/// Run `dejima convert`.
///
/// # Errors
///
/// Returns an error if the amount is negative or not finite.
pub fn run(args: &ConvertArgs, ctx: &OutputContext, json: bool) -> Result<()> {
    anyhow::ensure!(
        args.amount.is_finite() && args.amount >= 0.0,
        "amount must be a non-negative number, got {}",
        args.amount
    );
    let conversion = convert(args.amount);
    if json {
        crate::output::json::print(&conversion)
    } else {
        HumanRenderer::new(ctx).render_conversion(&conversion);
        Ok(())
    }
}
