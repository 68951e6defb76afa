//! `dejima fund` — credit a ledger address, the local stand-in for a faucet.

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;

#[derive(Args)]
pub struct FundArgs {
    /// Wallet address to credit
    pub address: String,

    /// Amount to add
    pub amount: f64,
}

/// Run `dejima fund`.
///
/// # Errors
///
/// Returns an error if the amount is not positive or the ledger cannot be written.
pub async fn run(args: &FundArgs, app: &AppContext) -> Result<()> {
    anyhow::ensure!(
        args.amount.is_finite() && args.amount > 0.0,
        "amount must be positive, got {}",
        args.amount
    );
    let ledger = app.ledger();
    let balance = ledger.deposit(&args.address, args.amount).await?;

    if app.is_json() {
        crate::output::json::print(&serde_json::json!({
            "address": args.address,
            "balance": balance,
        }))
    } else {
        app.output
            .success(&format!("{} balance is now {balance:.4}", args.address));
        app.output.kv("ledger:", &ledger.path().display().to_string());
        Ok(())
    }
}
