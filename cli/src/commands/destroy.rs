//! `dejima destroy` — tear down an instance handed off earlier.

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::application::ports::ProgressReporter;
use crate::application::services::provision::ProviderAdapter;
use crate::commands::ProviderArg;
use crate::commands::provider::ProviderKit;
use crate::domain::instance::InstanceHandle;

#[derive(Args)]
pub struct DestroyArgs {
    /// Provider the instance runs on
    #[arg(long, value_enum)]
    pub provider: ProviderArg,

    /// Instance name (gcp) or contract id (vast)
    #[arg(long)]
    pub instance: String,

    /// Zone of a gcp instance; every configured zone is tried when omitted
    #[arg(long)]
    pub zone: Option<String>,
}

/// Run `dejima destroy`.
///
/// # Errors
///
/// Returns an error if the provider refuses or the instance cannot be found.
pub async fn run(args: &DestroyArgs, app: &AppContext) -> Result<()> {
    let kit = ProviderKit::new(app);
    match args.provider {
        ProviderArg::Gcp => destroy(app, &kit.cloud_vm(app), args).await?,
        ProviderArg::Vast => destroy(app, &kit.marketplace(app)?, args).await?,
    }
    if app.is_json() {
        crate::output::json::print(&serde_json::json!({
            "destroyed": args.instance,
        }))?;
    }
    Ok(())
}

async fn destroy<P: ProviderAdapter>(
    app: &AppContext,
    adapter: &P,
    args: &DestroyArgs,
) -> Result<()> {
    let handle = InstanceHandle {
        provider: adapter.kind(),
        instance_id: args.instance.clone(),
        region: args.zone.clone(),
    };
    app.terminal_reporter().step(&format!(
        "Destroying {} instance {}",
        handle.provider, handle.instance_id
    ));
    adapter.destroy(&handle).await?;
    app.output.success(&format!("{} destroyed", handle.instance_id));
    Ok(())
}
