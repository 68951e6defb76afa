//! Concrete provider adapters, wired from config and credentials.

use std::path::Path;

use anyhow::{Result, anyhow};

use crate::app::AppContext;
use crate::application::services::provision::{CloudVmAdapter, MarketplaceAdapter};
use crate::infra::command_runner::TokioCommandRunner;
use crate::infra::gcloud::GcloudCli;
use crate::infra::model_client::HttpModelEndpoint;
use crate::infra::ssh::{SshClient, default_ssh_dir, discover_identity, read_public_key};
use crate::infra::tunnel::TunnelManager;
use crate::infra::vast::VastClient;

pub type CloudVm<'a> =
    CloudVmAdapter<'a, GcloudCli<TokioCommandRunner>, TunnelManager<TokioCommandRunner>, HttpModelEndpoint>;

pub type Marketplace<'a> = MarketplaceAdapter<
    'a,
    VastClient,
    SshClient<TokioCommandRunner>,
    TunnelManager<TokioCommandRunner>,
    HttpModelEndpoint,
>;

/// Owns the infrastructure both adapters borrow. Dropping it closes every
/// tunnel it opened.
pub struct ProviderKit {
    pub tunnels: TunnelManager<TokioCommandRunner>,
    models: HttpModelEndpoint,
    gcloud: GcloudCli<TokioCommandRunner>,
    vast: Option<VastClient>,
    shell: SshClient<TokioCommandRunner>,
    public_key: Option<String>,
}

impl ProviderKit {
    #[must_use]
    pub fn new(app: &AppContext) -> Self {
        let configured = app.credentials.ssh_identity.as_deref().map(Path::new);
        let identity = discover_identity(configured, &default_ssh_dir().unwrap_or_default());
        let public_key = identity.as_deref().and_then(|p| match read_public_key(p) {
            Ok(key) => Some(key),
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "no usable public key");
                None
            }
        });
        let vast = app
            .credentials
            .vast_api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .map(|key| VastClient::new(app.config.marketplace.api_base.clone(), key));

        Self {
            tunnels: TunnelManager::new(TokioCommandRunner::default()),
            models: HttpModelEndpoint::default(),
            gcloud: GcloudCli::new(TokioCommandRunner::default(), app.config.cloud.project.clone()),
            vast,
            shell: SshClient::new(TokioCommandRunner::default(), identity.unwrap_or_default()),
            public_key,
        }
    }

    #[must_use]
    pub fn cloud_vm(&self, app: &AppContext) -> CloudVm<'_> {
        CloudVmAdapter::new(&self.gcloud, &self.tunnels, &self.models, app.config.cloud.clone())
    }

    /// # Errors
    ///
    /// Returns an error if no marketplace API key is configured.
    pub fn marketplace(&self, app: &AppContext) -> Result<Marketplace<'_>> {
        let api = self
            .vast
            .as_ref()
            .ok_or_else(|| anyhow!("DEJIMA_VAST_API_KEY is not set"))?;
        Ok(MarketplaceAdapter::new(
            api,
            &self.shell,
            &self.tunnels,
            &self.models,
            app.config.marketplace.clone(),
            self.public_key.clone(),
        ))
    }
}
