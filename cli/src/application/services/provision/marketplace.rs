//! Marketplace provider: rent the cheapest matching offer.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use dejima_common::ProviderKind;

use super::readiness::{bring_up_model, stdout_or_error, verify_gpu};
use super::{ProviderAdapter, ProvisionRequest, REMOTE_CMD_TIMEOUT};
use crate::application::ports::{
    MarketplaceApi, ModelEndpoint, OfferQuery, RemoteShell, RentSpec, SshTarget, Tunnels,
};
use crate::application::services::poll::{PollSpec, pause, poll_until};
use crate::application::services::scope::RunScope;
use crate::domain::config::MarketplaceConfig;
use crate::domain::error::{Cancelled, ProvisionError, is_cancelled};
use crate::domain::instance::{
    InstanceHandle, MarketplaceInstance, ProvisionedInstance, bid_price, select_cheapest,
};
use crate::domain::scripts::marketplace_onstart;

/// Time for an attached key to reach the instance's `authorized_keys`.
pub const KEY_PROPAGATION: Duration = Duration::from_secs(15);

pub struct MarketplaceAdapter<'a, A, S, T, M> {
    api: &'a A,
    shell: &'a S,
    tunnels: &'a T,
    models: &'a M,
    config: MarketplaceConfig,
    public_key: Option<String>,
}

impl<'a, A, S, T, M> MarketplaceAdapter<'a, A, S, T, M>
where
    A: MarketplaceApi,
    S: RemoteShell,
    T: Tunnels,
    M: ModelEndpoint,
{
    pub fn new(
        api: &'a A,
        shell: &'a S,
        tunnels: &'a T,
        models: &'a M,
        config: MarketplaceConfig,
        public_key: Option<String>,
    ) -> Self {
        Self {
            api,
            shell,
            tunnels,
            models,
            config,
            public_key,
        }
    }

    /// Account-level registration so fresh instances accept our key.
    /// Failure only costs us the per-instance attach later on.
    async fn register_account_key(&self, public_key: &str, scope: &RunScope) -> Result<()> {
        let registered = scope
            .guard(async {
                let user_id = self.api.current_user().await?;
                self.api.set_account_key(user_id, public_key).await?;
                Ok::<_, anyhow::Error>(user_id)
            })
            .await;
        match registered {
            Ok(user_id) => tracing::info!(user_id, "SSH key registered on account"),
            Err(err) if is_cancelled(&err) => return Err(err),
            Err(err) => tracing::warn!(error = %err, "SSH key registration failed"),
        }
        Ok(())
    }

    async fn wait_running(&self, instance_id: u64, scope: &RunScope) -> Result<(String, u16)> {
        let timings = &self.config.timings;
        let spec = PollSpec::secs(timings.running_timeout_secs, timings.running_interval_secs);
        let api = self.api;
        let outcome = poll_until(spec, scope.token(), move || async move {
            let listings = match api.list_instances().await {
                Ok(listings) => listings,
                Err(err) => {
                    tracing::debug!(error = %err, "instance listing failed, still waiting");
                    return Ok(None);
                }
            };
            let Some(listing) = listings.into_iter().find(|l| l.id == instance_id) else {
                return Ok(None);
            };
            if listing.has_failed() {
                return Err(ProvisionError::InstanceFailed {
                    instance_id: instance_id.to_string(),
                    message: listing.status_msg.unwrap_or_default(),
                }
                .into());
            }
            Ok(listing
                .ssh_endpoint()
                .map(|(host, port)| (host.to_string(), port)))
        })
        .await?;
        outcome.ready().ok_or_else(|| {
            ProvisionError::NotRunning {
                instance_id: instance_id.to_string(),
                timeout_secs: timings.running_timeout_secs,
            }
            .into()
        })
    }

    async fn attach_key(&self, instance_id: u64, public_key: &str, scope: &RunScope) -> Result<()> {
        match scope.guard(self.api.attach_key(instance_id, public_key)).await {
            Ok(()) => pause(KEY_PROPAGATION, scope.token()).await,
            Err(err) if is_cancelled(&err) => Err(err),
            Err(err) => {
                tracing::warn!(instance_id, error = %err, "SSH key attach failed");
                Ok(())
            }
        }
    }
}

impl<A, S, T, M> ProviderAdapter for MarketplaceAdapter<'_, A, S, T, M>
where
    A: MarketplaceApi,
    S: RemoteShell,
    T: Tunnels,
    M: ModelEndpoint,
{
    fn kind(&self) -> ProviderKind {
        ProviderKind::Marketplace
    }

    async fn provision(
        &self,
        request: &ProvisionRequest,
        scope: &RunScope,
    ) -> Result<ProvisionedInstance> {
        let timings = self.config.timings;
        let public_key = self
            .public_key
            .as_deref()
            .ok_or(ProvisionError::MissingIdentity)?;

        self.register_account_key(public_key, scope).await?;

        let query = OfferQuery {
            min_disk_gb: self.config.min_disk_gb,
            max_hourly_price: self.config.max_hourly_price,
            min_gpu_ram_mb: self.config.min_gpu_ram_mb,
            limit: self.config.search_limit,
        };
        let offers = scope
            .guard(self.api.search_offers(&query))
            .await
            .context("searching GPU offers")?;
        let offer = select_cheapest(&offers, self.config.max_hourly_price)
            .ok_or(ProvisionError::NoOffers {
                max_price: self.config.max_hourly_price,
            })?
            .clone();
        tracing::info!(
            offer = offer.id,
            gpu = %offer.gpu_name,
            price = offer.effective_price(),
            "selected offer"
        );

        let rent = RentSpec {
            image: self.config.image.clone(),
            disk_gb: self.config.disk_gb,
            label: format!("{}-{}", self.config.label, Utc::now().timestamp_millis()),
            onstart: marketplace_onstart(&request.model),
            bid_price: bid_price(&offer),
        };
        if scope.is_cancelled() {
            return Err(Cancelled.into());
        }
        // Left unguarded: the contract id only exists once the call returns,
        // and a rental the API accepted must reach the scope.
        let instance_id = self
            .api
            .create_instance(offer.id, &rent)
            .await
            .with_context(|| format!("renting offer {}", offer.id))?;
        let id = instance_id.to_string();
        scope.track(InstanceHandle {
            provider: ProviderKind::Marketplace,
            instance_id: id.clone(),
            region: offer.geolocation.clone(),
        });
        tracing::info!(instance = instance_id, "instance created");
        if scope.is_cancelled() {
            return Err(Cancelled.into());
        }

        let (ssh_host, ssh_port) = self.wait_running(instance_id, scope).await?;
        tracing::info!(instance = instance_id, host = %ssh_host, port = ssh_port, "instance running");
        let target = SshTarget {
            host: ssh_host.clone(),
            port: ssh_port,
            user: "root".to_string(),
        };

        pause(Duration::from_secs(timings.boot_grace_secs), scope.token()).await?;
        self.attach_key(instance_id, public_key, scope).await?;

        let shell = self.shell;
        let target_ref = &target;
        let verification_output = verify_gpu(&timings, scope.token(), move |attempt| async move {
            tracing::debug!(attempt, "running nvidia-smi");
            let out = shell
                .exec(target_ref, "nvidia-smi", REMOTE_CMD_TIMEOUT)
                .await?;
            stdout_or_error("nvidia-smi", &out)
        })
        .await?;

        let tunnel = self.shell.tunnel_spec(&target, request.local_port);
        let readiness = bring_up_model(
            self.tunnels,
            self.models,
            &id,
            &tunnel,
            &request.model,
            &timings,
            scope.token(),
        )
        .await?;

        Ok(ProvisionedInstance::Marketplace(MarketplaceInstance {
            contract_id: instance_id,
            offer_id: offer.id,
            ssh_host,
            ssh_port,
            gpu_name: offer.gpu_name.clone(),
            hourly_price: offer.effective_price(),
            geolocation: offer.geolocation.clone(),
            verification_output,
            local_port: request.local_port,
            model: request.model.clone(),
            readiness,
            provisioned_at: Utc::now(),
        }))
    }

    async fn destroy(&self, handle: &InstanceHandle) -> Result<()> {
        self.tunnels.close(&handle.instance_id);
        let id: u64 = handle
            .instance_id
            .parse()
            .with_context(|| format!("invalid marketplace instance id {}", handle.instance_id))?;
        self.api
            .destroy(id)
            .await
            .with_context(|| format!("destroying instance {id}"))?;
        tracing::info!(instance = id, "instance destroyed");
        Ok(())
    }
}
