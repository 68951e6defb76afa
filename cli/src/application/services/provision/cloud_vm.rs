//! Cloud VM provider: ordered candidate fallback over zones and GPU types.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use dejima_common::ProviderKind;

use super::readiness::{bring_up_model, stdout_or_error, verify_gpu};
use super::{ProviderAdapter, ProvisionRequest, REMOTE_CMD_TIMEOUT, SSH_PROBE_TIMEOUT};
use crate::application::ports::{CloudCompute, ModelEndpoint, Tunnels, VmCreateSpec};
use crate::application::services::poll::{PollOutcome, PollSpec, pause, poll_until};
use crate::application::services::scope::RunScope;
use crate::domain::config::CloudConfig;
use crate::domain::error::{Cancelled, ProvisionError};
use crate::domain::instance::{
    CloudVmInstance, GpuCandidate, InstanceHandle, ProvisionedInstance, is_resource_exhausted,
};
use crate::domain::scripts::cloud_startup_script;

pub struct CloudVmAdapter<'a, C, T, M> {
    compute: &'a C,
    tunnels: &'a T,
    models: &'a M,
    config: CloudConfig,
}

impl<'a, C, T, M> CloudVmAdapter<'a, C, T, M>
where
    C: CloudCompute,
    T: Tunnels,
    M: ModelEndpoint,
{
    pub fn new(compute: &'a C, tunnels: &'a T, models: &'a M, config: CloudConfig) -> Self {
        Self {
            compute,
            tunnels,
            models,
            config,
        }
    }

    /// Try each candidate in order; the first that accepts the request wins.
    async fn create_first_available(
        &self,
        name: &str,
        startup_script: &str,
        scope: &RunScope,
    ) -> Result<GpuCandidate> {
        for candidate in &self.config.candidates {
            tracing::info!(
                zone = %candidate.zone,
                gpu = %candidate.gpu_type,
                machine = %candidate.machine_type,
                "trying GPU candidate"
            );
            let spec = VmCreateSpec {
                name,
                zone: &candidate.zone,
                machine_type: &candidate.machine_type,
                gpu_type: &candidate.gpu_type,
                image_family: &self.config.image_family,
                image_project: &self.config.image_project,
                boot_disk_gb: self.config.boot_disk_gb,
                startup_script,
            };
            if scope.is_cancelled() {
                return Err(Cancelled.into());
            }
            // Tracked before the request goes out: a cancel or timeout mid-call
            // can leave a VM behind that only cleanup knows about.
            scope.track(InstanceHandle {
                provider: ProviderKind::CloudVm,
                instance_id: name.to_string(),
                region: Some(candidate.zone.clone()),
            });
            let output = scope
                .guard(self.compute.create(&spec))
                .await
                .with_context(|| format!("creating {name} in {}", candidate.zone))?;
            if output.status.success() {
                return Ok(candidate.clone());
            }
            scope.release(name);
            let detail = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if is_resource_exhausted(&detail) {
                tracing::warn!(zone = %candidate.zone, "zone exhausted, trying next candidate");
                continue;
            }
            return Err(ProvisionError::CreateFailed {
                region: candidate.zone.clone(),
                detail,
            }
            .into());
        }
        Err(ProvisionError::CandidatesExhausted {
            tried: self.config.candidates.len(),
        }
        .into())
    }

    async fn wait_running(&self, name: &str, zone: &str, scope: &RunScope) -> Result<String> {
        let timings = &self.config.timings;
        let spec = PollSpec::secs(timings.running_timeout_secs, timings.running_interval_secs);
        let compute = self.compute;
        let outcome = poll_until(spec, scope.token(), move || async move {
            match compute.describe(name, zone).await {
                Ok(status) if status.status == "RUNNING" => Ok(status.external_ip),
                Ok(status) => {
                    tracing::debug!(status = %status.status, "instance not running yet");
                    Ok(None)
                }
                Err(err) => {
                    tracing::debug!(error = %err, "describe failed, still waiting");
                    Ok(None)
                }
            }
        })
        .await?;
        outcome.ready().ok_or_else(|| {
            ProvisionError::NotRunning {
                instance_id: name.to_string(),
                timeout_secs: timings.running_timeout_secs,
            }
            .into()
        })
    }

    /// Degraded on timeout: the verification step records its own failure.
    async fn wait_ssh(&self, name: &str, zone: &str, scope: &RunScope) -> Result<()> {
        let timings = &self.config.timings;
        let spec = PollSpec::secs(timings.ssh_timeout_secs, timings.ssh_interval_secs);
        let compute = self.compute;
        let outcome = poll_until(spec, scope.token(), move || async move {
            match compute.ssh(name, zone, "echo ok", SSH_PROBE_TIMEOUT).await {
                Ok(out) if out.status.success() => Ok(Some(())),
                _ => Ok(None),
            }
        })
        .await?;
        if outcome == PollOutcome::TimedOut {
            tracing::warn!(instance = name, "SSH never became ready, continuing");
        }
        Ok(())
    }
}

impl<C, T, M> ProviderAdapter for CloudVmAdapter<'_, C, T, M>
where
    C: CloudCompute,
    T: Tunnels,
    M: ModelEndpoint,
{
    fn kind(&self) -> ProviderKind {
        ProviderKind::CloudVm
    }

    async fn provision(
        &self,
        request: &ProvisionRequest,
        scope: &RunScope,
    ) -> Result<ProvisionedInstance> {
        let timings = self.config.timings;
        let name = format!(
            "{}-{}",
            self.config.instance_prefix,
            Utc::now().timestamp_millis()
        );
        let script = cloud_startup_script(&request.model);

        let candidate = self.create_first_available(&name, &script, scope).await?;
        let zone = candidate.zone.as_str();
        tracing::info!(instance = %name, zone, gpu = %candidate.gpu_type, "instance created");

        let external_ip = self.wait_running(&name, zone, scope).await?;
        tracing::info!(instance = %name, ip = %external_ip, "instance running");

        pause(Duration::from_secs(timings.boot_grace_secs), scope.token()).await?;
        self.wait_ssh(&name, zone, scope).await?;

        let compute = self.compute;
        let name_ref = name.as_str();
        let verification_output = verify_gpu(&timings, scope.token(), move |attempt| async move {
            tracing::debug!(attempt, "running nvidia-smi");
            let out = compute
                .ssh(name_ref, zone, "nvidia-smi", REMOTE_CMD_TIMEOUT)
                .await?;
            stdout_or_error("nvidia-smi", &out)
        })
        .await?;

        let tunnel = self.compute.tunnel_spec(&name, zone, request.local_port);
        let readiness = bring_up_model(
            self.tunnels,
            self.models,
            &name,
            &tunnel,
            &request.model,
            &timings,
            scope.token(),
        )
        .await?;

        Ok(ProvisionedInstance::CloudVm(CloudVmInstance {
            instance_name: name,
            zone: candidate.zone,
            machine_type: candidate.machine_type,
            gpu_type: candidate.gpu_type,
            external_ip,
            hourly_price: candidate.hourly_price,
            verification_output,
            local_port: request.local_port,
            model: request.model.clone(),
            readiness,
            provisioned_at: Utc::now(),
        }))
    }

    async fn destroy(&self, handle: &InstanceHandle) -> Result<()> {
        self.tunnels.close(&handle.instance_id);

        let mut zones: Vec<&str> = Vec::new();
        match handle.region.as_deref() {
            Some(zone) => zones.push(zone),
            None => {
                for c in &self.config.candidates {
                    if !zones.contains(&c.zone.as_str()) {
                        zones.push(&c.zone);
                    }
                }
            }
        }

        for zone in zones {
            match self.compute.delete(&handle.instance_id, zone).await {
                Ok(out) if out.status.success() => {
                    tracing::info!(instance = %handle.instance_id, zone, "instance deleted");
                    return Ok(());
                }
                Ok(out) => tracing::debug!(
                    zone,
                    stderr = %String::from_utf8_lossy(&out.stderr).trim(),
                    "delete refused"
                ),
                Err(err) => tracing::debug!(zone, error = %err, "delete failed"),
            }
        }
        anyhow::bail!(
            "could not delete {}, it may need manual cleanup",
            handle.instance_id
        )
    }
}
