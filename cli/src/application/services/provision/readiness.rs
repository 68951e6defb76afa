//! Steps shared by every provider once an instance is reachable:
//! GPU verification, the model tunnel, the model poll and the probe.

use std::future::Future;
use std::process::Output;
use std::time::Duration;

use anyhow::Result;
use dejima_common::ReadinessState;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{ModelEndpoint, TunnelSpec, Tunnels};
use crate::application::services::poll::{PollSpec, PollOutcome, pause, poll_until, retry_fixed};
use crate::domain::config::ReadinessTimings;
use crate::domain::error::{Cancelled, is_cancelled};
use crate::domain::instance::local_endpoint;

/// Prompt sent once the model answers `/v1/models`.
pub const PROBE_PROMPT: &str = "Reply with exactly: DEJIMA_ONLINE";

/// Stdout of a successful command, or an error naming what failed.
///
/// # Errors
///
/// Returns an error if the command exited non-zero.
pub fn stdout_or_error(what: &str, output: &Output) -> Result<String> {
    if output.status.success() {
        return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    anyhow::bail!(
        "{what} exited with {}: {}",
        output.status.code().unwrap_or(-1),
        stderr.trim()
    )
}

/// Run the GPU listing until it succeeds or attempts run out.
///
/// Exhaustion is not an error: the returned text records the failure
/// instead, so the instance is still handed over.
///
/// # Errors
///
/// Only cancellation is returned.
pub async fn verify_gpu<F, Fut>(
    timings: &ReadinessTimings,
    cancel: &CancellationToken,
    run: F,
) -> Result<String>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<String>>,
{
    let attempts = timings.verify_attempts.max(1);
    match retry_fixed(
        attempts,
        Duration::from_secs(timings.verify_backoff_secs),
        cancel,
        run,
    )
    .await
    {
        Ok(output) => Ok(output),
        Err(err) if is_cancelled(&err) => Err(err),
        Err(err) => {
            tracing::warn!(attempts, error = %err, "GPU verification failed");
            Ok(format!(
                "[verification failed after {attempts} attempts: {err}]"
            ))
        }
    }
}

/// Open the tunnel, wait for the model and send one probe request.
///
/// Returns `Ready` when the model list came back non-empty before the
/// deadline, otherwise `ModelLoading`. A tunnel that cannot be opened leaves
/// the model unreachable from here, which also reads as `ModelLoading`.
///
/// # Errors
///
/// Only cancellation is returned.
pub async fn bring_up_model(
    tunnels: &impl Tunnels,
    models: &impl ModelEndpoint,
    instance_id: &str,
    tunnel: &TunnelSpec,
    model: &str,
    timings: &ReadinessTimings,
    cancel: &CancellationToken,
) -> Result<ReadinessState> {
    if let Err(err) = tunnels.open(instance_id, tunnel) {
        tracing::warn!(instance = instance_id, error = %err, "could not open model tunnel");
        return Ok(ReadinessState::ModelLoading);
    }
    tracing::info!(
        instance = instance_id,
        local_port = tunnel.local_port,
        "tunnel open, waiting for model"
    );
    pause(Duration::from_secs(timings.tunnel_settle_secs), cancel).await?;

    let endpoint = local_endpoint(tunnel.local_port);
    let base = endpoint.as_str();
    let spec = PollSpec::secs(timings.model_timeout_secs, timings.model_interval_secs);
    let loaded = poll_until(spec, cancel, move || async move {
        match models.list_models(base).await {
            Ok(ids) => Ok(ids.into_iter().next()),
            Err(err) => {
                tracing::debug!(error = %err, "model endpoint not ready");
                Ok(None)
            }
        }
    })
    .await?;

    let PollOutcome::Ready(loaded_id) = loaded else {
        tracing::warn!(
            instance = instance_id,
            timeout_secs = timings.model_timeout_secs,
            "model still loading at deadline"
        );
        return Ok(ReadinessState::ModelLoading);
    };
    tracing::info!(instance = instance_id, model = %loaded_id, "model loaded");

    let probe_timeout = Duration::from_secs(timings.probe_timeout_secs);
    let probe = tokio::select! {
        () = cancel.cancelled() => return Err(Cancelled.into()),
        r = models.chat_probe(base, model, PROBE_PROMPT, probe_timeout) => r,
    };
    match probe {
        Ok(reply) => tracing::info!(reply = reply.trim(), "probe answered"),
        Err(err) => tracing::warn!(error = %err, "probe request failed"),
    }
    Ok(ReadinessState::Ready)
}
