//! GPU provisioning use-case: the provider adapter contract and its two
//! implementations.
//!
//! Both adapters follow the same shape: acquire an instance, wait for it to
//! run, verify the GPU over SSH, tunnel to the model port and wait for the
//! model. Only acquisition and the running wait are fatal; everything after
//! that degrades the returned readiness instead.

use std::time::Duration;

use anyhow::Result;
use dejima_common::ProviderKind;

use crate::application::services::scope::RunScope;
use crate::domain::instance::{InstanceHandle, ProvisionedInstance};

pub mod cloud_vm;
pub mod marketplace;
pub mod readiness;

pub use cloud_vm::CloudVmAdapter;
pub use marketplace::MarketplaceAdapter;

/// Each command executed on a remote instance.
pub const REMOTE_CMD_TIMEOUT: Duration = Duration::from_secs(30);

/// The `echo ok` probe used while waiting for SSH to accept connections.
pub const SSH_PROBE_TIMEOUT: Duration = Duration::from_secs(20);

/// What the caller wants running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionRequest {
    pub model: String,
    /// Local end of the model tunnel.
    pub local_port: u16,
}

/// A compute provider able to stand up (and tear down) a model server.
#[allow(async_fn_in_trait)]
pub trait ProviderAdapter {
    fn kind(&self) -> ProviderKind;

    /// Provision an instance for `request`.
    ///
    /// Every instance created along the way is registered with `scope` the
    /// moment it exists, so the caller can tear it down on failure.
    ///
    /// # Errors
    ///
    /// Returns an error if no instance could be acquired, it never reached a
    /// running state, or the scope was cancelled.
    async fn provision(
        &self,
        request: &ProvisionRequest,
        scope: &RunScope,
    ) -> Result<ProvisionedInstance>;

    /// Close the instance's tunnel and delete the instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider refused the deletion.
    async fn destroy(&self, handle: &InstanceHandle) -> Result<()>;
}
