//! Background port-forward processes, one slot per instance id.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use tokio::process::Child;

use crate::application::ports::{CommandRunner, TunnelSpec, Tunnels};

/// Holds the tunnel processes opened by this process.
///
/// Children are spawned with `kill_on_drop`, so dropping the manager tears
/// every tunnel down.
pub struct TunnelManager<R> {
    runner: R,
    open: Mutex<HashMap<String, Child>>,
}

impl<R: CommandRunner> TunnelManager<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            open: Mutex::default(),
        }
    }

    pub fn close_all(&self) {
        for (instance_id, mut child) in self.slots().drain() {
            tracing::debug!(instance = %instance_id, "closing tunnel");
            let _ = child.start_kill();
        }
    }

    /// Ids with a live tunnel, sorted.
    #[must_use]
    pub fn open_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.slots().keys().cloned().collect();
        ids.sort();
        ids
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, Child>> {
        self.open.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<R: CommandRunner> Tunnels for TunnelManager<R> {
    fn open(&self, instance_id: &str, spec: &TunnelSpec) -> Result<()> {
        self.close(instance_id);
        let args: Vec<&str> = spec.args.iter().map(String::as_str).collect();
        let child = self.runner.spawn(&spec.program, &args)?;
        tracing::info!(
            instance = instance_id,
            local_port = spec.local_port,
            pid = child.id(),
            "tunnel opened"
        );
        self.slots().insert(instance_id.to_string(), child);
        Ok(())
    }

    fn close(&self, instance_id: &str) {
        if let Some(mut child) = self.slots().remove(instance_id) {
            tracing::info!(instance = instance_id, "closing tunnel");
            let _ = child.start_kill();
        }
    }

    fn is_open(&self, instance_id: &str) -> bool {
        let mut slots = self.slots();
        let exited = match slots.get_mut(instance_id) {
            None => return false,
            Some(child) => !matches!(child.try_wait(), Ok(None)),
        };
        if exited {
            slots.remove(instance_id);
        }
        !exited
    }
}

impl<R> Drop for TunnelManager<R> {
    fn drop(&mut self) {
        let slots = self.open.get_mut().unwrap_or_else(PoisonError::into_inner);
        for (_, mut child) in slots.drain() {
            let _ = child.start_kill();
        }
    }
}
