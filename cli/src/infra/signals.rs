//! JSON-lines journal implementing the `SignalRecorder` port.

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dejima_common::{CostSignal, RevenueSignal, SignalKind, SignalSummary};
use tokio::sync::Mutex;

use crate::application::ports::SignalRecorder;

fn read_sync(path: &Path) -> Result<Vec<SignalKind>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = std::fs::File::open(path)
        .with_context(|| format!("opening signal journal {}", path.display()))?;
    let mut signals = Vec::new();
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("reading {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(signal) => signals.push(signal),
            Err(e) => tracing::warn!(line = n + 1, error = %e, "skipping malformed signal line"),
        }
    }
    Ok(signals)
}

/// Append `signal` unless its key is already journaled. Returns whether it was written.
fn append_sync(path: &Path, signal: &SignalKind) -> Result<bool> {
    let key = signal.idempotency_key();
    if read_sync(path)?.iter().any(|s| s.idempotency_key() == key) {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }
    let mut line = serde_json::to_string(signal).context("serializing signal")?;
    line.push('\n');
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening signal journal {}", path.display()))?;
    file.write_all(line.as_bytes())
        .with_context(|| format!("appending to {}", path.display()))?;
    Ok(true)
}

/// Per-subject cost and revenue totals, ordered by subject id.
#[must_use]
pub fn summarize(signals: &[SignalKind]) -> Vec<SignalSummary> {
    let mut by_subject: BTreeMap<&str, SignalSummary> = BTreeMap::new();
    for signal in signals {
        let summary = by_subject
            .entry(signal.subject_id())
            .or_insert_with(|| SignalSummary {
                subject_id: signal.subject_id().to_string(),
                ..SignalSummary::default()
            });
        match signal {
            SignalKind::Cost(c) => {
                summary.cost_usd += c.amount_usd;
                summary.tokens += c.tokens_in + c.tokens_out;
                summary.last_model = Some(c.model.clone());
            }
            SignalKind::Revenue(r) => summary.revenue_usd += r.amount_usd,
        }
    }
    by_subject.into_values().collect()
}

pub struct SignalJournal {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl SignalJournal {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    /// Every journaled signal in write order.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal exists but cannot be read.
    pub async fn read_all(&self) -> Result<Vec<SignalKind>> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || read_sync(&path))
            .await
            .context("signal read task panicked")?
    }

    /// # Errors
    ///
    /// Returns an error if the journal exists but cannot be read.
    pub async fn summaries(&self) -> Result<Vec<SignalSummary>> {
        Ok(summarize(&self.read_all().await?))
    }

    async fn append(&self, signal: SignalKind) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.path.clone();
        let key = signal.idempotency_key().to_string();
        let written = tokio::task::spawn_blocking(move || append_sync(&path, &signal))
            .await
            .context("signal write task panicked")??;
        if written {
            tracing::debug!(key = %key, "signal recorded");
        } else {
            tracing::debug!(key = %key, "duplicate signal ignored");
        }
        Ok(())
    }
}

impl SignalRecorder for SignalJournal {
    async fn record_cost(&self, signal: &CostSignal) -> Result<()> {
        self.append(SignalKind::Cost(signal.clone())).await
    }

    async fn record_revenue(&self, signal: &RevenueSignal) -> Result<()> {
        self.append(SignalKind::Revenue(signal.clone())).await
    }
}
