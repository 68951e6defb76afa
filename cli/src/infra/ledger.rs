//! File-backed implementation of the `WalletService` port.
//!
//! `LedgerWallet` keeps balances and a transfer log in one JSON file. Writes
//! go through `tokio::task::spawn_blocking` with an atomic temp-file rename so
//! a crash mid-write never leaves a truncated ledger.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use dejima_common::PaymentReceipt;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::application::ports::WalletService;
use crate::domain::error::WalletError;

/// One settled transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub transaction_ref: String,
    pub from: String,
    pub to: String,
    pub amount: f64,
    pub settled_at: DateTime<Utc>,
}

/// On-disk ledger layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    #[serde(default)]
    pub balances: BTreeMap<String, f64>,
    #[serde(default)]
    pub transactions: Vec<LedgerEntry>,
}

impl Ledger {
    /// Move `amount` from `from` to `to`. The receiving address is created on
    /// first credit; the sender must already exist.
    ///
    /// # Errors
    ///
    /// Returns a [`WalletError`] for a non-positive amount, an unknown sender
    /// or an insufficient balance. The ledger is unchanged on error.
    pub fn transfer(&mut self, from: &str, to: &str, amount: f64) -> Result<LedgerEntry, WalletError> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(WalletError::InvalidAmount(amount));
        }
        let available = *self
            .balances
            .get(from)
            .ok_or_else(|| WalletError::UnknownWallet(from.to_string()))?;
        if available < amount {
            return Err(WalletError::InsufficientBalance {
                address: from.to_string(),
                available,
                requested: amount,
            });
        }
        self.balances.insert(from.to_string(), available - amount);
        *self.balances.entry(to.to_string()).or_insert(0.0) += amount;

        let entry = LedgerEntry {
            transaction_ref: format!("tx-{}", uuid::Uuid::new_v4().simple()),
            from: from.to_string(),
            to: to.to_string(),
            amount,
            settled_at: Utc::now(),
        };
        self.transactions.push(entry.clone());
        Ok(entry)
    }
}

fn load_sync(path: &Path) -> Result<Ledger> {
    if !path.exists() {
        return Ok(Ledger::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading ledger {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing ledger {}", path.display()))
}

fn save_sync(path: &Path, ledger: &Ledger) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }
    let content = serde_json::to_string_pretty(ledger).context("serializing ledger")?;

    let temp_path = path.with_extension("json.tmp");
    std::fs::write(&temp_path, &content)
        .with_context(|| format!("writing temp file {}", temp_path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&temp_path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("setting permissions on {}", temp_path.display()))?;
    }

    std::fs::rename(&temp_path, path)
        .with_context(|| format!("finalizing ledger {}", path.display()))
}

pub struct LedgerWallet {
    path: PathBuf,
    // Serialises read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl LedgerWallet {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the whole ledger.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn load(&self) -> Result<Ledger> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || load_sync(&path))
            .await
            .context("ledger load task panicked")?
    }

    async fn save(&self, ledger: Ledger) -> Result<()> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || save_sync(&path, &ledger))
            .await
            .context("ledger save task panicked")?
    }

    /// Credit `address` without a sender; used to seed balances.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be loaded or saved.
    pub async fn deposit(&self, address: &str, amount: f64) -> Result<f64> {
        let _guard = self.write_lock.lock().await;
        let mut ledger = self.load().await?;
        let balance = ledger.balances.entry(address.to_string()).or_insert(0.0);
        *balance += amount;
        let balance = *balance;
        self.save(ledger).await?;
        Ok(balance)
    }
}

impl WalletService for LedgerWallet {
    async fn settle(&self, from: &str, to: &str, amount: f64) -> Result<PaymentReceipt> {
        let _guard = self.write_lock.lock().await;
        let mut ledger = self.load().await?;
        let entry = ledger.transfer(from, to, amount)?;
        self.save(ledger).await?;
        tracing::info!(tx = %entry.transaction_ref, from, to, amount, "settled");
        Ok(PaymentReceipt {
            transaction_ref: entry.transaction_ref,
            treasury_address: entry.to,
            amount_settled: entry.amount,
        })
    }

    async fn balance(&self, address: &str) -> Result<f64> {
        let ledger = self.load().await?;
        let balance = ledger
            .balances
            .get(address)
            .copied()
            .ok_or_else(|| WalletError::UnknownWallet(address.to_string()))?;
        Ok(balance)
    }
}
