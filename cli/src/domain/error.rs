//! Typed domain error enums.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All error types implement `thiserror::Error` and convert to `anyhow::Error`
//! via the `?` operator.

use thiserror::Error;

// ── Provisioning errors ───────────────────────────────────────────────────────

/// Fatal provisioning failures. Everything else a provider adapter runs into
/// degrades the readiness state instead of surfacing here.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("all GPU candidates exhausted, no GPU instances available right now ({tried} tried)")]
    CandidatesExhausted { tried: usize },

    #[error("failed to create instance in {region}: {detail}")]
    CreateFailed { region: String, detail: String },

    #[error("instance {instance_id} did not become running within {timeout_secs}s")]
    NotRunning {
        instance_id: String,
        timeout_secs: u64,
    },

    #[error("instance {instance_id} entered error state: {message}")]
    InstanceFailed {
        instance_id: String,
        message: String,
    },

    #[error("no GPU offers available right now with enough memory under ${max_price:.2}/hr")]
    NoOffers { max_price: f64 },

    #[error("no SSH identity found, run: ssh-keygen -t ed25519")]
    MissingIdentity,
}

// ── Wallet errors ─────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("insufficient balance in {address}: {available:.4} available, {requested:.4} requested")]
    InsufficientBalance {
        address: String,
        available: f64,
        requested: f64,
    },

    #[error("unknown wallet {0}")]
    UnknownWallet(String),

    #[error("invalid settlement amount {0}")]
    InvalidAmount(f64),
}

// ── Cancellation ──────────────────────────────────────────────────────────────

/// Raised at a suspension point once the run's cancellation token fires.
///
/// Callers detect it with `err.downcast_ref::<Cancelled>()`.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("cancelled")]
pub struct Cancelled;

/// Returns `true` if `err` (or any error in its chain) is a cancellation.
#[must_use]
pub fn is_cancelled(err: &anyhow::Error) -> bool {
    err.chain().any(|e| e.downcast_ref::<Cancelled>().is_some())
}
