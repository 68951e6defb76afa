//! Command implementations

pub mod convert;
pub mod destroy;
pub mod fund;
pub mod gate;
pub mod provider;
pub mod reproduce;
pub mod signals;
pub mod version;

use clap::ValueEnum;
use thiserror::Error;

use crate::domain::config::ProviderChoice;

/// The command printed its result, but the result is a failure.
///
/// `main` exits with status 2 without printing anything further.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct RunFailed(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProviderArg {
    /// Cloud VM through the gcloud CLI, trying zones in order
    Gcp,
    /// Cheapest marketplace offer through the Vast.ai API
    Vast,
}

impl From<ProviderArg> for ProviderChoice {
    fn from(arg: ProviderArg) -> Self {
        match arg {
            ProviderArg::Gcp => Self::Gcp,
            ProviderArg::Vast => Self::Vast,
        }
    }
}
