//! Domain layer — pure business logic, types, and validation.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All functions are synchronous and take data in, returning data out.

pub mod config;
pub mod error;
pub mod gate;
pub mod instance;
pub mod payment;
pub mod scripts;
pub mod server;

pub use config::{Credentials, DejimaConfig, ProviderChoice, ReadinessTimings};
pub use error::{Cancelled, ProvisionError, WalletError, is_cancelled};
pub use instance::{
    CloudVmInstance, GpuCandidate, GpuOffer, InstanceHandle, MarketplaceInstance,
    ProvisionedInstance,
};
