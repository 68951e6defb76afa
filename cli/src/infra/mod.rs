//! Infrastructure layer — concrete implementations of application port traits.
//!
//! This module contains all I/O-performing code: process execution, the cloud
//! CLI, marketplace and billing HTTP clients, SSH and tunnels, and the
//! file-backed ledger, registry and signal journal.
//!
//! Imports from `crate::domain` and `crate::application::ports` are allowed.
//! Imports from `crate::commands` or `crate::output` are forbidden.

pub mod billing;
pub mod command_runner;
pub mod compliance;
pub mod config;
pub mod gcloud;
pub mod ledger;
pub mod model_client;
pub mod registry;
pub mod signals;
pub mod ssh;
pub mod tunnel;
pub mod vast;
