//! Dejima CLI library — exposes modules for integration testing.
//!
//! An agent pays into the treasury; the payment is checked, converted and
//! charged, a GPU server is provisioned on a cloud VM or a marketplace
//! instance, and its endpoint is handed back to the agent.

#![cfg_attr(test, allow(clippy::expect_used))]

pub mod app;
pub mod application;
pub mod cli;
pub mod commands;
pub mod domain;
pub mod infra;
pub mod output;
