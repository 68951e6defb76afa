//! Payment-side pure functions: conversion and signal idempotency keys.

use chrono::{DateTime, Utc};
use dejima_common::ConversionResult;

/// Simulated spot price of one settlement unit.
pub const SOURCE_UNIT_PRICE_USD: f64 = 150.0;

/// Makes tiny test-network amounts look like real orders.
pub const DEMO_MULTIPLIER: f64 = 1000.0;

/// Convert a settled amount into the target currency.
///
/// Pure: `target_amount == amount * SOURCE_UNIT_PRICE_USD * DEMO_MULTIPLIER`.
#[must_use]
pub fn convert(amount: f64) -> ConversionResult {
    let usd_value = amount * SOURCE_UNIT_PRICE_USD;
    ConversionResult {
        source_amount: amount,
        source_unit_price_usd: SOURCE_UNIT_PRICE_USD,
        usd_value,
        demo_multiplier: DEMO_MULTIPLIER,
        target_amount: usd_value * DEMO_MULTIPLIER,
    }
}

/// Build the idempotency key for a pipeline step's signal.
///
/// Uses the step's natural identifier when one exists; otherwise falls back
/// to a millisecond timestamp so a resend within the same run still collides.
#[must_use]
pub fn idempotency_key(step: &str, natural_id: Option<&str>, now: DateTime<Utc>) -> String {
    match natural_id.filter(|id| !id.is_empty()) {
        Some(id) => format!("{step}:{id}"),
        None => format!("{step}:ts-{}", now.timestamp_millis()),
    }
}
