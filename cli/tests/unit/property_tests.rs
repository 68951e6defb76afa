//! Property-based tests for conversion, offer selection and candidate order.
//!
//! Uses `proptest` to verify invariants across many random inputs.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::HashMap;

use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use dejima_cli::application::services::provision::{
    CloudVmAdapter, ProviderAdapter, ProvisionRequest,
};
use dejima_cli::application::services::scope::RunScope;
use dejima_cli::domain::instance::{ProvisionedInstance, select_cheapest};
use dejima_cli::domain::payment::{
    DEMO_MULTIPLIER, SOURCE_UNIT_PRICE_USD, convert, idempotency_key,
};
use dejima_cli::domain::server::{generate_api_key, recipient_id};

use crate::helpers::{EXHAUSTED, candidate, cloud_config, err_output, offer};
use crate::mocks::{FakeCloud, FakeModels, FakeTunnels};

// ============================================================================
// convert() property tests
// ============================================================================

proptest! {
    /// usd_value = amount × unit price and target = usd_value × multiplier.
    #[test]
    fn prop_conversion_is_linear(amount in 0.0f64..1_000_000.0) {
        let c = convert(amount);
        prop_assert!((c.source_amount - amount).abs() < f64::EPSILON);
        prop_assert!((c.usd_value - amount * SOURCE_UNIT_PRICE_USD).abs() <= 1e-6 * c.usd_value.max(1.0));
        prop_assert!((c.target_amount - c.usd_value * DEMO_MULTIPLIER).abs() <= 1e-6 * c.target_amount.max(1.0));
        prop_assert!((c.source_unit_price_usd - SOURCE_UNIT_PRICE_USD).abs() < f64::EPSILON);
        prop_assert!((c.demo_multiplier - DEMO_MULTIPLIER).abs() < f64::EPSILON);
    }

    /// Larger settlements never convert to less.
    #[test]
    fn prop_conversion_is_monotonic(a in 0.0f64..10_000.0, b in 0.0f64..10_000.0) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(convert(lo).target_amount <= convert(hi).target_amount);
    }
}

// ============================================================================
// select_cheapest() property tests
// ============================================================================

proptest! {
    /// The chosen offer is never more expensive than any other, and ties go
    /// to the earliest listing.
    #[test]
    fn prop_cheapest_offer_is_minimal(prices in prop::collection::vec(prop::option::of(0.01f64..5.0), 1..20)) {
        let offers: Vec<_> = prices
            .iter()
            .enumerate()
            .map(|(i, p)| offer(i as u64, *p, "RTX"))
            .collect();
        let chosen = select_cheapest(&offers, f64::INFINITY).expect("non-empty");
        for o in &offers {
            prop_assert!(chosen.effective_price() <= o.effective_price());
        }
        let first_at_min = offers
            .iter()
            .find(|o| o.effective_price().total_cmp(&chosen.effective_price()).is_eq())
            .unwrap();
        prop_assert_eq!(first_at_min.id, chosen.id);
    }

    /// Whatever the listings say, nothing above the ceiling is chosen.
    #[test]
    fn prop_cheapest_offer_respects_the_ceiling(
        prices in prop::collection::vec(prop::option::of(0.01f64..5.0), 0..20),
        ceiling in 0.01f64..5.0,
    ) {
        let offers: Vec<_> = prices
            .iter()
            .enumerate()
            .map(|(i, p)| offer(i as u64, *p, "RTX"))
            .collect();
        let affordable = offers.iter().any(|o| o.effective_price() <= ceiling);
        match select_cheapest(&offers, ceiling) {
            Some(chosen) => prop_assert!(chosen.effective_price() <= ceiling),
            None => prop_assert!(!affordable),
        }
    }
}

#[test]
fn test_no_offers_selects_nothing() {
    assert!(select_cheapest(&[], 1.0).is_none());
}

// ============================================================================
// Candidate fallback property tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// With the first `k` zones exhausted, the instance lands in zone `k` and
    /// no later zone is ever tried.
    #[test]
    fn prop_first_available_candidate_wins(total in 1usize..6, exhausted in 0usize..6) {
        let exhausted = exhausted.min(total - 1);
        let candidates: Vec<_> = (0..total)
            .map(|i| candidate(&format!("zone-{i}"), "nvidia-tesla-t4", 0.54))
            .collect();
        let cloud = FakeCloud {
            create_results: (0..exhausted)
                .map(|i| (format!("zone-{i}"), err_output(1, EXHAUSTED)))
                .collect::<HashMap<_, _>>(),
            ..FakeCloud::default()
        };
        let tunnels = FakeTunnels::default();
        let models = FakeModels::ready();
        let adapter = CloudVmAdapter::new(&cloud, &tunnels, &models, cloud_config(candidates));

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();
        let request = ProvisionRequest { model: "m".to_string(), local_port: 8001 };
        let instance = rt
            .block_on(adapter.provision(&request, &RunScope::new()))
            .unwrap();

        let ProvisionedInstance::CloudVm(vm) = instance else {
            panic!("expected a cloud VM");
        };
        prop_assert_eq!(vm.zone, format!("zone-{exhausted}"));
        prop_assert_eq!(cloud.created_in().len(), exhausted + 1);
    }
}

// ============================================================================
// Identifier property tests
// ============================================================================

proptest! {
    /// A natural id always wins over the timestamp fallback.
    #[test]
    fn prop_idempotency_key_prefers_natural_id(step in "[a-z]{1,10}", id in "[a-zA-Z0-9_-]{1,24}") {
        let key = idempotency_key(&step, Some(&id), Utc::now());
        prop_assert_eq!(key, format!("{step}:{id}"));
    }

    /// Recipient ids keep the agent as prefix for any timestamp.
    #[test]
    fn prop_recipient_id_is_prefixed(agent in "[a-z0-9-]{1,16}", millis in 0i64..4_000_000_000_000) {
        let now = Utc.timestamp_millis_opt(millis).unwrap();
        let id = recipient_id(&agent, now);
        let prefix = format!("{agent}-child-");
        prop_assert!(id.starts_with(&prefix), "{}", id);
        let suffix = &id[prefix.len()..];
        prop_assert!(!suffix.is_empty());
        prop_assert!(suffix.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }
}

#[test]
fn test_empty_natural_id_falls_back_to_timestamp() {
    let now = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
    assert_eq!(idempotency_key("inject", Some(""), now), "inject:ts-1700000000000");
    assert_eq!(idempotency_key("inject", None, now), "inject:ts-1700000000000");
}

#[test]
fn test_api_key_uniqueness_batch() {
    let keys: std::collections::HashSet<_> = (0..100).map(|_| generate_api_key()).collect();
    assert_eq!(keys.len(), 100, "duplicate API keys generated");
    assert!(keys.iter().all(|k| k.len() == "sk-dejima-".len() + 12));
}
