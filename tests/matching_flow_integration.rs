//! Integration tests exercising the leaf-dependency chain the spec lays out:
//! rate-limiter -> cacheable -> the swap inner loop that the active matcher builds trades from.
//!
//! These don't touch the network (the web client itself needs a live upstream), but they drive
//! the public API end-to-end the way a single matching round would, across module boundaries
//! rather than within one file's `#[cfg(test)]` block.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use swapfarm_core::cacheable::{Cacheable, FallbackPolicy, FnResolver};
use swapfarm_core::matcher::swap::run_swap_inner_loop;
use swapfarm_core::rate_limiter::RateLimiterRegistry;

#[tokio::test]
async fn rate_limiter_and_cacheable_compose_under_concurrent_load() {
    // Several "requests" each acquire a rate-limiter permit before resolving a cached api key,
    // mirroring how `WebClient::api_key` sits behind both the rate limiter (for the scrape) and
    // the cacheable (for the result).
    let registry = Arc::new(RateLimiterRegistry::new(2, Duration::from_millis(5)));
    let resolutions = Arc::new(AtomicU32::new(0));
    let resolutions2 = resolutions.clone();

    let cacheable = Arc::new(Cacheable::new(
        FnResolver(move || {
            let resolutions = resolutions2.clone();
            async move {
                resolutions.fetch_add(1, Ordering::SeqCst);
                Ok::<String, anyhow::Error>("DEADBEEF".to_string())
            }
        }),
        Some(Duration::from_secs(60)),
    ));

    let mut handles = Vec::new();
    for _ in 0..6 {
        let registry = registry.clone();
        let cacheable = cacheable.clone();
        handles.push(tokio::spawn(async move {
            let _permit = registry.acquire("community").await;
            cacheable.get(FallbackPolicy::FailedNow).await
        }));
    }

    for h in handles {
        let (ok, key) = h.await.unwrap();
        assert!(ok);
        assert_eq!(key, "DEADBEEF");
    }

    // Single-flight: six concurrent callers resolve the key exactly once.
    assert_eq!(resolutions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn swap_inner_loop_respects_fair_exchange_across_multiple_sets() {
    // Two sets' worth of duplicates on our side, one candidate who can absorb both.
    let mut our_full_cards = HashMap::from([(1u64, 3u32), (2u64, 0u32)]);
    let mut our_tradable_cards = our_full_cards.clone();
    let mut partner_tradable_cards = HashMap::from([(2u64, 2u32)]);

    let mut our_full_emotes = HashMap::from([(10u64, 2u32), (11u64, 0u32)]);
    let mut our_tradable_emotes = our_full_emotes.clone();
    let mut partner_tradable_emotes = HashMap::from([(11u64, 1u32)]);

    let mut items_in_trade = 0u32;

    let cards_plan = run_swap_inner_loop(
        &mut our_full_cards,
        &mut our_tradable_cards,
        &mut partner_tradable_cards,
        &mut items_in_trade,
        255,
    );
    let emotes_plan = run_swap_inner_loop(
        &mut our_full_emotes,
        &mut our_tradable_emotes,
        &mut partner_tradable_emotes,
        &mut items_in_trade,
        255,
    );

    let give_count = cards_plan.class_ids_to_give.len() + emotes_plan.class_ids_to_give.len();
    let receive_count = cards_plan.class_ids_to_receive.len() + emotes_plan.class_ids_to_receive.len();

    // Fair-exchange invariant (spec §8 invariant 2): equal counts on both sides, enforced by
    // construction since each accepted swap pushes exactly one give and one receive id.
    assert_eq!(give_count, receive_count);
    assert!(give_count > 0, "expected at least one swap across the two sets");
    assert_eq!(items_in_trade as usize, give_count + receive_count);

    // Neither set went negative or exceeded its starting full count.
    assert!(our_full_cards.values().all(|&c| c <= 3));
    assert!(our_full_emotes.values().all(|&c| c <= 2));
}
