//! Property-Based Tests for the Broadcaster Cache
//!
//! # Test Properties
//!
//! 1. **FIFO Drain**: a drain returns payloads in publish order
//! 2. **Idempotent Dedup**: re-offering a queued envelope never changes the queue
//! 3. **Drain Then Empty**: a second drain with no new publishes is empty
//! 4. **Fan-out**: broadcast-to-all reaches exactly the active clients

#![cfg(test)]

use std::collections::HashSet;

use proptest::prelude::*;

use super::{BroadcastMessage, BroadcasterCache, CacheMessage, ClientQueue, ClientRef, UuidBroadcasterCache};

const BROADCASTER: &str = "/prop";

fn payloads_strategy() -> impl Strategy<Value = Vec<u32>> {
    prop::collection::vec(any::<u32>(), 0..200)
}

fn clients_strategy() -> impl Strategy<Value = HashSet<String>> {
    prop::collection::hash_set("[a-z]{1,6}", 1..8)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: a drain returns payloads in publish order.
    #[test]
    fn prop_fifo_drain(payloads in payloads_strategy()) {
        let cache: UuidBroadcasterCache<u32> = UuidBroadcasterCache::new();
        let client = ClientRef::new("c");

        for p in &payloads {
            cache.add_to_cache(BROADCASTER, Some(&client), BroadcastMessage::new(*p));
        }

        prop_assert_eq!(cache.retrieve_from_cache(BROADCASTER, &client), payloads);
        prop_assert!(cache.retrieve_from_cache(BROADCASTER, &client).is_empty());
    }

    /// Property: re-offering envelopes already queued leaves the queue unchanged.
    #[test]
    fn prop_idempotent_dedup(
        payloads in payloads_strategy(),
        replays in prop::collection::vec(any::<prop::sample::Index>(), 0..50),
    ) {
        let mut queue = ClientQueue::new();
        let messages: Vec<CacheMessage<u32>> =
            payloads.iter().map(|p| CacheMessage::new(*p)).collect();

        for m in &messages {
            prop_assert!(queue.push_unique(m.clone()));
        }

        if !messages.is_empty() {
            for idx in replays {
                let m = idx.get(&messages);
                prop_assert!(!queue.push_unique(m.clone()));
            }
        }

        prop_assert_eq!(queue.len(), payloads.len());
        prop_assert_eq!(queue.into_payloads(), payloads);
    }

    /// Property: broadcast-to-all reaches every active client and nobody else.
    #[test]
    fn prop_fan_out_to_active_clients(
        active in clients_strategy(),
        payloads in prop::collection::vec(any::<u32>(), 1..20),
    ) {
        let cache: UuidBroadcasterCache<u32> = UuidBroadcasterCache::new();
        for id in &active {
            cache.retrieve_from_cache(BROADCASTER, &ClientRef::new(id.as_str()));
        }

        for p in &payloads {
            cache.add_to_cache(BROADCASTER, None, BroadcastMessage::new(*p));
        }

        for id in &active {
            let drained = cache.retrieve_from_cache(BROADCASTER, &ClientRef::new(id.as_str()));
            prop_assert_eq!(&drained, &payloads);
        }

        // Upper-case ids never collide with the generated lower-case ones
        let outsider = ClientRef::new("OUTSIDER");
        prop_assert!(cache.retrieve_from_cache(BROADCASTER, &outsider).is_empty());
    }
}
