//! Broadcache Integration Tests
//!
//! End-to-end behavior of the cache as the broadcaster and transport layer
//! drive it:
//! - Publish / drain / acknowledge flow
//! - Scheduled idle-client eviction on shared and dedicated schedulers
//! - Sweep rescheduling
//! - Concurrent publishers and drains

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use broadcache::cache::{CacheConfig, SchedulerKind};
use broadcache::{
    BroadcastMessage, BroadcasterCache, ClientRef, TaskScheduler, Transport, UuidBroadcasterCache,
};

const BROADCASTER: &str = "/news";

fn msg(s: &str) -> BroadcastMessage<String> {
    BroadcastMessage::new(s.to_string())
}

fn fast_config(shared: bool) -> CacheConfig {
    CacheConfig {
        shared,
        client_idle_time: Duration::from_millis(100),
        invalidate_cache_interval: Duration::from_millis(50),
    }
}

// =============================================================================
// Delivery flow
// =============================================================================

mod delivery_tests {
    use super::*;

    #[test]
    fn test_long_polling_reconnect_cycle() {
        let cache: UuidBroadcasterCache<String> = UuidBroadcasterCache::new();
        let client = ClientRef::with_transport("lp-1", Transport::LongPolling);
        assert!(client.transport().is_resumable());

        // First poll registers the client
        assert!(cache.retrieve_from_cache(BROADCASTER, &client).is_empty());

        // Published while the client is between requests
        cache.add_to_cache(BROADCASTER, None, msg("a"));
        cache.add_to_cache(BROADCASTER, None, msg("b"));

        assert_eq!(cache.retrieve_from_cache(BROADCASTER, &client), vec!["a", "b"]);
        assert!(cache.retrieve_from_cache(BROADCASTER, &client).is_empty());
    }

    #[test]
    fn test_acknowledgment_after_drain() {
        let cache: UuidBroadcasterCache<String> = UuidBroadcasterCache::new();
        let client = ClientRef::new("c");

        let m1 = cache.add_to_cache(BROADCASTER, Some(&client), msg("m1"));
        let m2 = cache.add_to_cache(BROADCASTER, Some(&client), msg("m2"));
        assert_eq!(
            cache.retrieve_from_cache(BROADCASTER, &client),
            vec!["m1", "m2"]
        );

        let m3 = cache.add_to_cache(BROADCASTER, Some(&client), msg("m3"));
        cache.clear_cache(BROADCASTER, &client, Some(&m1));

        let remaining = cache.messages();
        let queue = &remaining["c"];
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0], m3);
        assert!(!queue.contains(&m2));
    }

    #[test]
    fn test_dyn_cache_usage() {
        let cache: Arc<dyn BroadcasterCache<String>> =
            Arc::new(UuidBroadcasterCache::<String>::new());
        let client = ClientRef::new("c");

        cache.add_inspector(Arc::new(|m: &BroadcastMessage<String>| m.payload != "spam"));
        cache.add_to_cache(BROADCASTER, Some(&client), msg("spam"));
        cache.add_to_cache(BROADCASTER, Some(&client), msg("ham"));

        assert_eq!(cache.retrieve_from_cache(BROADCASTER, &client), vec!["ham"]);
    }

    #[test]
    fn test_concurrent_publish_and_drain_loses_nothing() {
        let cache: Arc<UuidBroadcasterCache<u64>> = Arc::new(UuidBroadcasterCache::new());
        let client = ClientRef::new("c");
        let per_publisher = 2_000u64;

        let received = crossbeam::thread::scope(|s| {
            for p in 0..4u64 {
                let cache = Arc::clone(&cache);
                let client = client.clone();
                s.spawn(move |_| {
                    for i in 0..per_publisher {
                        cache.add_to_cache(
                            BROADCASTER,
                            Some(&client),
                            BroadcastMessage::new(p * per_publisher + i),
                        );
                    }
                });
            }

            let drainer = {
                let cache = Arc::clone(&cache);
                let client = client.clone();
                s.spawn(move |_| {
                    let mut seen = Vec::new();
                    for _ in 0..200 {
                        seen.extend(cache.retrieve_from_cache(BROADCASTER, &client));
                        std::thread::yield_now();
                    }
                    seen
                })
            };
            drainer.join().unwrap()
        })
        .unwrap();

        let mut all = received;
        all.extend(cache.retrieve_from_cache(BROADCASTER, &client));

        // Every message exactly once
        assert_eq!(all.len() as u64, 4 * per_publisher);
        let unique: HashSet<u64> = all.iter().copied().collect();
        assert_eq!(unique.len() as u64, 4 * per_publisher);
    }
}

// =============================================================================
// Scheduled eviction
// =============================================================================

mod eviction_tests {
    use super::*;

    async fn idle_client_scenario(shared: bool) {
        let cache: UuidBroadcasterCache<String> =
            UuidBroadcasterCache::with_config(&fast_config(shared)).unwrap();
        cache.start().unwrap();

        let x = ClientRef::new("X");
        cache.add_to_cache(BROADCASTER, Some(&x), msg("hello"));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.retrieve_from_cache(BROADCASTER, &x), vec!["hello"]);
        assert!(cache.is_active("X"));

        tokio::time::sleep(Duration::from_millis(220)).await;
        assert!(!cache.is_active("X"));
        assert!(!cache.messages().contains_key("X"));
        assert!(cache.metrics().sweeps >= 2);

        cache.stop();
    }

    #[tokio::test]
    async fn test_idle_client_evicted_shared_scheduler() {
        idle_client_scenario(true).await;
    }

    #[tokio::test]
    async fn test_idle_client_evicted_dedicated_scheduler() {
        idle_client_scenario(false).await;
    }

    #[tokio::test]
    async fn test_evicted_backlog_is_gone() {
        let cache: UuidBroadcasterCache<String> =
            UuidBroadcasterCache::with_config(&fast_config(true)).unwrap();
        cache.start().unwrap();

        let client = ClientRef::new("gone");
        cache.add_to_cache(BROADCASTER, Some(&client), msg("never delivered"));

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(cache.retrieve_from_cache(BROADCASTER, &client).is_empty());

        cache.stop();
    }

    #[tokio::test]
    async fn test_active_client_survives_sweeps() {
        let cache: UuidBroadcasterCache<String> =
            UuidBroadcasterCache::with_config(&fast_config(true)).unwrap();
        cache.start().unwrap();

        let client = ClientRef::new("busy");
        for i in 0..8 {
            cache.add_to_cache(BROADCASTER, Some(&client), msg(&format!("m{}", i)));
            tokio::time::sleep(Duration::from_millis(40)).await;
        }

        assert_eq!(cache.retrieve_from_cache(BROADCASTER, &client).len(), 8);
        cache.stop();
    }
}

// =============================================================================
// Scheduler lifecycle
// =============================================================================

mod scheduler_tests {
    use super::*;

    #[tokio::test]
    async fn test_reschedule_while_running() {
        let cache: UuidBroadcasterCache<String> =
            UuidBroadcasterCache::with_config(&fast_config(true)).unwrap();
        cache.start().unwrap();
        assert!(cache.is_started());

        // Effectively disable sweeping
        cache
            .set_invalidate_cache_interval(Duration::from_secs(3600))
            .unwrap();
        assert!(cache.is_started());

        // The rescheduled task runs once immediately, then waits an hour
        tokio::time::sleep(Duration::from_millis(50)).await;
        let sweeps = cache.metrics().sweeps;
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(cache.metrics().sweeps, sweeps);

        cache.stop();
        assert!(!cache.is_started());
    }

    #[tokio::test]
    async fn test_interval_change_then_start() {
        let cache: UuidBroadcasterCache<String> =
            UuidBroadcasterCache::with_config(&fast_config(true)).unwrap();

        cache
            .set_invalidate_cache_interval(Duration::from_millis(20))
            .unwrap();
        assert!(!cache.is_started());

        cache.start().unwrap();
        tokio::time::sleep(Duration::from_millis(110)).await;
        assert!(cache.metrics().sweeps >= 3);

        cache.stop();
    }

    #[tokio::test]
    async fn test_restart_keeps_single_task() {
        let cache: UuidBroadcasterCache<String> =
            UuidBroadcasterCache::with_config(&fast_config(true)).unwrap();
        cache
            .set_invalidate_cache_interval(Duration::from_secs(3600))
            .unwrap();

        cache.start().unwrap();
        cache.start().unwrap();
        cache.start().unwrap();

        // Each start sweeps once immediately; superseded tasks never sweep again
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(cache.metrics().sweeps <= 3);
        let sweeps = cache.metrics().sweeps;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(cache.metrics().sweeps, sweeps);

        cache.stop();
    }

    #[tokio::test]
    async fn test_cleanup_keeps_dedicated_scheduler() {
        let scheduler = Arc::new(TaskScheduler::dedicated().unwrap());
        let cache: UuidBroadcasterCache<String> =
            UuidBroadcasterCache::new().with_scheduler(Arc::clone(&scheduler));

        cache.start().unwrap();
        cache.cleanup();
        assert!(!cache.is_started());
        assert!(scheduler.is_running());

        // Can start again after cleanup
        cache.start().unwrap();
        cache.stop();
        assert!(!scheduler.is_running());
        assert!(cache.start().is_err());
    }

    #[tokio::test]
    async fn test_stop_leaves_shared_scheduler_running() {
        let scheduler = Arc::new(TaskScheduler::shared().unwrap());
        assert_eq!(scheduler.kind(), SchedulerKind::Shared);

        let first: UuidBroadcasterCache<String> =
            UuidBroadcasterCache::new().with_scheduler(Arc::clone(&scheduler));
        let second: UuidBroadcasterCache<String> =
            UuidBroadcasterCache::new().with_scheduler(Arc::clone(&scheduler));

        first.start().unwrap();
        second.start().unwrap();
        first.stop();

        assert!(scheduler.is_running());
        assert!(second.is_started());
        second.stop();
    }

    #[test]
    fn test_start_without_configure_uses_shared() {
        let cache: UuidBroadcasterCache<String> = UuidBroadcasterCache::new();
        cache.start().unwrap();
        assert!(cache.is_started());
        cache.stop();
    }

    #[test]
    fn test_configure_rejects_zero_interval() {
        let cache: UuidBroadcasterCache<String> = UuidBroadcasterCache::new();
        let config = CacheConfig {
            invalidate_cache_interval: Duration::ZERO,
            ..CacheConfig::default()
        };
        assert!(cache.configure(&config).is_err());
    }
}
