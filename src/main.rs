//! Broadcache Soak Driver
//!
//! Runs concurrent publishers and long-polling clients against a single
//! cache for a fixed duration, then reports cache metrics.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   add_to_cache    ┌──────────────────────┐   retrieve   ┌──────────────┐
//! │  Publishers  │──────────────────▶│ UuidBroadcasterCache │◀─────────────│   Pollers    │
//! │  (N threads) │   clear_cache     │   + idle sweep       │              │  (M clients) │
//! └──────────────┘                   └──────────────────────┘              └──────────────┘
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use broadcache::{
    BroadcastMessage, BroadcasterCache, CacheConfig, ClientRef, PayloadSizeInspector, Transport,
    UuidBroadcasterCache,
};
use bytes::Bytes;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Broadcache soak driver - exercise the cache under concurrent load
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of publisher threads
    #[arg(long, env = "SOAK_PUBLISHERS", default_value = "4")]
    publishers: usize,

    /// Number of long-polling clients
    #[arg(long, env = "SOAK_CLIENTS", default_value = "64")]
    clients: usize,

    /// Test duration in seconds
    #[arg(long, env = "SOAK_DURATION_SECONDS", default_value = "10")]
    duration_seconds: u64,

    /// Delay between polls of one client, in milliseconds
    #[arg(long, env = "SOAK_POLL_INTERVAL_MS", default_value = "20")]
    poll_interval_ms: u64,

    /// Every Nth published message is broadcast to all active clients
    #[arg(long, env = "SOAK_BROADCAST_EVERY", default_value = "10")]
    broadcast_every: u64,

    /// Every Nth targeted message is acknowledged immediately
    #[arg(long, env = "SOAK_ACK_EVERY", default_value = "3")]
    ack_every: u64,

    /// Reject payloads larger than this many bytes
    #[arg(long, env = "SOAK_MAX_PAYLOAD_BYTES", default_value = "4096")]
    max_payload_bytes: usize,

    /// Client idle time in milliseconds
    #[arg(long, env = "SOAK_CLIENT_IDLE_MS", default_value = "2000")]
    client_idle_ms: u64,

    /// Sweep interval in milliseconds
    #[arg(long, env = "SOAK_SWEEP_INTERVAL_MS", default_value = "500")]
    sweep_interval_ms: u64,

    /// Use a dedicated sweep scheduler instead of the shared one
    #[arg(long, env = "SOAK_DEDICATED_SCHEDULER")]
    dedicated_scheduler: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args);

    info!("Starting broadcache soak");
    info!("  Publishers: {}", args.publishers);
    info!("  Clients: {}", args.clients);
    info!("  Duration: {}s", args.duration_seconds);
    info!("  Dedicated scheduler: {}", args.dedicated_scheduler);

    let config = CacheConfig {
        shared: !args.dedicated_scheduler,
        client_idle_time: Duration::from_millis(args.client_idle_ms),
        invalidate_cache_interval: Duration::from_millis(args.sweep_interval_ms),
    };

    let cache: Arc<UuidBroadcasterCache<Bytes>> =
        Arc::new(UuidBroadcasterCache::with_config(&config).context("configuring cache")?);
    cache.inspector(Arc::new(PayloadSizeInspector::new(args.max_payload_bytes)));
    cache.start().context("starting cache sweep")?;

    let clients: Vec<ClientRef> = (0..args.clients)
        .map(|i| ClientRef::with_transport(format!("client-{}", i), Transport::LongPolling))
        .collect();

    let running = AtomicBool::new(true);
    let published = AtomicU64::new(0);
    let delivered = AtomicU64::new(0);
    let deadline = Instant::now() + Duration::from_secs(args.duration_seconds);

    crossbeam::thread::scope(|s| {
        for p in 0..args.publishers {
            let cache = Arc::clone(&cache);
            let (clients, running, published) = (&clients, &running, &published);
            let args = &args;
            s.spawn(move |_| publish_loop(p, &cache, clients, running, published, args));
        }

        for client in &clients {
            let cache = Arc::clone(&cache);
            let (running, delivered) = (&running, &delivered);
            let poll = Duration::from_millis(args.poll_interval_ms);
            s.spawn(move |_| {
                while running.load(Ordering::Relaxed) {
                    let batch = cache.retrieve_from_cache("/soak", client);
                    delivered.fetch_add(batch.len() as u64, Ordering::Relaxed);
                    std::thread::sleep(poll);
                }
            });
        }

        while Instant::now() < deadline {
            std::thread::sleep(Duration::from_secs(1));
            info!(
                published = published.load(Ordering::Relaxed),
                delivered = delivered.load(Ordering::Relaxed),
                "Progress"
            );
        }
        running.store(false, Ordering::Relaxed);
    })
    .map_err(|_| anyhow::anyhow!("soak worker panicked"))?;

    cache.stop();

    let metrics = cache.metrics();
    info!("Soak complete");
    info!("  Published: {}", published.load(Ordering::Relaxed));
    info!("  Delivered: {}", delivered.load(Ordering::Relaxed));
    info!("  Cached: {}", metrics.messages_cached);
    info!("  Rejected: {}", metrics.messages_rejected);
    info!("  Acknowledged: {}", metrics.acknowledgments);
    info!("  Evicted clients: {}", metrics.clients_evicted);
    info!("  Sweeps: {}", metrics.sweeps);

    Ok(())
}

fn publish_loop(
    publisher: usize,
    cache: &UuidBroadcasterCache<Bytes>,
    clients: &[ClientRef],
    running: &AtomicBool,
    published: &AtomicU64,
    args: &Args,
) {
    let mut seq: u64 = 0;
    while running.load(Ordering::Relaxed) {
        seq += 1;
        let payload = Bytes::from(format!("publisher-{}:{}", publisher, seq));

        if args.broadcast_every > 0 && seq % args.broadcast_every == 0 {
            cache.add_to_cache("/soak", None, BroadcastMessage::new(payload));
        } else if !clients.is_empty() {
            let client = &clients[(seq as usize + publisher) % clients.len()];
            let sent = cache.add_to_cache("/soak", Some(client), BroadcastMessage::new(payload));

            // Simulate a direct delivery that succeeded
            if args.ack_every > 0 && seq % args.ack_every == 0 {
                cache.clear_cache("/soak", client, Some(&sent));
            }
        }

        published.fetch_add(1, Ordering::Relaxed);
        if seq % 64 == 0 {
            std::thread::yield_now();
        }
    }
}

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
