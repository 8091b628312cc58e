//! Broadcaster Message Cache
//!
//! Buffers messages published while a client is detached (reconnecting, or
//! between long-polling requests) until the client drains its backlog.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                      UuidBroadcasterCache                             │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │  add_to_cache ──▶ InspectorChain ──▶ messages: uuid → ClientQueue    │
//! │  retrieve_from_cache ◀── atomic remove (drain)                        │
//! │  clear_cache ──▶ targeted remove                                      │
//! │                                                                       │
//! │  active_clients: uuid → last seen                                     │
//! │        ▲                                                              │
//! │        └── TaskScheduler (shared | dedicated): periodic idle sweep    │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Guarantees
//!
//! - Per-client FIFO, no ordering across clients
//! - Duplicate ids are never queued twice for the same client
//! - Idle clients are evicted with their backlog within one sweep interval

mod client;
mod config;
mod inspector;
mod message;
mod metrics;
mod queue;
mod scheduler;
mod uuid_cache;

#[cfg(test)]
mod proptest;

use std::time::Duration;

pub use client::{ClientRef, Transport};
pub use config::{
    CacheConfig, CLIENT_IDLE_TIME_PROPERTY, INVALIDATE_CACHE_INTERVAL_PROPERTY, SHARED_PROPERTY,
};
pub use inspector::{BroadcasterCacheInspector, InspectorChain, PayloadSizeInspector};
pub use message::{BroadcastMessage, CacheMessage};
pub use metrics::{CacheMetrics, MetricsSnapshot};
pub use queue::ClientQueue;
pub use scheduler::{SchedulerKind, SweepTask, TaskScheduler};
pub use uuid_cache::{BroadcasterCache, UuidBroadcasterCache};

/// Default inactivity before a client is evicted (1 minute)
pub const DEFAULT_CLIENT_IDLE_TIME: Duration = Duration::from_secs(60);

/// Default delay between sweeps (30 seconds)
pub const DEFAULT_INVALIDATE_CACHE_INTERVAL: Duration = Duration::from_secs(30);
