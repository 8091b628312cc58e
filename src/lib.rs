//! Broadcache - Per-Client Broadcaster Message Cache
//!
//! Sits behind a publish/subscribe broadcaster in a long-lived-connection
//! server (Comet / WebSocket). Messages published while a client is not
//! attached to a connection are buffered per client until the client
//! reconnects and drains its backlog.
//!
//! # Architecture
//!
//! ```text
//! Broadcaster ──add_to_cache──▶ UuidBroadcasterCache ◀──retrieve/clear── Transport
//!                                      ▲
//!                               EvictionScheduler
//! ```
//!
//! # Features
//!
//! - Per-client FIFO backlogs with id-based deduplication
//! - Broadcast-to-all fan-out across active clients
//! - Pluggable inspector chain that can veto caching
//! - Idle-client eviction on a shared or dedicated scheduler
//!
//! # Modules
//!
//! - [`cache`] - Cache, queues, inspectors, and eviction scheduler
//! - [`error`] - Error types
//!
//! # Example
//!
//! ```
//! use broadcache::{BroadcastMessage, BroadcasterCache, ClientRef, UuidBroadcasterCache};
//!
//! let cache: UuidBroadcasterCache<String> = UuidBroadcasterCache::new();
//! let client = ClientRef::new("client-1");
//!
//! cache.add_to_cache("/chat", Some(&client), BroadcastMessage::new("hi".to_string()));
//! assert_eq!(cache.retrieve_from_cache("/chat", &client), vec!["hi"]);
//! ```

pub mod cache;
pub mod error;

// Re-export commonly used types
pub use cache::{
    BroadcastMessage, BroadcasterCache, BroadcasterCacheInspector, CacheConfig, CacheMessage,
    ClientRef, PayloadSizeInspector, TaskScheduler, Transport, UuidBroadcasterCache,
};
pub use error::{Error, Result};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
