//! UUID Broadcaster Cache
//!
//! Buffers messages for clients that are not attached to a connection when a
//! broadcaster publishes, keyed by the client's stable uuid.
//!
//! # Concurrency
//!
//! - `messages` and `active_clients` are DashMaps, so unrelated clients only
//!   contend when they hash to the same shard
//! - Every per-client queue mutation happens under that client's map entry
//!   guard: the lazy create-then-append is one `entry().or_default()` upsert
//! - `retrieve_from_cache` drains with a single `remove`. An append that
//!   takes the entry lock after the removal lands in a fresh queue for the
//!   next drain
//! - Sweeps are serialized by `sweep_lock`, so rescheduling never produces
//!   two overlapping sweeps

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, instrument, trace, warn};

use super::client::ClientRef;
use super::config::CacheConfig;
use super::inspector::{BroadcasterCacheInspector, InspectorChain};
use super::message::{BroadcastMessage, CacheMessage};
use super::metrics::{CacheMetrics, MetricsSnapshot};
use super::queue::ClientQueue;
use super::scheduler::{SweepTask, TaskScheduler};
use crate::error::{Error, Result};

/// Operations the broadcaster and transport layer call on a cache
pub trait BroadcasterCache<M>: Send + Sync {
    /// Select the scheduler and timing parameters. Must precede [`start`].
    ///
    /// [`start`]: BroadcasterCache::start
    fn configure(&self, config: &CacheConfig) -> Result<()>;

    /// Begin the periodic eviction sweep
    fn start(&self) -> Result<()>;

    /// Cancel the sweep and release a dedicated scheduler
    fn stop(&self);

    /// Cancel the sweep only
    fn cleanup(&self);

    /// Wrap a published message and buffer it for `client`, or for every
    /// active client when `client` is `None`.
    ///
    /// The envelope is always returned, even when an inspector vetoed
    /// storage.
    fn add_to_cache(
        &self,
        broadcaster_id: &str,
        client: Option<&ClientRef>,
        message: BroadcastMessage<M>,
    ) -> CacheMessage<M>;

    /// Drain the client's backlog in publish order
    fn retrieve_from_cache(&self, broadcaster_id: &str, client: &ClientRef) -> Vec<M>;

    /// Acknowledge delivery of `message`, removing it from the client's
    /// current backlog if still there
    fn clear_cache(
        &self,
        broadcaster_id: &str,
        client: &ClientRef,
        message: Option<&CacheMessage<M>>,
    );

    /// Stop treating `client` as active for broadcast-to-all fan-out
    fn exclude_from_cache(&self, broadcaster_id: &str, client: &ClientRef);

    /// Register an inspector at the end of the chain
    fn add_inspector(&self, inspector: Arc<dyn BroadcasterCacheInspector<M>>);

    /// Register an inspector, returning self for chained registration
    fn inspector(&self, inspector: Arc<dyn BroadcasterCacheInspector<M>>) -> &Self
    where
        Self: Sized,
    {
        self.add_inspector(inspector);
        self
    }
}

/// Shared state reachable from the sweep task
struct CacheState<M> {
    messages: DashMap<String, ClientQueue<M>>,
    active_clients: DashMap<String, Instant>,
    client_idle_time: RwLock<Duration>,
    sweep_lock: Mutex<()>,
    metrics: CacheMetrics,
}

impl<M: Clone> CacheState<M> {
    fn new(client_idle_time: Duration) -> Self {
        Self {
            messages: DashMap::new(),
            active_clients: DashMap::new(),
            client_idle_time: RwLock::new(client_idle_time),
            sweep_lock: Mutex::new(()),
            metrics: CacheMetrics::new(),
        }
    }

    fn touch(&self, client_id: &str) {
        self.active_clients.insert(client_id.to_string(), Instant::now());
    }

    /// Append unless the id is already queued for this client
    fn add_message_if_not_exists(&self, client_id: &str, message: CacheMessage<M>) {
        let mut queue = self.messages.entry(client_id.to_string()).or_default();
        let id = message.id().to_string();

        if queue.push_unique(message) {
            self.metrics.record_cached();
        } else {
            self.metrics.record_duplicate();
            debug!(client = %client_id, message = %id, "Duplicate message");
        }
    }

    fn store(&self, client: Option<&ClientRef>, message: &CacheMessage<M>) {
        match client {
            None => {
                // Nobody is attached right now, cache for every active client
                let clients: Vec<String> = self
                    .active_clients
                    .iter()
                    .map(|entry| entry.key().clone())
                    .collect();

                for client_id in clients {
                    self.add_message_if_not_exists(&client_id, message.clone());
                }
            }
            Some(client) => {
                self.touch(client.uuid());
                self.add_message_if_not_exists(client.uuid(), message.clone());
            }
        }
    }

    /// Drop every client idle longer than the threshold, with its backlog.
    ///
    /// Returns the number of clients evicted.
    fn invalidate_expired_entries(&self) -> usize {
        let _sweep = self.sweep_lock.lock();
        let now = Instant::now();
        let idle = *self.client_idle_time.read();
        let expired = |seen: &Instant| now.saturating_duration_since(*seen) > idle;

        let inactive: Vec<String> = self
            .active_clients
            .iter()
            .filter(|entry| expired(entry.value()))
            .map(|entry| entry.key().clone())
            .collect();

        let mut evicted = 0;
        for client_id in inactive {
            // Skip clients that came back between the scan and now
            if self
                .active_clients
                .remove_if(&client_id, |_, seen| expired(seen))
                .is_some()
            {
                trace!(client = %client_id, "Invalidate client");
                self.messages.remove(&client_id);
                evicted += 1;
            }
        }

        // Excluded clients keep their backlog but no longer refresh a
        // timestamp; age those out by their last append
        self.messages.retain(|client_id, queue| {
            if self.active_clients.contains_key(client_id) {
                return true;
            }
            let keep = !queue.last_modified().is_some_and(|t| expired(&t));
            if !keep {
                trace!(client = %client_id, "Invalidate orphaned backlog");
                evicted += 1;
            }
            keep
        });

        self.metrics.record_sweep(evicted);
        if evicted > 0 {
            debug!(evicted, "Evicted idle clients");
        }
        evicted
    }
}

/// Periodic task state: exactly one live task per cache
struct SweepSlot {
    interval: Duration,
    task: Option<SweepTask>,
}

/// Broadcaster cache keyed by client uuid
pub struct UuidBroadcasterCache<M> {
    state: Arc<CacheState<M>>,
    inspectors: InspectorChain<M>,
    scheduler: RwLock<Option<Arc<TaskScheduler>>>,
    sweep: Mutex<SweepSlot>,
}

impl<M> UuidBroadcasterCache<M>
where
    M: Clone + Send + Sync + 'static,
{
    /// Create a cache with default timing. Call [`configure`] before
    /// [`start`].
    ///
    /// [`configure`]: BroadcasterCache::configure
    /// [`start`]: BroadcasterCache::start
    pub fn new() -> Self {
        let config = CacheConfig::default();
        Self {
            state: Arc::new(CacheState::new(config.client_idle_time)),
            inspectors: InspectorChain::new(),
            scheduler: RwLock::new(None),
            sweep: Mutex::new(SweepSlot {
                interval: config.invalidate_cache_interval,
                task: None,
            }),
        }
    }

    /// Create and configure a cache in one step
    pub fn with_config(config: &CacheConfig) -> Result<Self> {
        let cache = Self::new();
        cache.configure(config)?;
        Ok(cache)
    }

    /// Use a caller supplied scheduler instead of one derived from config
    pub fn with_scheduler(self, scheduler: Arc<TaskScheduler>) -> Self {
        *self.scheduler.write() = Some(scheduler);
        self
    }

    /// Re-offer an existing envelope without consulting inspectors.
    ///
    /// Retried deliveries of the same envelope are idempotent: a client that
    /// already has the id queued is skipped.
    pub fn offer_to_cache(
        &self,
        broadcaster_id: &str,
        client: Option<&ClientRef>,
        message: &CacheMessage<M>,
    ) {
        trace!(
            broadcaster = %broadcaster_id,
            client = client.map(ClientRef::uuid).unwrap_or("<all>"),
            message = %message.id(),
            "Offering cached message"
        );
        self.state.store(client, message);
    }

    /// Run one sweep now. Returns the number of clients evicted.
    pub fn invalidate_expired_entries(&self) -> usize {
        self.state.invalidate_expired_entries()
    }

    /// Change the sweep interval.
    ///
    /// A running sweep is cancelled and rescheduled with the new interval
    /// under the same lock, so there is never zero or two live tasks. If no
    /// sweep is running the interval is recorded for the next `start`.
    pub fn set_invalidate_cache_interval(&self, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(Error::Config(
                "invalidate cache interval must be greater than zero".to_string(),
            ));
        }

        let mut slot = self.sweep.lock();
        slot.interval = interval;

        if slot.task.is_some() {
            let scheduler = self.scheduler_or_shared()?;
            if let Some(old) = slot.task.take() {
                old.cancel();
            }
            slot.task = Some(self.spawn_sweep(&scheduler, interval)?);
            info!(interval_ms = interval.as_millis() as u64, "Rescheduled cache sweep");
        }
        Ok(())
    }

    /// Change the idle threshold. Takes effect at the next sweep.
    pub fn set_client_idle_time(&self, idle: Duration) {
        *self.state.client_idle_time.write() = idle;
    }

    /// Current idle threshold
    pub fn client_idle_time(&self) -> Duration {
        *self.state.client_idle_time.read()
    }

    /// Current sweep interval
    pub fn invalidate_cache_interval(&self) -> Duration {
        self.sweep.lock().interval
    }

    /// Check if a periodic sweep is scheduled
    pub fn is_started(&self) -> bool {
        self.sweep.lock().task.is_some()
    }

    /// Snapshot of every buffered backlog
    pub fn messages(&self) -> HashMap<String, Vec<CacheMessage<M>>> {
        self.state
            .messages
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().iter().cloned().collect()))
            .collect()
    }

    /// Snapshot of active clients and when they were last seen
    pub fn active_clients(&self) -> HashMap<String, Instant> {
        self.state
            .active_clients
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    /// Check if a client is tracked as active
    pub fn is_active(&self, client_id: &str) -> bool {
        self.state.active_clients.contains_key(client_id)
    }

    /// Number of messages buffered for a client
    pub fn queue_len(&self, client_id: &str) -> usize {
        self.state
            .messages
            .get(client_id)
            .map(|queue| queue.len())
            .unwrap_or(0)
    }

    /// Cache metrics
    pub fn metrics(&self) -> MetricsSnapshot {
        self.state.metrics.snapshot()
    }

    fn scheduler_or_shared(&self) -> Result<Arc<TaskScheduler>> {
        if let Some(scheduler) = self.scheduler.read().as_ref() {
            return Ok(Arc::clone(scheduler));
        }

        warn!("Cache started without configure, using the shared scheduler");
        let scheduler = Arc::new(TaskScheduler::shared()?);
        *self.scheduler.write() = Some(Arc::clone(&scheduler));
        Ok(scheduler)
    }

    fn spawn_sweep(&self, scheduler: &TaskScheduler, interval: Duration) -> Result<SweepTask> {
        let state: Weak<CacheState<M>> = Arc::downgrade(&self.state);
        scheduler.schedule_with_fixed_delay(interval, move || match state.upgrade() {
            Some(state) => {
                state.invalidate_expired_entries();
                true
            }
            None => false,
        })
    }
}

impl<M> Default for UuidBroadcasterCache<M>
where
    M: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<M> BroadcasterCache<M> for UuidBroadcasterCache<M>
where
    M: Clone + Send + Sync + 'static,
{
    #[instrument(skip(self, config), fields(shared = config.shared))]
    fn configure(&self, config: &CacheConfig) -> Result<()> {
        config.validate()?;

        let scheduler = if config.shared {
            TaskScheduler::shared()?
        } else {
            TaskScheduler::dedicated()?
        };

        // Replacing a dedicated scheduler must not leak its thread
        self.cleanup();
        if let Some(old) = self.scheduler.write().replace(Arc::new(scheduler)) {
            old.shutdown();
        }

        self.set_client_idle_time(config.client_idle_time);
        self.sweep.lock().interval = config.invalidate_cache_interval;

        debug!(
            idle_ms = config.client_idle_time.as_millis() as u64,
            interval_ms = config.invalidate_cache_interval.as_millis() as u64,
            "Cache configured"
        );
        Ok(())
    }

    fn start(&self) -> Result<()> {
        let scheduler = self.scheduler_or_shared()?;

        let mut slot = self.sweep.lock();
        if let Some(old) = slot.task.take() {
            old.cancel();
        }
        slot.task = Some(self.spawn_sweep(&scheduler, slot.interval)?);

        info!(
            scheduler = %scheduler.kind(),
            interval_ms = slot.interval.as_millis() as u64,
            "Started cache sweep"
        );
        Ok(())
    }

    fn stop(&self) {
        self.cleanup();

        if let Some(scheduler) = self.scheduler.read().as_ref() {
            // Shared schedulers ignore this
            scheduler.shutdown();
        }
    }

    fn cleanup(&self) {
        if let Some(task) = self.sweep.lock().task.take() {
            task.cancel();
            info!("Cancelled cache sweep");
        }
    }

    fn add_to_cache(
        &self,
        broadcaster_id: &str,
        client: Option<&ClientRef>,
        message: BroadcastMessage<M>,
    ) -> CacheMessage<M> {
        trace!(
            broadcaster = %broadcaster_id,
            client = client.map(ClientRef::uuid).unwrap_or("<all>"),
            active = self.state.active_clients.len(),
            "Adding message to cache"
        );

        let accepted = self.inspectors.inspect(&message);
        let cache_message = CacheMessage::new(message.payload);

        if !accepted {
            self.state.metrics.record_rejected();
            debug!(
                broadcaster = %broadcaster_id,
                message = %cache_message.id(),
                "Message rejected by inspector, not cached"
            );
            return cache_message;
        }

        self.state.store(client, &cache_message);
        cache_message
    }

    fn retrieve_from_cache(&self, broadcaster_id: &str, client: &ClientRef) -> Vec<M> {
        let client_id = client.uuid();
        self.state.touch(client_id);

        let result = self
            .state
            .messages
            .remove(client_id)
            .map(|(_, queue)| queue.into_payloads())
            .unwrap_or_default();

        self.state.metrics.record_drained(result.len());
        trace!(
            broadcaster = %broadcaster_id,
            client = %client_id,
            transport = %client.transport(),
            count = result.len(),
            "Retrieved cached messages"
        );
        result
    }

    fn clear_cache(
        &self,
        broadcaster_id: &str,
        client: &ClientRef,
        message: Option<&CacheMessage<M>>,
    ) {
        let Some(message) = message else {
            debug!(
                broadcaster = %broadcaster_id,
                client = %client.uuid(),
                "Cached message is absent, nothing to clear"
            );
            return;
        };

        let client_id = client.uuid();
        let removed = match self.state.messages.get_mut(client_id) {
            Some(mut queue) => queue.remove(message.id()).is_some(),
            None => false,
        };

        if removed {
            self.state.metrics.record_acknowledgment();
            // Entry guard above is released; re-check emptiness under the lock
            self.state
                .messages
                .remove_if(client_id, |_, queue| queue.is_empty());
            trace!(client = %client_id, message = %message.id(), "Removed cached message");
        }
    }

    fn exclude_from_cache(&self, broadcaster_id: &str, client: &ClientRef) {
        trace!(broadcaster = %broadcaster_id, client = %client.uuid(), "Excluding client");
        self.state.active_clients.remove(client.uuid());
    }

    fn add_inspector(&self, inspector: Arc<dyn BroadcasterCacheInspector<M>>) {
        self.inspectors.push(inspector);
    }
}

impl<M> fmt::Display for UuidBroadcasterCache<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UuidBroadcasterCache")
    }
}

impl<M> Drop for UuidBroadcasterCache<M> {
    fn drop(&mut self) {
        if let Some(task) = self.sweep.get_mut().task.take() {
            task.cancel();
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
