//! Cache Metrics Collection
//!
//! Lock-free counters describing cache activity.

use std::sync::atomic::{AtomicU64, Ordering};

/// Cache metrics collector
#[derive(Debug, Default)]
pub struct CacheMetrics {
    messages_cached: AtomicU64,
    messages_rejected: AtomicU64,
    duplicates_skipped: AtomicU64,
    messages_drained: AtomicU64,
    acknowledgments: AtomicU64,
    clients_evicted: AtomicU64,
    sweeps: AtomicU64,
}

impl CacheMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_cached(&self) {
        self.messages_cached.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.messages_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate(&self) {
        self.duplicates_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_drained(&self, count: usize) {
        self.messages_drained
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_acknowledgment(&self) {
        self.acknowledgments.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sweep(&self, evicted: usize) {
        self.sweeps.fetch_add(1, Ordering::Relaxed);
        self.clients_evicted
            .fetch_add(evicted as u64, Ordering::Relaxed);
    }

    pub fn messages_cached(&self) -> u64 {
        self.messages_cached.load(Ordering::Relaxed)
    }

    pub fn sweeps(&self) -> u64 {
        self.sweeps.load(Ordering::Relaxed)
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_cached: self.messages_cached.load(Ordering::Relaxed),
            messages_rejected: self.messages_rejected.load(Ordering::Relaxed),
            duplicates_skipped: self.duplicates_skipped.load(Ordering::Relaxed),
            messages_drained: self.messages_drained.load(Ordering::Relaxed),
            acknowledgments: self.acknowledgments.load(Ordering::Relaxed),
            clients_evicted: self.clients_evicted.load(Ordering::Relaxed),
            sweeps: self.sweeps.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters
    pub fn reset(&self) {
        self.messages_cached.store(0, Ordering::Relaxed);
        self.messages_rejected.store(0, Ordering::Relaxed);
        self.duplicates_skipped.store(0, Ordering::Relaxed);
        self.messages_drained.store(0, Ordering::Relaxed);
        self.acknowledgments.store(0, Ordering::Relaxed);
        self.clients_evicted.store(0, Ordering::Relaxed);
        self.sweeps.store(0, Ordering::Relaxed);
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Queue appends (one per client a message landed in)
    pub messages_cached: u64,
    /// Messages vetoed by an inspector
    pub messages_rejected: u64,
    /// Appends skipped because the id was already queued
    pub duplicates_skipped: u64,
    /// Messages handed out by retrieve
    pub messages_drained: u64,
    /// Messages removed by acknowledgment
    pub acknowledgments: u64,
    /// Clients dropped for inactivity
    pub clients_evicted: u64,
    /// Completed sweeps
    pub sweeps: u64,
}
