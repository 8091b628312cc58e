//! Cache Inspectors
//!
//! Pluggable predicates that can veto caching of a message before it is
//! stored. The chain accepts a message only if every inspector accepts, in
//! registration order, short-circuiting on the first rejection.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::message::BroadcastMessage;

/// A predicate consulted before a message is cached
pub trait BroadcasterCacheInspector<M>: Send + Sync {
    /// Return false to keep the message out of every queue
    fn inspect(&self, message: &BroadcastMessage<M>) -> bool;
}

impl<M, F> BroadcasterCacheInspector<M> for F
where
    F: Fn(&BroadcastMessage<M>) -> bool + Send + Sync,
{
    fn inspect(&self, message: &BroadcastMessage<M>) -> bool {
        self(message)
    }
}

/// Rejects payloads larger than a byte limit
#[derive(Debug, Clone, Copy)]
pub struct PayloadSizeInspector {
    max_bytes: usize,
}

impl PayloadSizeInspector {
    /// Create an inspector rejecting payloads over `max_bytes`
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    /// Configured limit
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }
}

impl<M: AsRef<[u8]>> BroadcasterCacheInspector<M> for PayloadSizeInspector {
    fn inspect(&self, message: &BroadcastMessage<M>) -> bool {
        let len = message.payload.as_ref().len();
        if len > self.max_bytes {
            debug!(size = len, limit = self.max_bytes, "Payload over size limit");
            return false;
        }
        true
    }
}

/// Ordered list of inspectors
pub struct InspectorChain<M> {
    inspectors: RwLock<Vec<Arc<dyn BroadcasterCacheInspector<M>>>>,
}

impl<M> Default for InspectorChain<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> InspectorChain<M> {
    /// Create an empty chain (accepts everything)
    pub fn new() -> Self {
        Self {
            inspectors: RwLock::new(Vec::new()),
        }
    }

    /// Append an inspector to the end of the chain
    pub fn push(&self, inspector: Arc<dyn BroadcasterCacheInspector<M>>) {
        self.inspectors.write().push(inspector);
    }

    /// Number of registered inspectors
    pub fn len(&self) -> usize {
        self.inspectors.read().len()
    }

    /// Check if no inspector is registered
    pub fn is_empty(&self) -> bool {
        self.inspectors.read().is_empty()
    }

    /// Evaluate the chain against a message
    pub fn inspect(&self, message: &BroadcastMessage<M>) -> bool {
        // Snapshot so a slow inspector never blocks registration
        let inspectors = self.inspectors.read().clone();
        inspectors.iter().all(|i| i.inspect(message))
    }
}
