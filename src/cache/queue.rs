//! Per-client backlog
//!
//! FIFO queue of cached messages plus a companion id set for O(1) duplicate
//! detection. Both are only ever mutated together.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::time::Instant;

use super::message::CacheMessage;

/// Ordered backlog for one client
#[derive(Clone)]
pub struct ClientQueue<M> {
    queue: VecDeque<CacheMessage<M>>,
    ids: HashSet<String>,
    last_modified: Option<Instant>,
}

impl<M> Default for ClientQueue<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> ClientQueue<M> {
    /// Create an empty queue
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            ids: HashSet::new(),
            last_modified: None,
        }
    }

    /// Number of buffered messages
    #[inline]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Check if the queue is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Check if a message id is buffered
    #[inline]
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// When a message was last appended
    #[inline]
    pub fn last_modified(&self) -> Option<Instant> {
        self.last_modified
    }

    /// Append a message unless its id is already present.
    ///
    /// Returns false for a duplicate.
    pub fn push_unique(&mut self, message: CacheMessage<M>) -> bool {
        if !self.ids.insert(message.id().to_string()) {
            return false;
        }
        self.queue.push_back(message);
        self.last_modified = Some(Instant::now());
        true
    }

    /// Remove a specific message, if still present
    pub fn remove(&mut self, id: &str) -> Option<CacheMessage<M>> {
        if !self.ids.remove(id) {
            return None;
        }
        let pos = self.queue.iter().position(|m| m.id() == id)?;
        self.queue.remove(pos)
    }

    /// Iterate buffered messages in publish order
    pub fn iter(&self) -> impl Iterator<Item = &CacheMessage<M>> {
        self.queue.iter()
    }

    /// Consume the queue, yielding payloads in publish order
    pub fn into_payloads(self) -> Vec<M> {
        self.queue
            .into_iter()
            .map(CacheMessage::into_payload)
            .collect()
    }
}

impl<M: fmt::Debug> fmt::Debug for ClientQueue<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.queue.iter()).finish()
    }
}
