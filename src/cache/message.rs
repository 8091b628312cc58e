//! Cache Message Types
//!
//! Immutable envelopes pairing a generated identifier with an opaque payload.

use std::fmt;

use uuid::Uuid;

/// A message as published by the broadcaster.
///
/// This is what inspectors see. The payload is opaque to the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastMessage<M> {
    /// Opaque payload
    pub payload: M,
    /// Uuid of the client that published the message, if any
    pub origin: Option<String>,
}

impl<M> BroadcastMessage<M> {
    /// Create a new broadcast message with no origin
    pub fn new(payload: M) -> Self {
        Self {
            payload,
            origin: None,
        }
    }

    /// Create a broadcast message published by a specific client
    pub fn from_client(payload: M, origin: impl Into<String>) -> Self {
        Self {
            payload,
            origin: Some(origin.into()),
        }
    }
}

/// Cached message envelope
///
/// Equality is by id only: two envelopes wrapping equal payloads are still
/// distinct messages.
#[derive(Debug, Clone)]
pub struct CacheMessage<M> {
    id: String,
    payload: M,
}

impl<M> CacheMessage<M> {
    /// Wrap a payload with a freshly generated id
    pub fn new(payload: M) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), payload)
    }

    /// Wrap a payload with a caller supplied id
    ///
    /// Used when re-offering an envelope that was created earlier, which is
    /// what makes the deduplicating append meaningful.
    pub fn with_id(id: impl Into<String>, payload: M) -> Self {
        Self {
            id: id.into(),
            payload,
        }
    }

    /// Message id
    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Message payload
    #[inline]
    pub fn payload(&self) -> &M {
        &self.payload
    }

    /// Consume the envelope, returning the payload
    #[inline]
    pub fn into_payload(self) -> M {
        self.payload
    }
}

impl<M> PartialEq for CacheMessage<M> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<M> Eq for CacheMessage<M> {}

impl<M: fmt::Debug> fmt::Display for CacheMessage<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:?}", self.id, self.payload)
    }
}

// =============================================================================
// Tests
// =============================================================================
