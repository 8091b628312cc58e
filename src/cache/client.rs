//! Client identity
//!
//! A client is a logical subscriber identified by a stable uuid that survives
//! reconnects. The cache never invents this identity.

use std::fmt;

/// Transport a client is currently attached through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Transport {
    /// Full-duplex WebSocket
    #[default]
    WebSocket,
    /// Server-sent events
    Sse,
    /// HTTP streaming
    Streaming,
    /// Long-polling
    LongPolling,
    /// JSONP long-polling
    Jsonp,
    /// Plain polling
    Polling,
}

impl Transport {
    /// Whether the transport reconnects after every delivery.
    ///
    /// Resumable clients are detached between requests, so everything
    /// published in the gap goes through the cache.
    pub fn is_resumable(&self) -> bool {
        matches!(self, Transport::LongPolling | Transport::Jsonp)
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::WebSocket => write!(f, "websocket"),
            Transport::Sse => write!(f, "sse"),
            Transport::Streaming => write!(f, "streaming"),
            Transport::LongPolling => write!(f, "long-polling"),
            Transport::Jsonp => write!(f, "jsonp"),
            Transport::Polling => write!(f, "polling"),
        }
    }
}

/// Reference to a client as seen by the transport layer
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientRef {
    uuid: String,
    transport: Transport,
}

impl ClientRef {
    /// Create a client reference using the default transport
    pub fn new(uuid: impl Into<String>) -> Self {
        Self::with_transport(uuid, Transport::default())
    }

    /// Create a client reference attached through a specific transport
    pub fn with_transport(uuid: impl Into<String>, transport: Transport) -> Self {
        Self {
            uuid: uuid.into(),
            transport,
        }
    }

    /// Stable client uuid
    #[inline]
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// Current transport
    #[inline]
    pub fn transport(&self) -> Transport {
        self.transport
    }
}

impl From<&str> for ClientRef {
    fn from(uuid: &str) -> Self {
        Self::new(uuid)
    }
}

impl From<String> for ClientRef {
    fn from(uuid: String) -> Self {
        Self::new(uuid)
    }
}

impl fmt::Display for ClientRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.uuid, self.transport)
    }
}
