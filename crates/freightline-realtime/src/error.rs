//! Realtime error taxonomy.
//!
//! Connection-level failures (`Transport`) and broker-level failures
//! (`Protocol`) drive different recovery paths in the session and must stay
//! distinct: protocol errors consume bounded reconnection attempts, while
//! transport errors are left to the transport's own reconnect delay.

use thiserror::Error;

/// Errors raised by the realtime subscription layer.
#[derive(Debug, Clone, Error)]
pub enum RealtimeError {
    /// Connection-level failure (dial, socket, handshake transport).
    #[error("transport error: {0}")]
    Transport(String),

    /// Broker-level failure reported after the connection was up.
    #[error("broker error: {message}")]
    Protocol {
        /// Short reason from the broker's `message` header.
        message: String,
        /// Frame body with any detail the broker attached.
        detail: String,
    },

    /// A frame that could not be parsed.
    #[error("malformed frame: {0}")]
    Frame(String),

    /// The configured broker endpoint is not a valid URL.
    #[error("invalid broker endpoint {url}: {reason}")]
    Endpoint {
        /// The offending endpoint string.
        url: String,
        /// Why it was rejected.
        reason: String,
    },
}
