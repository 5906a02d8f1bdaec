use sliplink_transport::TransportError;

/// Error type a datagram receiver may return.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur in link operations.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// The peer mapping is unusable.
    #[error("invalid link configuration: {0}")]
    Configuration(String),

    /// No line is configured for the requested next hop.
    #[error("no link to next hop {0}")]
    UnknownPeer(String),

    /// A receiver is already registered and the caller asked not to replace it.
    #[error("datagram receiver already registered")]
    ReceiverAlreadyRegistered,

    /// The upward receiver failed while handling a datagram.
    ///
    /// Only ever logged; delivery continues with the next datagram.
    #[error("datagram receiver failed: {0}")]
    ConsumerCallback(String),

    /// The serial line failed to send.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

pub type Result<T> = std::result::Result<T, LinkError>;
