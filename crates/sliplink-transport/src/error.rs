/// Errors that can occur in serial line operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// An I/O error occurred on the underlying byte stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream accepted zero bytes; the far end is gone.
    #[error("connection closed")]
    ConnectionClosed,

    /// The line has been closed locally.
    #[error("serial line closed")]
    Closed,

    /// A failure injected on purpose (see [`crate::MemoryLine::set_fail_sends`]).
    #[error("injected send failure: {0}")]
    Injected(String),
}

pub type Result<T> = std::result::Result<T, TransportError>;
