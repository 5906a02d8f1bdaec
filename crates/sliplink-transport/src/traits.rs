use crate::error::Result;

/// Function a line invokes with each chunk of raw incoming bytes.
///
/// Chunk boundaries carry no meaning: a frame may arrive split across any
/// number of calls, and one call may carry several frames.
pub type ByteReceiver = Box<dyn FnMut(&[u8]) + Send>;

/// A point-to-point serial line: a raw byte sink plus a raw byte source.
///
/// Implementations are shared between the thread that delivers incoming bytes
/// and callers sending outgoing ones, so both methods take `&self`.
pub trait SerialLine: Send + Sync {
    /// Set the function invoked with raw incoming bytes, replacing any prior
    /// registration.
    fn register_receiver(&self, receiver: ByteReceiver);

    /// Queue or write raw bytes for transmission.
    ///
    /// Failure modes are transport-defined and propagate to the caller.
    fn send(&self, bytes: &[u8]) -> Result<()>;

    /// Short name for diagnostics.
    fn name(&self) -> &str {
        "serial-line"
    }
}

impl<L: SerialLine + ?Sized> SerialLine for std::sync::Arc<L> {
    fn register_receiver(&self, receiver: ByteReceiver) {
        (**self).register_receiver(receiver)
    }

    fn send(&self, bytes: &[u8]) -> Result<()> {
        (**self).send(bytes)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
