use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, trace};

use crate::error::{Result, TransportError};
use crate::traits::{ByteReceiver, SerialLine};

type ReceiverSlot = Arc<Mutex<Option<ByteReceiver>>>;

/// One end of an in-memory serial line.
///
/// `send` on one end synchronously invokes the receiver registered on the
/// other end, on the sender's thread. Every byte sent is also recorded so
/// tests can inspect the exact wire output.
pub struct MemoryLine {
    name: String,
    local: ReceiverSlot,
    remote: Option<ReceiverSlot>,
    sent: Mutex<Vec<u8>>,
    fail_sends: Mutex<Option<String>>,
    closed: AtomicBool,
}

impl MemoryLine {
    /// Create two connected ends.
    pub fn pair() -> (Self, Self) {
        let a: ReceiverSlot = Arc::new(Mutex::new(None));
        let b: ReceiverSlot = Arc::new(Mutex::new(None));
        (
            Self::with_slots("memory-a", Arc::clone(&a), Some(Arc::clone(&b))),
            Self::with_slots("memory-b", b, Some(a)),
        )
    }

    /// Create an end with nothing on the other side.
    ///
    /// Sent bytes are only recorded; incoming bytes are injected with
    /// [`MemoryLine::deliver`].
    pub fn detached(name: impl Into<String>) -> Self {
        Self::with_slots(name, Arc::new(Mutex::new(None)), None)
    }

    fn with_slots(
        name: impl Into<String>,
        local: ReceiverSlot,
        remote: Option<ReceiverSlot>,
    ) -> Self {
        Self {
            name: name.into(),
            local,
            remote,
            sent: Mutex::new(Vec::new()),
            fail_sends: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Rename this end for diagnostics.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Hand raw bytes to this end's receiver as if they came off the wire.
    ///
    /// Bytes arriving with no receiver registered are dropped.
    pub fn deliver(&self, bytes: &[u8]) {
        invoke(&self.local, &self.name, bytes);
    }

    /// Everything sent through this end so far.
    pub fn sent(&self) -> Vec<u8> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Forget the recorded send history.
    pub fn clear_sent(&self) {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    /// Make subsequent sends fail with [`TransportError::Injected`], or
    /// succeed again with `None`.
    pub fn set_fail_sends(&self, reason: Option<&str>) {
        *self.fail_sends.lock().unwrap_or_else(PoisonError::into_inner) = reason.map(str::to_owned);
    }

    /// Close this end. Subsequent sends fail with [`TransportError::Closed`].
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(line = %self.name, "memory line closed");
        }
    }

    /// Whether a receiver is currently registered on this end.
    pub fn has_receiver(&self) -> bool {
        self.local.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }
}

fn invoke(slot: &ReceiverSlot, line: &str, bytes: &[u8]) {
    let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
    match guard.as_mut() {
        Some(receiver) => receiver(bytes),
        None => trace!(line, len = bytes.len(), "no receiver registered; dropping bytes"),
    }
}

impl SerialLine for MemoryLine {
    fn register_receiver(&self, receiver: ByteReceiver) {
        *self.local.lock().unwrap_or_else(PoisonError::into_inner) = Some(receiver);
        debug!(line = %self.name, "receiver registered");
    }

    fn send(&self, bytes: &[u8]) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        if let Some(reason) = self
            .fail_sends
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Err(TransportError::Injected(reason));
        }

        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(bytes);
        trace!(line = %self.name, len = bytes.len(), "bytes sent");

        if let Some(remote) = &self.remote {
            invoke(remote, &self.name, bytes);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for MemoryLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryLine")
            .field("name", &self.name)
            .field("connected", &self.remote.is_some())
            .finish()
    }
}
