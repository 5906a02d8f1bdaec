use std::any::Any;
use std::net::Ipv4Addr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use bytes::Bytes;
use tracing::{debug, error, trace};

use crate::error::{BoxError, LinkError, Result};

/// The upward consumer of reconstructed datagrams.
///
/// Lines deliver on their own threads, so the receiver may be invoked
/// concurrently for datagrams arriving on different lines.
pub type DatagramReceiver = Arc<dyn Fn(Bytes) -> std::result::Result<(), BoxError> + Send + Sync>;

/// Single-subscriber slot shared by every line's dispatch path.
#[derive(Clone, Default)]
pub(crate) struct ReceiverSlot {
    inner: Arc<RwLock<Option<DatagramReceiver>>>,
}

impl ReceiverSlot {
    /// Store `receiver`, returning whether one was replaced.
    pub(crate) fn replace(&self, receiver: DatagramReceiver) -> bool {
        let previous = self
            .inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(receiver);
        debug!(replaced = previous.is_some(), "datagram receiver registered");
        previous.is_some()
    }

    /// Store `receiver` only if the slot is empty.
    pub(crate) fn try_set(&self, receiver: DatagramReceiver) -> Result<()> {
        let mut slot = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Err(LinkError::ReceiverAlreadyRegistered);
        }
        *slot = Some(receiver);
        debug!("datagram receiver registered");
        Ok(())
    }

    pub(crate) fn clear(&self) -> bool {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
    }

    pub(crate) fn is_set(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Hand one datagram to the receiver.
    ///
    /// This is the only place the receiver is invoked. An error or a panic
    /// from it is logged and swallowed so the calling line keeps decoding.
    pub(crate) fn deliver(&self, datagram: Bytes, peer: Ipv4Addr) {
        // Clone out so no lock is held while the consumer runs.
        let receiver = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(receiver) = receiver else {
            trace!(%peer, len = datagram.len(), "no datagram receiver; dropping");
            return;
        };

        let len = datagram.len();
        let failure = match panic::catch_unwind(AssertUnwindSafe(|| receiver(datagram))) {
            Ok(Ok(())) => return,
            Ok(Err(err)) => LinkError::ConsumerCallback(err.to_string()),
            Err(payload) => LinkError::ConsumerCallback(panic_message(payload.as_ref())),
        };
        error!(%peer, len, error = %failure, "datagram receiver failed; continuing");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("panicked: {msg}")
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    const PEER: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);

    fn recording() -> (DatagramReceiver, Arc<Mutex<Vec<Bytes>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let receiver: DatagramReceiver = Arc::new(move |datagram| {
            sink.lock().unwrap().push(datagram);
            Ok(())
        });
        (receiver, seen)
    }

    #[test]
    fn deliver_without_receiver_is_noop() {
        let slot = ReceiverSlot::default();
        assert!(!slot.is_set());
        slot.deliver(Bytes::from_static(b"x"), PEER);
    }

    #[test]
    fn replace_reports_previous() {
        let slot = ReceiverSlot::default();
        let (first, first_seen) = recording();
        let (second, second_seen) = recording();

        assert!(!slot.replace(first));
        assert!(slot.replace(second));
        slot.deliver(Bytes::from_static(b"x"), PEER);

        assert!(first_seen.lock().unwrap().is_empty());
        assert_eq!(second_seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn try_set_refuses_occupied_slot() {
        let slot = ReceiverSlot::default();
        let (first, _) = recording();
        let (second, _) = recording();

        slot.try_set(first).unwrap();
        assert!(matches!(slot.try_set(second), Err(LinkError::ReceiverAlreadyRegistered)));

        assert!(slot.clear());
        assert!(!slot.clear());
        let (third, _) = recording();
        slot.try_set(third).unwrap();
    }

    #[test]
    fn error_from_receiver_is_swallowed() {
        let slot = ReceiverSlot::default();
        let calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&calls);
        slot.replace(Arc::new(move |_| {
            *counter.lock().unwrap() += 1;
            Err("upper layer rejected datagram".into())
        }));

        slot.deliver(Bytes::from_static(b"a"), PEER);
        slot.deliver(Bytes::from_static(b"b"), PEER);
        assert_eq!(*calls.lock().unwrap(), 2);
    }

    #[test]
    fn panic_from_receiver_is_contained() {
        let slot = ReceiverSlot::default();
        slot.replace(Arc::new(|_| panic!("consumer bug")));
        slot.deliver(Bytes::from_static(b"a"), PEER);

        let (receiver, seen) = recording();
        slot.replace(receiver);
        slot.deliver(Bytes::from_static(b"b"), PEER);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn receiver_may_reregister_itself() {
        let slot = ReceiverSlot::default();
        let inner = slot.clone();
        slot.replace(Arc::new(move |_| {
            inner.clear();
            Ok(())
        }));
        slot.deliver(Bytes::from_static(b"a"), PEER);
        assert!(!slot.is_set());
    }

    #[test]
    fn panic_messages() {
        assert_eq!(panic_message(&"boom"), "panicked: boom");
        assert_eq!(panic_message(&"boom".to_string()), "panicked: boom");
        assert_eq!(panic_message(&7u8), "panicked");
    }
}
