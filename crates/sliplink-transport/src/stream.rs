use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use tracing::{debug, trace, warn};

use crate::error::{Result, TransportError};
use crate::traits::{ByteReceiver, SerialLine};

/// Size of each read issued by the reader thread.
pub const DEFAULT_READ_CHUNK: usize = 4 * 1024;

#[derive(Default)]
struct Inbound {
    receiver: Option<ByteReceiver>,
    /// Bytes read before any receiver was registered.
    backlog: Vec<u8>,
}

/// A serial line over an arbitrary byte stream.
///
/// A dedicated reader thread pulls chunks from `reader` and hands them to the
/// registered receiver in arrival order. Bytes that arrive before a receiver is
/// registered are held and flushed to the first registration. `send` writes
/// the whole buffer to `writer` and flushes.
///
/// The reader thread exits on EOF or on a non-retryable read error.
pub struct StreamLine {
    name: String,
    writer: Mutex<Box<dyn Write + Send>>,
    inbound: Arc<Mutex<Inbound>>,
    reader_done: Arc<AtomicBool>,
    reader_thread: Option<JoinHandle<()>>,
    closed: AtomicBool,
}

impl StreamLine {
    /// Start a line reading from `reader` and writing to `writer`.
    ///
    /// For a duplex stream such as a tty file or a socket, pass a
    /// `try_clone()` of the stream as the reader.
    pub fn spawn<R, W>(name: impl Into<String>, reader: R, writer: W) -> Result<Self>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let name = name.into();
        let inbound = Arc::new(Mutex::new(Inbound::default()));
        let reader_done = Arc::new(AtomicBool::new(false));

        let reader_thread = {
            let inbound = Arc::clone(&inbound);
            let reader_done = Arc::clone(&reader_done);
            let thread_name = format!("sliplink-rx-{name}");
            let line = name.clone();
            std::thread::Builder::new()
                .name(thread_name)
                .spawn(move || {
                    read_loop(&line, reader, &inbound);
                    reader_done.store(true, Ordering::SeqCst);
                })?
        };

        debug!(line = %name, "stream line started");
        Ok(Self {
            name,
            writer: Mutex::new(Box::new(writer)),
            inbound,
            reader_done,
            reader_thread: Some(reader_thread),
            closed: AtomicBool::new(false),
        })
    }

    /// Whether the reader thread has stopped (EOF or read error).
    pub fn is_reader_finished(&self) -> bool {
        self.reader_done.load(Ordering::SeqCst)
    }

    /// Stop accepting sends. The reader thread keeps running until its stream
    /// reports EOF.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(line = %self.name, "stream line closed");
        }
    }

    /// Wait for the reader thread to exit.
    pub fn join_reader(&mut self) {
        if let Some(handle) = self.reader_thread.take() {
            if handle.join().is_err() {
                warn!(line = %self.name, "reader thread panicked");
            }
        }
    }
}

fn read_loop<R: Read>(line: &str, mut reader: R, inbound: &Mutex<Inbound>) {
    let mut chunk = vec![0u8; DEFAULT_READ_CHUNK];
    loop {
        let read = match reader.read(&mut chunk) {
            Ok(0) => {
                debug!(line, "stream reached EOF");
                return;
            }
            Ok(n) => n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => {
                warn!(line, error = %err, "stream read failed; stopping reader");
                return;
            }
        };

        trace!(line, len = read, "bytes received");
        let mut inbound = inbound.lock().unwrap_or_else(PoisonError::into_inner);
        match inbound.receiver.as_mut() {
            Some(receiver) => receiver(&chunk[..read]),
            None => inbound.backlog.extend_from_slice(&chunk[..read]),
        }
    }
}

impl SerialLine for StreamLine {
    fn register_receiver(&self, mut receiver: ByteReceiver) {
        let mut inbound = self.inbound.lock().unwrap_or_else(PoisonError::into_inner);
        if !inbound.backlog.is_empty() {
            let backlog = std::mem::take(&mut inbound.backlog);
            debug!(line = %self.name, len = backlog.len(), "flushing backlog to new receiver");
            receiver(&backlog);
        }
        inbound.receiver = Some(receiver);
    }

    fn send(&self, bytes: &[u8]) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }

        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let mut offset = 0usize;
        while offset < bytes.len() {
            match writer.write(&bytes[offset..]) {
                Ok(0) => return Err(TransportError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }

        loop {
            match writer.flush() {
                Ok(()) => break,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }

        trace!(line = %self.name, len = bytes.len(), "bytes sent");
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for StreamLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamLine")
            .field("name", &self.name)
            .field("reader_finished", &self.is_reader_finished())
            .finish()
    }
}
