//! Serial line transport abstraction.
//!
//! The framing layer never opens ttys itself. It talks to anything that can
//! hand it raw incoming bytes and accept raw outgoing bytes, described by the
//! [`SerialLine`] trait:
//! - [`MemoryLine`]: a connected in-memory pair, handy for tests and demos
//! - [`StreamLine`]: any `Read`/`Write` byte stream (pty, socket, pipe) with a
//!   reader thread delivering incoming chunks
//!
//! This is the lowest layer of sliplink.

pub mod error;
pub mod memory;
pub mod stream;
pub mod traits;

pub use error::{Result, TransportError};
pub use memory::MemoryLine;
pub use stream::{StreamLine, DEFAULT_READ_CHUNK};
pub use traits::{ByteReceiver, SerialLine};
