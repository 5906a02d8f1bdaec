//! Link layer over several serial lines, selected by next-hop address.
//!
//! Each configured peer gets one serial line and one SLIP decoder. Outbound
//! datagrams are routed by next hop; inbound datagrams from every line are
//! merged into a single upward receiver.

pub mod config;
pub mod error;
pub mod multiplexer;
pub mod receiver;

pub use config::LinkConfig;
pub use error::{BoxError, LinkError, Result};
pub use multiplexer::LinkMultiplexer;
pub use receiver::DatagramReceiver;
