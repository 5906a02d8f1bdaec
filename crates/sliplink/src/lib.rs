//! SLIP link layer for point-to-point serial lines.
//!
//! sliplink frames datagrams with SLIP byte stuffing, writes them to the
//! serial line reaching the next hop, and reassembles inbound datagrams from
//! every line into a single upward stream.
//!
//! # Crate Structure
//!
//! - [`transport`]: Serial line contract plus in-memory and stream lines
//! - [`frame`]: SLIP encoder and streaming decoder
//! - [`link`]: Next-hop multiplexer over several lines

/// Re-export transport types.
pub mod transport {
    pub use sliplink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use sliplink_frame::*;
}

/// Re-export link types.
pub mod link {
    pub use sliplink_mux::*;
}

pub use sliplink_mux::{LinkConfig, LinkError, LinkMultiplexer};
