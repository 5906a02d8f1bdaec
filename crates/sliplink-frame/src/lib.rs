//! SLIP byte stuffing and streaming frame reconstruction.
//!
//! This is the core of sliplink. A datagram goes on the wire as
//! `END <escaped payload> END`, where inside the payload:
//! - `ESC` (0xDB) becomes `ESC ESC_ESC` (0xDB 0xDD)
//! - `END` (0xC0) becomes `ESC ESC_END` (0xDB 0xDC)
//!
//! [`encode`] is a pure function. [`SlipDecoder`] is the per-line state
//! machine fed with raw bytes in arbitrary chunks.

pub mod codec;
pub mod decoder;
pub mod error;
#[cfg(feature = "async")]
pub mod tokio_codec;

pub use codec::{encode, encode_into, encoded_len, DecoderConfig, END, ESC, ESC_END, ESC_ESC};
pub use decoder::{DecoderStats, Feed, SlipDecoder};
pub use error::{FrameError, Result};
#[cfg(feature = "async")]
pub use tokio_codec::SlipCodec;
