use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{encode_into, DecoderConfig};
use crate::decoder::SlipDecoder;
use crate::error::{FrameError, Result};

/// `tokio_util` codec speaking SLIP frames.
///
/// Use with `tokio_util::codec::Framed` over any async byte stream. The
/// decoder side has exactly the semantics of [`SlipDecoder`]; the encoder side
/// rejects datagrams over the configured maximum instead of sending frames the
/// far end would discard.
#[derive(Debug, Default)]
pub struct SlipCodec {
    decoder: SlipDecoder,
}

impl SlipCodec {
    /// Create a codec with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a codec with explicit configuration.
    pub fn with_config(config: DecoderConfig) -> Self {
        Self {
            decoder: SlipDecoder::with_config(config),
        }
    }

    /// The underlying stream decoder.
    pub fn decoder(&self) -> &SlipDecoder {
        &self.decoder
    }

    fn check_size(&self, len: usize) -> Result<()> {
        match self.decoder.config().max_datagram_size {
            Some(max) if len > max => Err(FrameError::DatagramTooLarge { size: len, max }),
            _ => Ok(()),
        }
    }
}

impl Decoder for SlipCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        let mut consumed = 0;
        let mut found = None;
        for &byte in src.iter() {
            consumed += 1;
            if let Some(datagram) = self.decoder.push_byte(byte) {
                found = Some(datagram);
                break;
            }
        }
        src.advance(consumed);
        Ok(found)
    }
}

impl Encoder<Bytes> for SlipCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<()> {
        Encoder::<&[u8]>::encode(self, item.as_ref(), dst)
    }
}

impl Encoder<&[u8]> for SlipCodec {
    type Error = FrameError;

    fn encode(&mut self, item: &[u8], dst: &mut BytesMut) -> Result<()> {
        self.check_size(item.len())?;
        encode_into(item, dst);
        Ok(())
    }
}
