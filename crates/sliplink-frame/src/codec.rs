use bytes::{BufMut, Bytes, BytesMut};

/// Frame delimiter.
pub const END: u8 = 0xC0;

/// Escape byte.
pub const ESC: u8 = 0xDB;

/// Escaped form of [`END`], following an [`ESC`].
pub const ESC_END: u8 = 0xDC;

/// Escaped form of [`ESC`], following an [`ESC`].
pub const ESC_ESC: u8 = 0xDD;

/// Number of bytes `datagram` occupies on the wire, delimiters included.
pub fn encoded_len(datagram: &[u8]) -> usize {
    let reserved = datagram.iter().filter(|&&b| b == END || b == ESC).count();
    datagram.len() + reserved + 2
}

/// Encode a datagram into a complete frame.
///
/// Wire format:
/// ```text
/// ┌──────┬───────────────────────────────┬──────┐
/// │ 0xC0 │ payload, 0xDB -> 0xDB 0xDD    │ 0xC0 │
/// │ END  │          0xC0 -> 0xDB 0xDC    │ END  │
/// └──────┴───────────────────────────────┴──────┘
/// ```
///
/// Total over any input, including the empty datagram.
pub fn encode(datagram: &[u8]) -> Bytes {
    let mut dst = BytesMut::with_capacity(encoded_len(datagram));
    encode_into(datagram, &mut dst);
    dst.freeze()
}

/// Encode a datagram, appending the frame to `dst`.
pub fn encode_into(datagram: &[u8], dst: &mut BytesMut) {
    dst.reserve(encoded_len(datagram));
    dst.put_u8(END);

    // Copy runs of ordinary bytes in one go; only reserved bytes are stuffed.
    let mut rest = datagram;
    while let Some(pos) = rest.iter().position(|&b| b == END || b == ESC) {
        dst.put_slice(&rest[..pos]);
        match rest[pos] {
            ESC => dst.put_slice(&[ESC, ESC_ESC]),
            _ => dst.put_slice(&[ESC, ESC_END]),
        }
        rest = &rest[pos + 1..];
    }
    dst.put_slice(rest);

    dst.put_u8(END);
}

/// Configuration for the frame decoder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecoderConfig {
    /// Largest datagram the decoder will reconstruct. A frame growing past
    /// this is discarded up to the next delimiter. Default: unbounded.
    pub max_datagram_size: Option<usize>,
}

impl DecoderConfig {
    /// Bound reconstructed datagrams to `max` bytes.
    pub fn with_max_datagram_size(mut self, max: usize) -> Self {
        self.max_datagram_size = Some(max);
        self
    }
}
