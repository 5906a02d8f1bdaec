use std::iter::FusedIterator;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, trace, warn};

use crate::codec::{DecoderConfig, END, ESC, ESC_END, ESC_ESC};

const INITIAL_BUFFER_CAPACITY: usize = 1024;

/// One byte of lookback: whether the previous raw byte was an unresolved ESC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Normal,
    SawEsc,
}

/// Running counters for one decoder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    /// Datagrams handed out.
    pub datagrams: u64,
    /// Delimiters that closed an empty frame (back-to-back `END`s).
    pub empty_frames: u64,
    /// Frames dropped for exceeding `max_datagram_size`.
    pub oversize_discarded: u64,
    /// `ESC` followed by something other than `ESC_END`/`ESC_ESC`.
    pub escape_violations: u64,
}

/// Streaming SLIP decoder for a single line.
///
/// Raw bytes may arrive in chunks of any size; a frame split across chunks,
/// including between the two bytes of an escape pair, is reassembled.
///
/// The pending ESC of a split escape pair is held in the lookback state rather
/// than in the reconstruction buffer, so the buffer only ever holds decoded
/// payload bytes.
///
/// An ESC followed by anything other than `ESC_END`/`ESC_ESC` is a protocol
/// violation; the ESC is kept as a literal byte and the following byte is
/// decoded normally.
#[derive(Debug)]
pub struct SlipDecoder {
    partial: BytesMut,
    state: State,
    discarding: bool,
    config: DecoderConfig,
    stats: DecoderStats,
}

impl Default for SlipDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SlipDecoder {
    /// Create a decoder with default configuration.
    pub fn new() -> Self {
        Self::with_config(DecoderConfig::default())
    }

    /// Create a decoder with explicit configuration.
    pub fn with_config(config: DecoderConfig) -> Self {
        Self {
            partial: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            state: State::Normal,
            discarding: false,
            config,
            stats: DecoderStats::default(),
        }
    }

    /// Feed a chunk of raw line bytes.
    ///
    /// Returns a lazy iterator over the datagrams completed by this chunk, in
    /// arrival order. Dropping the iterator early still runs the rest of the
    /// chunk through the decoder; datagrams it would have yielded are
    /// discarded.
    pub fn feed<'a>(&'a mut self, chunk: &'a [u8]) -> Feed<'a> {
        Feed {
            decoder: self,
            input: chunk,
        }
    }

    /// Process a single raw byte, returning a datagram if it closed one.
    pub fn push_byte(&mut self, byte: u8) -> Option<Bytes> {
        if self.state == State::SawEsc {
            self.state = State::Normal;
            match byte {
                ESC_ESC => {
                    self.append(ESC);
                    return None;
                }
                // Escaped END: payload, never a boundary.
                ESC_END => {
                    self.append(END);
                    return None;
                }
                _ => {
                    self.stats.escape_violations += 1;
                    trace!(byte, "ESC not followed by ESC_END/ESC_ESC; keeping it literally");
                    self.append(ESC);
                }
            }
        }

        match byte {
            ESC => {
                self.state = State::SawEsc;
                None
            }
            END => self.finish_frame(),
            _ => {
                self.append(byte);
                None
            }
        }
    }

    fn append(&mut self, byte: u8) {
        if self.discarding {
            return;
        }
        if let Some(max) = self.config.max_datagram_size {
            if self.partial.len() >= max {
                warn!(max, "datagram exceeds maximum size; discarding frame");
                self.partial.clear();
                self.discarding = true;
                self.stats.oversize_discarded += 1;
                return;
            }
        }
        self.partial.put_u8(byte);
    }

    fn finish_frame(&mut self) -> Option<Bytes> {
        if self.discarding {
            self.discarding = false;
            return None;
        }
        if self.partial.is_empty() {
            self.stats.empty_frames += 1;
            return None;
        }
        self.stats.datagrams += 1;
        let datagram = self.partial.split().freeze();
        trace!(len = datagram.len(), "datagram reconstructed");
        Some(datagram)
    }

    /// Drop any partially reconstructed frame and pending escape.
    pub fn reset(&mut self) {
        if !self.partial.is_empty() || self.state == State::SawEsc {
            debug!(pending = self.partial.len(), "decoder reset with frame in progress");
        }
        self.partial.clear();
        self.state = State::Normal;
        self.discarding = false;
    }

    /// Number of decoded bytes waiting for the closing delimiter.
    pub fn pending_len(&self) -> usize {
        self.partial.len()
    }

    /// Whether the last byte seen was an ESC still waiting for its partner.
    pub fn is_mid_escape(&self) -> bool {
        self.state == State::SawEsc
    }

    /// Counters since construction.
    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Current decoder configuration.
    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Update the maximum datagram size for subsequent frames.
    pub fn set_max_datagram_size(&mut self, max: Option<usize>) {
        self.config.max_datagram_size = max;
    }
}

/// Datagrams completed by one chunk. See [`SlipDecoder::feed`].
#[derive(Debug)]
pub struct Feed<'a> {
    decoder: &'a mut SlipDecoder,
    input: &'a [u8],
}

impl Feed<'_> {
    /// Raw bytes of the chunk not yet processed.
    pub fn remaining(&self) -> usize {
        self.input.len()
    }
}

impl Iterator for Feed<'_> {
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        while let Some((&byte, rest)) = self.input.split_first() {
            self.input = rest;
            if let Some(datagram) = self.decoder.push_byte(byte) {
                return Some(datagram);
            }
        }
        None
    }
}

impl FusedIterator for Feed<'_> {}

impl Drop for Feed<'_> {
    fn drop(&mut self) {
        for datagram in self.by_ref() {
            debug!(len = datagram.len(), "datagram dropped with unconsumed feed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode;

    fn decode_chunks(decoder: &mut SlipDecoder, chunks: &[&[u8]]) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        for chunk in chunks {
            out.extend(decoder.feed(chunk).map(|d| d.to_vec()));
        }
        out
    }

    fn decode_all(wire: &[u8]) -> Vec<Vec<u8>> {
        decode_chunks(&mut SlipDecoder::new(), &[wire])
    }

    fn decode_split(wire: &[u8], size: usize) -> Vec<Vec<u8>> {
        let chunks: Vec<&[u8]> = wire.chunks(size).collect();
        decode_chunks(&mut SlipDecoder::new(), &chunks)
    }

    fn tricky_datagrams() -> Vec<Vec<u8>> {
        vec![
            b"hello".to_vec(),
            vec![0xDB],
            vec![0xC0],
            vec![0xDB, 0xDD],
            vec![0xDB, 0xDC],
            vec![0xDB, 0xDB, 0xDD, 0xDD],
            vec![0xC0, 0xDB, 0xC0, 0xDB],
            vec![0xDD, 0xDC, 0xDB],
            (0..=255u8).collect(),
        ]
    }

    #[test]
    fn test_single_frame() {
        assert_eq!(decode_all(b"\xc0hello\xc0"), vec![b"hello".to_vec()]);
    }

    #[test]
    fn test_escape_sequences_decode() {
        let out = decode_all(&[0xC0, 0xDB, 0xDD, 0xDB, 0xDC, 0xC0]);
        assert_eq!(out, vec![vec![0xDB, 0xC0]]);
    }

    #[test]
    fn test_empty_frames_ignored() {
        let mut decoder = SlipDecoder::new();
        let out = decode_chunks(&mut decoder, &[&[0xC0u8, 0xC0, 0xC0][..]]);
        assert!(out.is_empty());
        assert_eq!(decoder.stats().empty_frames, 3);
        assert_eq!(decoder.stats().datagrams, 0);
    }

    #[test]
    fn test_roundtrip_any_chunking() {
        for datagram in tricky_datagrams() {
            let wire = encode(&datagram);
            for size in [1, 2, 3, 7, wire.len()] {
                assert_eq!(
                    decode_split(&wire, size),
                    vec![datagram.clone()],
                    "datagram {datagram:02x?} split every {size} bytes"
                );
            }
        }
    }

    #[test]
    fn test_back_to_back_frames_share_delimiter() {
        let out = decode_all(b"\xc0one\xc0two\xc0\xc0three\xc0");
        assert_eq!(out, vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()]);
    }

    #[test]
    fn test_concatenated_encodings() {
        let mut wire = Vec::new();
        for datagram in tricky_datagrams() {
            wire.extend_from_slice(&encode(&datagram));
        }
        assert_eq!(decode_split(&wire, 1), tricky_datagrams());
        assert_eq!(decode_all(&wire), tricky_datagrams());
    }

    #[test]
    fn test_escaped_end_then_real_end_closes_frame() {
        assert_eq!(decode_all(&[0xC0, 0xDB, 0xDC, 0xC0]), vec![vec![0xC0]]);
        assert_eq!(decode_all(&[0xC0, 0xDB, 0xDD, 0xC0]), vec![vec![0xDB]]);
    }

    #[test]
    fn test_escape_completion_does_not_chain() {
        // After ESC ESC_ESC the lookback is the raw ESC_ESC, so a following
        // literal 0xDD is payload rather than a second escape completion.
        let out = decode_all(&[0xC0, 0xDB, 0xDD, 0xDD, 0xC0]);
        assert_eq!(out, vec![vec![0xDB, 0xDD]]);
    }

    #[test]
    fn test_escape_pair_split_across_chunks() {
        let mut decoder = SlipDecoder::new();
        assert_eq!(decoder.feed(&[0xC0, 0x01, 0xDB]).count(), 0);
        assert!(decoder.is_mid_escape());
        assert_eq!(decoder.pending_len(), 1);

        let out: Vec<Bytes> = decoder.feed(&[0xDC, 0xC0]).collect();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_ref(), &[0x01, 0xC0]);
        assert!(!decoder.is_mid_escape());
    }

    #[test]
    fn test_stray_escape_kept_literally() {
        let mut decoder = SlipDecoder::new();
        let out = decode_chunks(&mut decoder, &[&[0xC0u8, 0xDB, 0x41, 0xC0][..]]);
        assert_eq!(out, vec![vec![0xDB, 0x41]]);
        assert_eq!(decoder.stats().escape_violations, 1);
    }

    #[test]
    fn test_stray_escape_before_delimiter() {
        let out = decode_all(&[0xC0, 0x41, 0xDB, 0xC0]);
        assert_eq!(out, vec![vec![0x41, 0xDB]]);
    }

    #[test]
    fn test_double_escape_then_partner() {
        // The first ESC is stray, the second starts a real pair.
        let out = decode_all(&[0xC0, 0xDB, 0xDB, 0xDD, 0xC0]);
        assert_eq!(out, vec![vec![0xDB, 0xDB]]);
    }

    #[test]
    fn test_leading_garbage_becomes_datagram() {
        // Bytes before the first END are a frame like any other.
        let out = decode_all(b"noise\xc0data\xc0");
        assert_eq!(out, vec![b"noise".to_vec(), b"data".to_vec()]);
    }

    #[test]
    fn test_unterminated_frame_stays_pending() {
        let mut decoder = SlipDecoder::new();
        assert_eq!(decoder.feed(b"\xc0partial").count(), 0);
        assert_eq!(decoder.pending_len(), 7);

        decoder.reset();
        assert_eq!(decoder.pending_len(), 0);
        assert_eq!(decode_chunks(&mut decoder, &[&b"next\xc0"[..]]), vec![b"next".to_vec()]);
    }

    #[test]
    fn test_reset_clears_pending_escape() {
        let mut decoder = SlipDecoder::new();
        assert_eq!(decoder.feed(&[0xC0, 0xDB]).count(), 0);
        decoder.reset();
        assert!(!decoder.is_mid_escape());
        let out = decode_chunks(&mut decoder, &[&[0xDDu8, 0xC0][..]]);
        assert_eq!(out, vec![vec![0xDD]]);
    }

    #[test]
    fn test_dropped_feed_still_advances_state() {
        let mut decoder = SlipDecoder::new();
        let wire = b"\xc0first\xc0\xc0second\xc0\xc0thi";
        {
            let mut feed = decoder.feed(wire);
            assert_eq!(feed.next().unwrap().as_ref(), b"first");
            assert!(feed.remaining() > 0);
        }
        assert_eq!(decoder.pending_len(), 3);
        assert_eq!(decoder.stats().datagrams, 2);
        assert_eq!(decode_chunks(&mut decoder, &[&b"rd\xc0"[..]]), vec![b"third".to_vec()]);
    }

    #[test]
    fn test_oversize_frame_discarded_and_resynced() {
        let mut decoder =
            SlipDecoder::with_config(DecoderConfig::default().with_max_datagram_size(4));
        let mut wire = encode(b"toolong").to_vec();
        wire.extend_from_slice(&encode(b"ok"));
        wire.extend_from_slice(&encode(b"four"));

        let out = decode_chunks(&mut decoder, &[wire.as_slice()]);
        assert_eq!(out, vec![b"ok".to_vec(), b"four".to_vec()]);
        assert_eq!(decoder.stats().oversize_discarded, 1);
    }

    #[test]
    fn test_oversize_discard_honours_escaped_end() {
        let mut decoder =
            SlipDecoder::with_config(DecoderConfig::default().with_max_datagram_size(2));
        // The escaped END inside the oversized frame must not end the discard.
        let mut wire = encode(&[1, 2, 3, 0xC0, 4]).to_vec();
        wire.extend_from_slice(&encode(&[9]));

        assert_eq!(decode_chunks(&mut decoder, &[wire.as_slice()]), vec![vec![9]]);
    }

    #[test]
    fn test_set_max_datagram_size() {
        let mut decoder = SlipDecoder::new();
        decoder.set_max_datagram_size(Some(1));
        assert_eq!(decoder.config().max_datagram_size, Some(1));
        assert!(decode_chunks(&mut decoder, &[&b"\xc0ab\xc0"[..]]).is_empty());

        decoder.set_max_datagram_size(None);
        assert_eq!(decode_chunks(&mut decoder, &[&b"\xc0ab\xc0"[..]]), vec![b"ab".to_vec()]);
    }
}
