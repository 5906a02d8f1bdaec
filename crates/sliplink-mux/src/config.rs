use sliplink_frame::DecoderConfig;

/// Link layer behavior shared by every line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkConfig {
    /// Applied to each line's decoder.
    pub decoder: DecoderConfig,
    /// Checksum handling hint for the layer above. SLIP carries no checksum,
    /// so the link itself never reads this.
    pub ignore_checksum: bool,
}

impl LinkConfig {
    /// Bound reconstructed datagrams on every line.
    pub fn with_max_datagram_size(mut self, max: usize) -> Self {
        self.decoder.max_datagram_size = Some(max);
        self
    }

    /// Set the checksum hint exposed to the layer above.
    pub fn with_ignore_checksum(mut self, ignore: bool) -> Self {
        self.ignore_checksum = ignore;
        self
    }
}
