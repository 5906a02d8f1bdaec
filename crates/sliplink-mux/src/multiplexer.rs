use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use sliplink_frame::{encode, DecoderStats, SlipDecoder};
use sliplink_transport::SerialLine;
use tracing::{debug, info};

use crate::config::LinkConfig;
use crate::error::{BoxError, LinkError, Result};
use crate::receiver::{DatagramReceiver, ReceiverSlot};

/// A serial line bound to one peer, with the decoder for its inbound bytes.
struct Binding {
    line: Arc<dyn SerialLine>,
    decoder: Arc<Mutex<SlipDecoder>>,
}

/// SLIP link layer over a fixed set of point-to-point serial lines.
///
/// Built once from a mapping of peer IPv4 address to the line that reaches
/// it. Outbound datagrams are framed and written to the line bound to the
/// next hop. Inbound datagrams from every line go, untagged and in per-line
/// arrival order, to the single registered receiver.
pub struct LinkMultiplexer {
    links: BTreeMap<Ipv4Addr, Binding>,
    receiver: ReceiverSlot,
    config: LinkConfig,
}

impl LinkMultiplexer {
    /// Bind every `(peer address, line)` pair with default configuration.
    pub fn new<I, K>(lines: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, Arc<dyn SerialLine>)>,
        K: AsRef<str>,
    {
        Self::with_config(lines, LinkConfig::default())
    }

    /// Bind every `(peer address, line)` pair with explicit configuration.
    ///
    /// Fails with [`LinkError::Configuration`] if the mapping is empty, a key
    /// is not an IPv4 address, or two keys name the same address. Nothing is
    /// registered on any line unless the whole mapping is valid.
    pub fn with_config<I, K>(lines: I, config: LinkConfig) -> Result<Self>
    where
        I: IntoIterator<Item = (K, Arc<dyn SerialLine>)>,
        K: AsRef<str>,
    {
        let mut parsed: BTreeMap<Ipv4Addr, Arc<dyn SerialLine>> = BTreeMap::new();
        for (key, line) in lines {
            let key = key.as_ref();
            let peer: Ipv4Addr = key.parse().map_err(|_| {
                LinkError::Configuration(format!("peer address {key:?} is not an IPv4 address"))
            })?;
            // A line has a single receiver slot, so it can serve only one peer.
            if let Some(other) = parsed.iter().find_map(|(other, bound)| {
                same_line(bound, &line).then_some(*other)
            }) {
                return Err(LinkError::Configuration(format!(
                    "line {:?} bound to both {other} and {peer}",
                    line.name()
                )));
            }
            if parsed.insert(peer, line).is_some() {
                return Err(LinkError::Configuration(format!(
                    "peer address {peer} configured more than once"
                )));
            }
        }
        if parsed.is_empty() {
            return Err(LinkError::Configuration(
                "at least one peer line is required".to_string(),
            ));
        }

        let receiver = ReceiverSlot::default();
        let links = parsed
            .into_iter()
            .map(|(peer, line)| {
                let binding = bind(peer, line, &config, &receiver);
                (peer, binding)
            })
            .collect::<BTreeMap<_, _>>();

        info!(peers = links.len(), "link layer up");
        Ok(Self {
            links,
            receiver,
            config,
        })
    }

    /// Register the upward receiver, replacing any previous one.
    ///
    /// Returns `true` if a previous receiver was replaced.
    pub fn register_receiver<F>(&self, receiver: F) -> bool
    where
        F: Fn(Bytes) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.receiver.replace(Arc::new(receiver))
    }

    /// Register the upward receiver only if none is registered.
    pub fn try_register_receiver<F>(&self, receiver: F) -> Result<()>
    where
        F: Fn(Bytes) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.receiver.try_set(Arc::new(receiver))
    }

    /// Register an already shared receiver, replacing any previous one.
    pub fn register_shared_receiver(&self, receiver: DatagramReceiver) -> bool {
        self.receiver.replace(receiver)
    }

    /// Remove the upward receiver. Datagrams arriving meanwhile are dropped.
    pub fn clear_receiver(&self) -> bool {
        self.receiver.clear()
    }

    /// Whether an upward receiver is registered.
    pub fn has_receiver(&self) -> bool {
        self.receiver.is_set()
    }

    /// Frame `datagram` and write it to the line reaching `next_hop`.
    ///
    /// `next_hop` is a dotted-quad IPv4 address. An address that is not
    /// configured (or not an address at all) fails with
    /// [`LinkError::UnknownPeer`] without touching any line. Line failures are
    /// returned as [`LinkError::Transport`].
    pub fn send(&self, datagram: &[u8], next_hop: &str) -> Result<()> {
        let peer: Ipv4Addr = next_hop
            .parse()
            .map_err(|_| LinkError::UnknownPeer(next_hop.to_string()))?;
        self.send_to(datagram, peer)
    }

    /// Like [`LinkMultiplexer::send`] with an already parsed address.
    pub fn send_to(&self, datagram: &[u8], next_hop: Ipv4Addr) -> Result<()> {
        let binding = self
            .links
            .get(&next_hop)
            .ok_or_else(|| LinkError::UnknownPeer(next_hop.to_string()))?;

        let frame = encode(datagram);
        binding.line.send(&frame)?;
        debug!(peer = %next_hop, len = datagram.len(), wire = frame.len(), "datagram sent");
        Ok(())
    }

    /// Configured peer addresses, in ascending order.
    pub fn peers(&self) -> impl Iterator<Item = Ipv4Addr> + '_ {
        self.links.keys().copied()
    }

    /// Whether `next_hop` is a configured peer.
    pub fn contains_peer(&self, next_hop: &str) -> bool {
        next_hop
            .parse::<Ipv4Addr>()
            .is_ok_and(|peer| self.links.contains_key(&peer))
    }

    /// Number of configured peers.
    pub fn peer_count(&self) -> usize {
        self.links.len()
    }

    /// Decoder counters for the line reaching `peer`.
    pub fn decoder_stats(&self, peer: Ipv4Addr) -> Option<DecoderStats> {
        self.links.get(&peer).map(|binding| {
            binding
                .decoder
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .stats()
        })
    }

    /// Current link configuration.
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Checksum hint for the layer above. Has no effect on framing.
    pub fn ignore_checksum(&self) -> bool {
        self.config.ignore_checksum
    }
}

/// Identity of the line object, ignoring the vtable half of the pointer.
fn same_line(a: &Arc<dyn SerialLine>, b: &Arc<dyn SerialLine>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

fn bind(
    peer: Ipv4Addr,
    line: Arc<dyn SerialLine>,
    config: &LinkConfig,
    receiver: &ReceiverSlot,
) -> Binding {
    let decoder = Arc::new(Mutex::new(SlipDecoder::with_config(config.decoder.clone())));

    let feed_decoder = Arc::clone(&decoder);
    let upward = receiver.clone();
    line.register_receiver(Box::new(move |bytes: &[u8]| {
        // Decode under the lock, deliver without it: the receiver may call
        // back into the link.
        let datagrams: Vec<Bytes> = feed_decoder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .feed(bytes)
            .collect();
        for datagram in datagrams {
            upward.deliver(datagram, peer);
        }
    }));

    debug!(%peer, line = line.name(), "line bound");
    Binding { line, decoder }
}

impl Drop for LinkMultiplexer {
    fn drop(&mut self) {
        for (peer, binding) in &self.links {
            binding.line.register_receiver(Box::new(|_: &[u8]| {}));
            debug!(%peer, "line unbound");
        }
    }
}

impl std::fmt::Debug for LinkMultiplexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkMultiplexer")
            .field("peers", &self.links.keys().collect::<Vec<_>>())
            .field("has_receiver", &self.receiver.is_set())
            .field("config", &self.config)
            .finish()
    }
}
