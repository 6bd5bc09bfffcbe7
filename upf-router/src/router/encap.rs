use crate::data::TunnelTable;
use crate::packet::{Ipv4View, ports};
use gtpv1u::GtpTeid;
use slog::{Logger, info};
use std::net::Ipv4Addr;

/// Strategy hook consulted when a plain IPv4 packet belongs to no known
/// subscriber.  Supplied at construction, replaceable for testing.
pub trait UnknownSubscriberHook {
    /// Return true to leave default handling to the caller, false if the
    /// packet has been fully handled and nothing should be forwarded.
    fn on_unknown(&mut self, ipv4_packet: &[u8]) -> bool;

    /// Runtime toggle for hooks that dump unknown traffic.
    fn enable_dump(&mut self, _enabled: bool) {}
}

/// Default hook: optionally dump the packet, then let default handling run.
pub struct DumpUnknown {
    enabled: bool,
    logger: Logger,
}

impl DumpUnknown {
    pub fn new(enabled: bool, logger: Logger) -> Self {
        DumpUnknown { enabled, logger }
    }
}

impl UnknownSubscriberHook for DumpUnknown {
    fn on_unknown(&mut self, ipv4_packet: &[u8]) -> bool {
        if self.enabled {
            info!(
                self.logger,
                "Plain IPv4 traffic to/from unknown UE: {}",
                hex_dump(ipv4_packet)
            );
        }
        true
    }

    fn enable_dump(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}

fn hex_dump(data: &[u8]) -> String {
    const SHOWN: usize = 64;
    let mut out = String::with_capacity(3 * SHOWN);
    for (i, byte) in data.iter().take(SHOWN).enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&format!("{byte:02x}"));
    }
    if data.len() > SHOWN {
        out.push_str(" ..");
    }
    out
}

/// Result of pushing one plain IPv4 packet through the bridge.
#[derive(Debug)]
pub enum BridgeOutput {
    /// The packet now travels inside the subscriber's tunnel; emit on `egress`.
    Encapsulated { packet: Vec<u8>, egress: usize },
    /// Unknown subscriber; the caller applies its default handling.
    Unknown,
    /// The unknown-subscriber hook fully handled the packet.
    Consumed,
}

/// Turns plain IPv4 packets back into tunnel traffic.
///
/// Exactly one output is recorded per consumed packet and fetched once via
/// [`EncapsulationBridge::take_last_output`].
pub struct EncapsulationBridge {
    udp_checksum: bool,
    identification: u16,
    hook: Box<dyn UnknownSubscriberHook>,
    last_output: Option<BridgeOutput>,
}

impl EncapsulationBridge {
    pub fn new(udp_checksum: bool, hook: Box<dyn UnknownSubscriberHook>) -> Self {
        EncapsulationBridge {
            udp_checksum,
            identification: 0,
            hook,
            last_output: None,
        }
    }

    pub fn set_udp_checksum(&mut self, enabled: bool) {
        self.udp_checksum = enabled;
    }

    pub fn set_unknown_dump(&mut self, enabled: bool) {
        self.hook.enable_dump(enabled);
    }

    /// Decide what becomes of one plain IPv4 packet.  `packet_bytes` is the
    /// exact IPv4 datagram described by `view`.
    pub fn consume_ipv4(&mut self, view: &Ipv4View, packet_bytes: &[u8], tunnels: &TunnelTable) {
        let output = if let Some(pair) = tunnels.lookup(view.dst) {
            // Traffic towards the subscriber goes down the radio-side tunnel.
            BridgeOutput::Encapsulated {
                packet: self.encapsulate(packet_bytes, pair.core.ip, pair.radio.ip, pair.radio.teid),
                egress: ports::RADIO,
            }
        } else if let Some(pair) = tunnels.lookup(view.src) {
            // Traffic from the subscriber continues up the core-side tunnel.
            BridgeOutput::Encapsulated {
                packet: self.encapsulate(packet_bytes, pair.radio.ip, pair.core.ip, pair.core.teid),
                egress: ports::CORE,
            }
        } else if self.hook.on_unknown(packet_bytes) {
            BridgeOutput::Unknown
        } else {
            BridgeOutput::Consumed
        };
        self.last_output = Some(output);
    }

    /// The output recorded by the last `consume_ipv4`; a second take
    /// returns None.
    pub fn take_last_output(&mut self) -> Option<BridgeOutput> {
        self.last_output.take()
    }

    fn encapsulate(
        &mut self,
        inner: &[u8],
        src: Ipv4Addr,
        dst: Ipv4Addr,
        teid: GtpTeid,
    ) -> Vec<u8> {
        let identification = self.identification;
        self.identification = self.identification.wrapping_add(1);
        gtpv1u::encapsulate_ipv4(inner, src, dst, teid, identification, self.udp_checksum)
    }
}
