mod decode;

pub use decode::{DecodeError, decode_ipv4};

use crate::data::TunnelPair;
use gtpv1u::GtpTeid;
use std::net::Ipv4Addr;

/// Fixed port convention of the router: which physical port carries what.
pub mod ports {
    /// Traffic from/to the EPC.
    pub const CORE: usize = 0;
    /// Traffic from/to the eNodeBs.
    pub const RADIO: usize = 1;
    /// Decapsulated subscriber traffic, to/from the local VNFs.
    pub const VNF: usize = 2;
    /// Optional sink for traffic the router was never supposed to see.
    pub const SINK: usize = 3;
}

/// True for the two ports that carry tunnel and signaling traffic.
pub fn is_tunnel_port(port: usize) -> bool {
    port == ports::CORE || port == ports::RADIO
}

/// The other tunnel-facing port.  Only meaningful for CORE and RADIO.
pub fn opposite_tunnel_port(port: usize) -> usize {
    1 - port
}

/// Decoded view of one IPv4 header and its transport ports.  Offsets are
/// relative to the start of the packet buffer, so a view stays valid while
/// the buffer moves around.
#[derive(Debug, Clone)]
pub struct Ipv4View {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub protocol: u8,
    /// Offset of this IPv4 header within the packet buffer.
    pub offset: usize,
    pub header_len: usize,
    pub total_len: usize,
    /// Transport ports, present for unfragmented TCP/UDP.
    pub src_port: Option<u16>,
    pub dst_port: Option<u16>,
}

/// Decoded view of a GTP-U G-PDU and the IPv4 packet it encapsulates.
#[derive(Debug, Clone)]
pub struct GtpuView {
    pub teid: GtpTeid,
    pub inner: Ipv4View,
}

/// A subscriber binding discovered by the external signaling decoder.
#[derive(Debug, Clone)]
pub struct BindingObservation {
    pub subscriber: Ipv4Addr,
    pub tunnels: TunnelPair,
}

/// What the decoded-packet provider knows about one inbound packet.
#[derive(Debug, Clone)]
pub enum DecodedPacket {
    Ipv4 {
        outer: Ipv4View,
        gtpu: Option<GtpuView>,
        /// Bindings extracted from this packet by the signaling decoder.
        signaling: Vec<BindingObservation>,
    },
    NonIpv4,
}

/// One in-flight packet: ingress port, the owned buffer, and the decoded
/// view of it.  Classification consumes the context, so the buffer is
/// released (or handed back in an outcome) exactly once.
#[derive(Debug)]
pub struct PacketContext {
    pub ingress: usize,
    pub buffer: Vec<u8>,
    pub decoded: DecodedPacket,
}

impl PacketContext {
    /// Decode `buffer` with the built-in provider and wrap it up.
    pub fn from_ipv4_buffer(buffer: Vec<u8>, ingress: usize) -> Result<Self, DecodeError> {
        let decoded = decode_ipv4(&buffer)?;
        Ok(PacketContext {
            ingress,
            buffer,
            decoded,
        })
    }
}
