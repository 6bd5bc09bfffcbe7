use super::{DecodedPacket, GtpuView, Ipv4View};
use gtpv1u::{GTPU_PORT, IPV4_HEADER_LEN, UDP_HEADER_LEN};
use std::net::Ipv4Addr;
use thiserror::Error;

const PROTOCOL_TCP: u8 = 6;
const PROTOCOL_UDP: u8 = 17;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("packet too short for an IPv4 header ({0} bytes)")]
    TooShort(usize),
    #[error("IPv4 header length or total length inconsistent with the buffer")]
    BadLength,
    #[error("GTP-U packet with unhandled header flags or message type")]
    UnhandledGtpHeader,
    #[error("GTP-U payload is not an IPv4 packet")]
    InnerNotIpv4,
}

/// Build the decoded view of one inbound packet.
///
/// A non-IPv4 first nibble is not an error: the classifier owns that drop
/// decision.  Anything that claims to be IPv4 or GTP-U but is malformed is
/// an error, and the host is expected to drop the packet and move on.
pub fn decode_ipv4(buffer: &[u8]) -> Result<DecodedPacket, DecodeError> {
    let Some(first) = buffer.first() else {
        return Err(DecodeError::TooShort(0));
    };
    if first >> 4 != 4 {
        return Ok(DecodedPacket::NonIpv4);
    }

    let outer = ipv4_view(buffer, 0)?;
    let gtpu = match (outer.protocol, outer.dst_port) {
        (PROTOCOL_UDP, Some(GTPU_PORT)) => Some(gtpu_view(buffer, &outer)?),
        _ => None,
    };

    Ok(DecodedPacket::Ipv4 {
        outer,
        gtpu,
        signaling: Vec::new(),
    })
}

/// View of the IPv4 header at `offset`.  The caller has already checked the
/// version nibble.
fn ipv4_view(buffer: &[u8], offset: usize) -> Result<Ipv4View, DecodeError> {
    let b = &buffer[offset..];
    if b.len() < IPV4_HEADER_LEN {
        return Err(DecodeError::TooShort(b.len()));
    }
    let header_len = ((b[0] & 0x0f) as usize) * 4;
    if header_len < IPV4_HEADER_LEN || b.len() < header_len {
        return Err(DecodeError::BadLength);
    }
    let total_len = u16::from_be_bytes([b[2], b[3]]) as usize;
    if total_len < header_len || total_len > b.len() {
        return Err(DecodeError::BadLength);
    }
    let protocol = b[9];
    let src = Ipv4Addr::new(b[12], b[13], b[14], b[15]);
    let dst = Ipv4Addr::new(b[16], b[17], b[18], b[19]);

    // Transport ports, readable only on the first fragment.
    let fragment_offset = u16::from_be_bytes([b[6], b[7]]) & 0x1fff;
    let has_ports = fragment_offset == 0
        && (protocol == PROTOCOL_TCP || protocol == PROTOCOL_UDP)
        && total_len >= header_len + 4;
    let (src_port, dst_port) = if has_ports {
        (
            Some(u16::from_be_bytes([b[header_len], b[header_len + 1]])),
            Some(u16::from_be_bytes([b[header_len + 2], b[header_len + 3]])),
        )
    } else {
        (None, None)
    };

    Ok(Ipv4View {
        src,
        dst,
        protocol,
        offset,
        header_len,
        total_len,
        src_port,
        dst_port,
    })
}

fn gtpu_view(buffer: &[u8], outer: &Ipv4View) -> Result<GtpuView, DecodeError> {
    let gtp_offset = outer.offset + outer.header_len + UDP_HEADER_LEN;
    let end = outer.offset + outer.total_len;
    let gtp = buffer
        .get(gtp_offset..end)
        .ok_or(DecodeError::BadLength)?;
    let Some((teid, payload_offset)) = gtpv1u::parse_gpdu_header(gtp) else {
        return Err(DecodeError::UnhandledGtpHeader);
    };

    let inner_offset = gtp_offset + payload_offset;
    let bounded = &buffer[..end];
    match bounded.get(inner_offset) {
        Some(first) if first >> 4 == 4 => {}
        _ => return Err(DecodeError::InnerNotIpv4),
    }
    let inner = ipv4_view(bounded, inner_offset)?;

    Ok(GtpuView { teid, inner })
}
