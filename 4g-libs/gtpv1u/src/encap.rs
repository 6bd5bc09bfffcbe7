use super::{GTP_HEADER_LEN, GTPU_PORT, GtpTeid, IPV4_HEADER_LEN, UDP_HEADER_LEN};
use crate::header::write_gpdu_header;
use std::net::Ipv4Addr;

const UDP_PROTOCOL: u8 = 17;

fn sum_be_words(data: &[u8]) -> u32 {
    let mut sum = 0u32;
    let mut chunks = data.chunks_exact(2);
    for chunk in &mut chunks {
        sum += u32::from(u16::from_be_bytes([chunk[0], chunk[1]]));
    }
    if let [last] = chunks.remainder() {
        sum += u32::from(u16::from_be_bytes([*last, 0]));
    }
    sum
}

fn fold(mut sum: u32) -> u16 {
    while sum > 0xffff {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    sum as u16
}

/// One's-complement Internet checksum over `data` (RFC 1071).
pub fn internet_checksum(data: &[u8]) -> u16 {
    !fold(sum_be_words(data))
}

/// UDP checksum over `udp` (header plus payload, checksum field zeroed) with
/// the IPv4 pseudo-header for `src`/`dst`.  A computed zero is transmitted
/// as 0xffff (RFC 768).
pub fn udp_checksum_ipv4(udp: &[u8], src: Ipv4Addr, dst: Ipv4Addr) -> u16 {
    let sum = sum_be_words(&src.octets())
        + sum_be_words(&dst.octets())
        + u32::from(UDP_PROTOCOL)
        + udp.len() as u32
        + sum_be_words(udp);
    match !fold(sum) {
        0 => 0xffff,
        checksum => checksum,
    }
}

/// Wrap a complete IPv4 packet in outer IPv4 + UDP + GTP-U headers.
///
/// The caller supplies the outer Identification value; the outer IPv4 header
/// checksum is always computed, the UDP checksum only when `udp_checksum` is
/// set (zero is a valid "no checksum" marker for UDP over IPv4).
pub fn encapsulate_ipv4(
    inner: &[u8],
    src: Ipv4Addr,
    dst: Ipv4Addr,
    teid: GtpTeid,
    identification: u16,
    udp_checksum: bool,
) -> Vec<u8> {
    const HEADERS_LEN: usize = IPV4_HEADER_LEN + UDP_HEADER_LEN + GTP_HEADER_LEN;
    let udp_len = (UDP_HEADER_LEN + GTP_HEADER_LEN + inner.len()) as u16;
    let total_len = (HEADERS_LEN + inner.len()) as u16;

    let mut buf = vec![0u8; HEADERS_LEN];

    // ---- outer IPv4 header ----
    buf[0] = 0b0100_0101; // version=4, IHL=5
    buf[1] = 0; // DSCP/ECN
    buf[2..4].copy_from_slice(&total_len.to_be_bytes());
    buf[4..6].copy_from_slice(&identification.to_be_bytes());
    buf[6] = 0b010_00000; // flags: DF, fragment offset 0
    buf[7] = 0;
    buf[8] = 64; // TTL
    buf[9] = UDP_PROTOCOL;
    buf[12..16].copy_from_slice(&src.octets());
    buf[16..20].copy_from_slice(&dst.octets());
    let header_checksum = internet_checksum(&buf[0..IPV4_HEADER_LEN]);
    buf[10..12].copy_from_slice(&header_checksum.to_be_bytes());

    // ---- outer UDP header ----
    buf[20..22].copy_from_slice(&GTPU_PORT.to_be_bytes());
    buf[22..24].copy_from_slice(&GTPU_PORT.to_be_bytes());
    buf[24..26].copy_from_slice(&udp_len.to_be_bytes());

    write_gpdu_header(&mut buf[28..HEADERS_LEN], teid, inner.len() as u16);

    buf.extend_from_slice(inner);

    if udp_checksum {
        let checksum = udp_checksum_ipv4(&buf[IPV4_HEADER_LEN..], src, dst);
        buf[26..28].copy_from_slice(&checksum.to_be_bytes());
    }

    buf
}
