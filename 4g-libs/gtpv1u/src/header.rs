use super::{GTP_HEADER_LEN, GTP_MESSAGE_TYPE_GPDU, GtpTeid};

/// Write the 8-byte GTP-U header of a G-PDU carrying `payload_len` bytes.
///
/// `buf` must hold at least [`GTP_HEADER_LEN`] bytes.
pub fn write_gpdu_header(buf: &mut [u8], teid: GtpTeid, payload_len: u16) {
    let length = payload_len.to_be_bytes();

    // ---- GTP header, TS29.281, 5.2.1 ----
    buf[0] = 0b001_1_0_0_0_0; // version=1, PT=1, R, E=0, S=0, PN=0
    buf[1] = GTP_MESSAGE_TYPE_GPDU;
    buf[2] = length[0];
    buf[3] = length[1];
    buf[4..GTP_HEADER_LEN].copy_from_slice(&teid.0);
}

/// Parse the header of a GTP-U G-PDU, returning the TEID and the offset of
/// the payload.
///
/// Only the plain 8-byte header is accepted.  The E/S/PN flags all imply
/// additional header bytes that would shift the payload, so a packet
/// carrying any of them is rejected rather than misread.
pub fn parse_gpdu_header(buf: &[u8]) -> Option<(GtpTeid, usize)> {
    if buf.len() < GTP_HEADER_LEN {
        return None;
    }
    if buf[0] != 0b001_1_0_0_0_0 || buf[1] != GTP_MESSAGE_TYPE_GPDU {
        return None;
    }
    let teid = GtpTeid([buf[4], buf[5], buf[6], buf[7]]);
    Some((teid, GTP_HEADER_LEN))
}
