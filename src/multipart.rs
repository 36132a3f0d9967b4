//! Builders for MULTIPART_REPLY messages.
//!
//! Each builder appends one complete reply (common header, multipart header,
//! body) to the caller's buffer and returns the total bytes written so the
//! dispatcher can advance its scratch cursor. Several replies may be
//! concatenated into one outbound flush.

use byteorder::{BigEndian, WriteBytesExt};

use crate::engine::{PortStats, MAX_PORTS};
use crate::error::ProtocolError;
use crate::flow_table::MAX_FLOWS;
use crate::ofp_header::{OfpHeader, OFP_VERSION};
use crate::openflow0x04::{
    MsgCode, OFPMP_DESC, OFPMP_PORT_DESC, OFPMP_PORT_STATS, OFPMP_TABLE_FEATURES, OFPPF_100MB_FD,
    OFPPF_COPPER, OFPPS_LINK_DOWN, OFPPS_LIVE, OFPP_ANY,
};

pub const MFR_DESC: &str = "rust_of13 project";
pub const HW_DESC: &str = "Soft Switch Rev.A";
pub const SW_DESC: &str = env!("CARGO_PKG_VERSION");
pub const SERIAL_NUM: &str = "none";
pub const DP_DESC: &str = "Three-port OpenFlow 1.3 soft switch";

/// Common header plus the multipart type/flags/pad fields.
pub const MP_HEADER_SIZE: usize = 16;
pub const DESC_BODY_SIZE: usize = 1056;
pub const PORT_DESC_SIZE: usize = 64;
pub const TABLE_FEATURES_BODY_SIZE: usize = 64;
pub const PORT_STATS_SIZE: usize = 112;

fn reply_header(bytes: &mut Vec<u8>, xid: u32, mp_type: u16, len: usize) {
    OfpHeader::marshal(
        bytes,
        OfpHeader::new(OFP_VERSION, MsgCode::MultipartResp as u8, len as u16, xid),
    );
    bytes.write_u16::<BigEndian>(mp_type).unwrap();
    bytes.write_u16::<BigEndian>(0).unwrap(); // flags
    bytes.write_u32::<BigEndian>(0).unwrap();
}

/// Write `s` into a fixed-width field, truncated or zero-padded to `width`.
fn write_padded(bytes: &mut Vec<u8>, s: &str, width: usize) {
    let raw = s.as_bytes();
    let n = raw.len().min(width);
    bytes.extend_from_slice(&raw[..n]);
    bytes.resize(bytes.len() + width - n, 0);
}

/// DESC reply: the build-time-constant switch description.
pub fn desc_reply(bytes: &mut Vec<u8>, xid: u32) -> usize {
    let len = MP_HEADER_SIZE + DESC_BODY_SIZE;
    reply_header(bytes, xid, OFPMP_DESC, len);
    write_padded(bytes, MFR_DESC, 256);
    write_padded(bytes, HW_DESC, 256);
    write_padded(bytes, SW_DESC, 256);
    write_padded(bytes, SERIAL_NUM, 32);
    write_padded(bytes, DP_DESC, 256);
    len
}

/// PORT_DESC reply: one fixed-size descriptor per enabled physical port.
///
/// Hardware addresses come from the caller's cache, derived once at engine
/// init; they must stay identical across requests.
pub fn port_desc_reply(
    bytes: &mut Vec<u8>,
    xid: u32,
    enabled: &[bool; MAX_PORTS],
    macs: &[[u8; 6]; MAX_PORTS],
    link_up: &[bool; MAX_PORTS],
) -> usize {
    let numports = enabled.iter().filter(|e| **e).count();
    let len = MP_HEADER_SIZE + numports * PORT_DESC_SIZE;
    reply_header(bytes, xid, OFPMP_PORT_DESC, len);
    for l in 0..MAX_PORTS {
        if !enabled[l] {
            continue;
        }
        bytes.write_u32::<BigEndian>(l as u32 + 1).unwrap(); // 1-based port_no
        bytes.write_u32::<BigEndian>(0).unwrap();
        bytes.extend_from_slice(&macs[l]);
        bytes.write_u16::<BigEndian>(0).unwrap();
        write_padded(bytes, &format!("eth{}", l), 16);
        bytes.write_u32::<BigEndian>(0).unwrap(); // config
        bytes
            .write_u32::<BigEndian>(if link_up[l] { OFPPS_LIVE } else { OFPPS_LINK_DOWN })
            .unwrap();
        bytes
            .write_u32::<BigEndian>(OFPPF_100MB_FD | OFPPF_COPPER)
            .unwrap(); // curr
        bytes.write_u32::<BigEndian>(0).unwrap(); // advertised
        bytes.write_u32::<BigEndian>(0).unwrap(); // supported
        bytes.write_u32::<BigEndian>(0).unwrap(); // peer
        bytes.write_u32::<BigEndian>(0).unwrap(); // curr_speed
        bytes.write_u32::<BigEndian>(0).unwrap(); // max_speed
    }
    len
}

/// TABLE_FEATURES reply: the single flow table this switch carries.
pub fn table_features_reply(bytes: &mut Vec<u8>, xid: u32) -> usize {
    let len = MP_HEADER_SIZE + TABLE_FEATURES_BODY_SIZE;
    reply_header(bytes, xid, OFPMP_TABLE_FEATURES, len);
    bytes
        .write_u16::<BigEndian>(TABLE_FEATURES_BODY_SIZE as u16)
        .unwrap();
    bytes.write_u8(0).unwrap(); // table_id
    bytes.extend_from_slice(&[0; 5]);
    write_padded(bytes, "table_0", 32);
    bytes.write_u64::<BigEndian>(0).unwrap(); // metadata_match
    bytes.write_u64::<BigEndian>(0).unwrap(); // metadata_write
    bytes.write_u32::<BigEndian>(0).unwrap(); // config
    bytes.write_u32::<BigEndian>(MAX_FLOWS as u32).unwrap();
    len
}

/// PORT_STATS reply: all data ports for a request of OFPP_ANY, otherwise
/// exactly the named port. An out-of-range port is rejected before anything
/// is written. The port range is bounded by the stats array as well as
/// `data_ports`, so an inconsistent port count cannot index past it.
pub fn port_stats_reply(
    bytes: &mut Vec<u8>,
    xid: u32,
    port_no: u32,
    stats: &[PortStats; MAX_PORTS],
    data_ports: u32,
) -> Result<usize, ProtocolError> {
    let limit = (data_ports as usize).min(stats.len());
    if port_no == OFPP_ANY {
        let len = MP_HEADER_SIZE + limit * PORT_STATS_SIZE;
        reply_header(bytes, xid, OFPMP_PORT_STATS, len);
        for k in 0..limit {
            port_stats_record(bytes, k as u32 + 1, &stats[k]);
        }
        Ok(len)
    } else if port_no >= 1 && port_no as usize <= limit {
        let len = MP_HEADER_SIZE + PORT_STATS_SIZE;
        reply_header(bytes, xid, OFPMP_PORT_STATS, len);
        port_stats_record(bytes, port_no, &stats[port_no as usize - 1]);
        Ok(len)
    } else {
        Err(ProtocolError::BadPort(port_no))
    }
}

fn port_stats_record(bytes: &mut Vec<u8>, port_no: u32, s: &PortStats) {
    bytes.write_u32::<BigEndian>(port_no).unwrap();
    bytes.write_u32::<BigEndian>(0).unwrap();
    bytes.write_u64::<BigEndian>(s.rx_packets).unwrap();
    bytes.write_u64::<BigEndian>(s.tx_packets).unwrap();
    bytes.write_u64::<BigEndian>(s.rx_bytes).unwrap();
    bytes.write_u64::<BigEndian>(s.tx_bytes).unwrap();
    bytes.write_u64::<BigEndian>(s.rx_dropped).unwrap();
    bytes.write_u64::<BigEndian>(s.tx_dropped).unwrap();
    bytes.write_u64::<BigEndian>(0).unwrap(); // rx_errors, not tracked
    bytes.write_u64::<BigEndian>(0).unwrap(); // tx_errors
    bytes.write_u64::<BigEndian>(0).unwrap(); // rx_frame_err
    bytes.write_u64::<BigEndian>(0).unwrap(); // rx_over_err
    bytes.write_u64::<BigEndian>(s.rx_crc_err).unwrap();
    bytes.write_u64::<BigEndian>(0).unwrap(); // collisions
    bytes.write_u32::<BigEndian>(0).unwrap(); // duration_sec
    bytes.write_u32::<BigEndian>(0).unwrap(); // duration_nsec
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ofp_header::OfpHeader;

    fn parse_mp_header(bytes: &[u8], want_type: u16, want_xid: u32) -> usize {
        let hdr = OfpHeader::parse(bytes).unwrap();
        assert_eq!(hdr.version(), OFP_VERSION);
        assert_eq!(hdr.type_code().unwrap(), MsgCode::MultipartResp);
        assert_eq!(hdr.xid(), want_xid);
        let typ = u16::from_be_bytes([bytes[8], bytes[9]]);
        assert_eq!(typ, want_type);
        let flags = u16::from_be_bytes([bytes[10], bytes[11]]);
        assert_eq!(flags, 0);
        hdr.length()
    }

    #[test]
    fn desc_reply_fixed_strings_and_padding() {
        let mut bytes = vec![];
        let len = desc_reply(&mut bytes, 0x42);
        assert_eq!(len, bytes.len());
        assert_eq!(parse_mp_header(&bytes, OFPMP_DESC, 0x42), len);
        let body = &bytes[MP_HEADER_SIZE..];
        assert_eq!(body.len(), DESC_BODY_SIZE);
        assert_eq!(&body[..MFR_DESC.len()], MFR_DESC.as_bytes());
        assert!(body[MFR_DESC.len()..256].iter().all(|b| *b == 0));
        assert_eq!(&body[256..256 + HW_DESC.len()], HW_DESC.as_bytes());
        assert_eq!(&body[512..512 + SW_DESC.len()], SW_DESC.as_bytes());
        assert_eq!(&body[768..768 + SERIAL_NUM.len()], SERIAL_NUM.as_bytes());
        assert_eq!(&body[800..800 + DP_DESC.len()], DP_DESC.as_bytes());
        assert!(body[800 + DP_DESC.len()..].iter().all(|b| *b == 0));
    }

    #[test]
    fn port_desc_skips_disabled_ports_and_reports_link_state() {
        let enabled = [true, true, true, false];
        let macs = [[0, 0, 0, 0, 0, 1], [0, 0, 0, 0, 0, 2], [0, 0, 0, 0, 0, 3], [0; 6]];
        let link_up = [true, false, true, false];
        let mut bytes = vec![];
        let len = port_desc_reply(&mut bytes, 7, &enabled, &macs, &link_up);
        assert_eq!(len, MP_HEADER_SIZE + 3 * PORT_DESC_SIZE);
        assert_eq!(parse_mp_header(&bytes, OFPMP_PORT_DESC, 7), len);

        let port = |n: usize| &bytes[MP_HEADER_SIZE + n * PORT_DESC_SIZE..][..PORT_DESC_SIZE];
        // 1-based port numbers
        assert_eq!(&port(0)[..4], &1u32.to_be_bytes());
        assert_eq!(&port(2)[..4], &3u32.to_be_bytes());
        // stable hardware addresses from the cache
        assert_eq!(&port(1)[8..14], &macs[1]);
        // zero-padded names
        assert_eq!(&port(0)[16..20], b"eth0");
        assert!(port(0)[20..32].iter().all(|b| *b == 0));
        // link state
        let state = |n: usize| u32::from_be_bytes(port(n)[36..40].try_into().unwrap());
        assert_eq!(state(0), OFPPS_LIVE);
        assert_eq!(state(1), OFPPS_LINK_DOWN);
    }

    #[test]
    fn port_desc_is_stable_across_requests() {
        let enabled = [true; 4];
        let macs = [[9, 8, 7, 6, 5, 4]; 4];
        let link_up = [true; 4];
        let mut a = vec![];
        let mut b = vec![];
        port_desc_reply(&mut a, 1, &enabled, &macs, &link_up);
        port_desc_reply(&mut b, 1, &enabled, &macs, &link_up);
        assert_eq!(a, b);
    }

    #[test]
    fn table_features_single_table() {
        let mut bytes = vec![];
        let len = table_features_reply(&mut bytes, 3);
        assert_eq!(len, MP_HEADER_SIZE + TABLE_FEATURES_BODY_SIZE);
        assert_eq!(parse_mp_header(&bytes, OFPMP_TABLE_FEATURES, 3), len);
        let body = &bytes[MP_HEADER_SIZE..];
        assert_eq!(body[2], 0); // table_id
        assert_eq!(&body[8..15], b"table_0");
        let max_entries = u32::from_be_bytes(body[60..64].try_into().unwrap());
        assert_eq!(max_entries, MAX_FLOWS as u32);
    }

    #[test]
    fn port_stats_all_ports() {
        let mut stats = [PortStats::default(); MAX_PORTS];
        stats[0].rx_packets = 10;
        stats[2].tx_bytes = 0x1_0000_0001;
        let mut bytes = vec![];
        let len = port_stats_reply(&mut bytes, 5, OFPP_ANY, &stats, 3).unwrap();
        assert_eq!(len, MP_HEADER_SIZE + 3 * PORT_STATS_SIZE);
        let rec = |n: usize| &bytes[MP_HEADER_SIZE + n * PORT_STATS_SIZE..][..PORT_STATS_SIZE];
        assert_eq!(&rec(0)[..4], &1u32.to_be_bytes());
        // 64-bit counters travel big-endian
        assert_eq!(&rec(0)[8..16], &10u64.to_be_bytes());
        assert_eq!(&rec(2)[32..40], &0x1_0000_0001u64.to_be_bytes());
    }

    #[test]
    fn port_stats_single_port() {
        let mut stats = [PortStats::default(); MAX_PORTS];
        stats[1].rx_crc_err = 3;
        let mut bytes = vec![];
        let len = port_stats_reply(&mut bytes, 5, 2, &stats, 3).unwrap();
        assert_eq!(len, MP_HEADER_SIZE + PORT_STATS_SIZE);
        let rec = &bytes[MP_HEADER_SIZE..];
        assert_eq!(&rec[..4], &2u32.to_be_bytes());
        assert_eq!(&rec[88..96], &3u64.to_be_bytes());
    }

    #[test]
    fn port_stats_range_is_bounded_by_the_stats_array() {
        let stats = [PortStats::default(); MAX_PORTS];
        let mut bytes = vec![];
        // a port count beyond the array yields records for the array only
        let len = port_stats_reply(&mut bytes, 5, OFPP_ANY, &stats, 9).unwrap();
        assert_eq!(len, MP_HEADER_SIZE + MAX_PORTS * PORT_STATS_SIZE);
        assert_eq!(
            port_stats_reply(&mut vec![], 5, 6, &stats, 9),
            Err(ProtocolError::BadPort(6))
        );
    }

    #[test]
    fn port_stats_out_of_range_writes_nothing() {
        let stats = [PortStats::default(); MAX_PORTS];
        let mut bytes = vec![];
        assert_eq!(
            port_stats_reply(&mut bytes, 5, 9, &stats, 3),
            Err(ProtocolError::BadPort(9))
        );
        assert!(bytes.is_empty());
    }
}
