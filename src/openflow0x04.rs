use std::io::{BufRead, Cursor};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::bits::{bit, test_bit};
use crate::error::ProtocolError;

/// OpenFlow 1.3 message type codes, used by headers to identify meaning of the rest of a message.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MsgCode {
    Hello = 0,
    Error = 1,
    EchoReq = 2,
    EchoResp = 3,
    Experimenter = 4,
    FeaturesReq = 5,
    FeaturesResp = 6,
    GetConfigReq = 7,
    GetConfigResp = 8,
    SetConfig = 9,
    PacketIn = 10,
    FlowRemoved = 11,
    PortStatus = 12,
    PacketOut = 13,
    FlowMod = 14,
    GroupMod = 15,
    PortMod = 16,
    TableMod = 17,
    MultipartReq = 18,
    MultipartResp = 19,
    BarrierReq = 20,
    BarrierResp = 21,
}

impl MsgCode {
    pub fn from_u8(d: u8) -> Result<MsgCode, ProtocolError> {
        match d {
            0 => Ok(MsgCode::Hello),
            1 => Ok(MsgCode::Error),
            2 => Ok(MsgCode::EchoReq),
            3 => Ok(MsgCode::EchoResp),
            4 => Ok(MsgCode::Experimenter),
            5 => Ok(MsgCode::FeaturesReq),
            6 => Ok(MsgCode::FeaturesResp),
            7 => Ok(MsgCode::GetConfigReq),
            8 => Ok(MsgCode::GetConfigResp),
            9 => Ok(MsgCode::SetConfig),
            10 => Ok(MsgCode::PacketIn),
            11 => Ok(MsgCode::FlowRemoved),
            12 => Ok(MsgCode::PortStatus),
            13 => Ok(MsgCode::PacketOut),
            14 => Ok(MsgCode::FlowMod),
            15 => Ok(MsgCode::GroupMod),
            16 => Ok(MsgCode::PortMod),
            17 => Ok(MsgCode::TableMod),
            18 => Ok(MsgCode::MultipartReq),
            19 => Ok(MsgCode::MultipartResp),
            20 => Ok(MsgCode::BarrierReq),
            21 => Ok(MsgCode::BarrierResp),
            d => Err(ProtocolError::UnknownType(d)),
        }
    }
}

// Reserved v1.3 port numbers. Ports are 32-bit on the wire; values above
// OFPP_MAX are symbolic.
pub const OFPP_MAX: u32 = 0xffffff00;
pub const OFPP_IN_PORT: u32 = 0xfffffff8;
pub const OFPP_TABLE: u32 = 0xfffffff9;
pub const OFPP_NORMAL: u32 = 0xfffffffa;
pub const OFPP_FLOOD: u32 = 0xfffffffb;
pub const OFPP_ALL: u32 = 0xfffffffc;
pub const OFPP_CONTROLLER: u32 = 0xfffffffd;
pub const OFPP_LOCAL: u32 = 0xfffffffe;
pub const OFPP_ANY: u32 = 0xffffffff;

// Multipart request/reply sub-types.
pub const OFPMP_DESC: u16 = 0;
pub const OFPMP_PORT_STATS: u16 = 4;
pub const OFPMP_TABLE_FEATURES: u16 = 12;
pub const OFPMP_PORT_DESC: u16 = 13;

// Error types and the codes this engine raises.
pub const OFPET_BAD_REQUEST: u16 = 1;
pub const OFPET_FLOW_MOD_FAILED: u16 = 5;
pub const OFPBRC_BAD_MULTIPART: u16 = 2;
pub const OFPBRC_BAD_LEN: u16 = 6;
pub const OFPBRC_BAD_PORT: u16 = 11;
pub const OFPFMFC_TABLE_FULL: u16 = 1;
pub const OFPFMFC_BAD_COMMAND: u16 = 6;

// Port state and feature bits used in port descriptions.
pub const OFPPS_LINK_DOWN: u32 = 1;
pub const OFPPS_LIVE: u32 = 1 << 2;
pub const OFPPF_100MB_FD: u32 = 1 << 3;
pub const OFPPF_COPPER: u32 = 1 << 7;

/// Flow-mod flag requesting a FLOW_REMOVED notification on deletion.
pub const OFPFF_SEND_FLOW_REM: u16 = 1;

/// Payload bytes copied into a PACKET_IN; the rest of the frame is cut off.
pub const PACKET_IN_MAX_BYTES: usize = 128;

/// Bytes of the offending message echoed back inside an ERROR reply.
pub const ERROR_ECHO_MAX: usize = 64;

/// Common API for message types keyed by OpenFlow message codes (see `MsgCode` enum).
///
/// `parse` and `marshal` operate on the message body, the bytes following the
/// common 8-byte header. Bodies are length-checked up front; decoding never
/// reads past the checked extent.
pub trait MessageType: Sized {
    /// Return the byte-size of a message body.
    fn size_of(msg: &Self) -> usize;
    /// Parse a buffer into a message.
    fn parse(buf: &[u8]) -> Result<Self, ProtocolError>;
    /// Marshal a message into a `u8` buffer.
    fn marshal(msg: Self, bytes: &mut Vec<u8>);
}

fn ensure(buf: &[u8], need: usize) -> Result<(), ProtocolError> {
    if buf.len() < need {
        Err(ProtocolError::Truncated {
            need,
            have: buf.len(),
        })
    } else {
        Ok(())
    }
}

/// Fields to match against flows.
///
/// A fixed-format exact match: each field either carries a value or is
/// wildcarded. OXM parsing is out of scope; this is the only match shape the
/// table compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlowMatch {
    pub wildcards: u32,
    pub in_port: u32,
    pub eth_src: [u8; 6],
    pub eth_dst: [u8; 6],
    pub eth_type: u16,
}

impl FlowMatch {
    /// Byte-size of the fixed match block on the wire.
    pub const SIZE: usize = 24;

    pub const WC_IN_PORT: u32 = 1;
    pub const WC_ETH_SRC: u32 = 1 << 1;
    pub const WC_ETH_DST: u32 = 1 << 2;
    pub const WC_ETH_TYPE: u32 = 1 << 3;
    pub const WC_ALL: u32 = 0xf;

    /// The maximally-general pattern: every field wildcarded.
    pub fn match_all() -> FlowMatch {
        FlowMatch {
            wildcards: Self::WC_ALL,
            ..Default::default()
        }
    }

    pub fn parse(buf: &[u8]) -> Result<FlowMatch, ProtocolError> {
        ensure(buf, Self::SIZE)?;
        let mut bytes = Cursor::new(buf);
        let wildcards = bytes.read_u32::<BigEndian>().unwrap();
        let in_port = bytes.read_u32::<BigEndian>().unwrap();
        let mut eth_src = [0; 6];
        let mut eth_dst = [0; 6];
        for b in eth_src.iter_mut() {
            *b = bytes.read_u8().unwrap();
        }
        for b in eth_dst.iter_mut() {
            *b = bytes.read_u8().unwrap();
        }
        let eth_type = bytes.read_u16::<BigEndian>().unwrap();
        Ok(FlowMatch {
            wildcards,
            in_port,
            eth_src,
            eth_dst,
            eth_type,
        })
    }

    pub fn marshal(m: FlowMatch, bytes: &mut Vec<u8>) {
        bytes.write_u32::<BigEndian>(m.wildcards).unwrap();
        bytes.write_u32::<BigEndian>(m.in_port).unwrap();
        bytes.extend_from_slice(&m.eth_src);
        bytes.extend_from_slice(&m.eth_dst);
        bytes.write_u16::<BigEndian>(m.eth_type).unwrap();
        bytes.write_u16::<BigEndian>(0).unwrap();
    }
}

/// Exact-field equality between a pattern and an installed match, skipping
/// fields the pattern wildcards. The match-all pattern matches everything.
pub fn field_match(pattern: &FlowMatch, entry: &FlowMatch) -> bool {
    let wc = |f: u32| test_bit(f.trailing_zeros() as u64, pattern.wildcards as u64);
    (wc(FlowMatch::WC_IN_PORT) || pattern.in_port == entry.in_port)
        && (wc(FlowMatch::WC_ETH_SRC) || pattern.eth_src == entry.eth_src)
        && (wc(FlowMatch::WC_ETH_DST) || pattern.eth_dst == entry.eth_dst)
        && (wc(FlowMatch::WC_ETH_TYPE) || pattern.eth_type == entry.eth_type)
}

/// Capabilities advertised in a FEATURES_REPLY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub flow_stats: bool,
    pub table_stats: bool,
    pub port_stats: bool,
}

impl Capabilities {
    fn of_int(d: u32) -> Capabilities {
        Capabilities {
            flow_stats: test_bit(0, d as u64),
            table_stats: test_bit(1, d as u64),
            port_stats: test_bit(2, d as u64),
        }
    }

    fn to_int(c: &Capabilities) -> u32 {
        let mut d = 0;
        d = bit(0, d, c.flow_stats);
        d = bit(1, d, c.table_stats);
        d = bit(2, d, c.port_stats);
        d as u32
    }
}

/// Switch features, the body of a FEATURES_REPLY.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchFeatures {
    pub datapath_id: u64,
    pub n_buffers: u32,
    pub n_tables: u8,
    pub auxiliary_id: u8,
    pub capabilities: Capabilities,
}

impl MessageType for SwitchFeatures {
    fn size_of(_: &SwitchFeatures) -> usize {
        24
    }

    fn parse(buf: &[u8]) -> Result<SwitchFeatures, ProtocolError> {
        ensure(buf, 24)?;
        let mut bytes = Cursor::new(buf);
        let datapath_id = bytes.read_u64::<BigEndian>().unwrap();
        let n_buffers = bytes.read_u32::<BigEndian>().unwrap();
        let n_tables = bytes.read_u8().unwrap();
        let auxiliary_id = bytes.read_u8().unwrap();
        bytes.consume(2);
        let capabilities = Capabilities::of_int(bytes.read_u32::<BigEndian>().unwrap());
        Ok(SwitchFeatures {
            datapath_id,
            n_buffers,
            n_tables,
            auxiliary_id,
            capabilities,
        })
    }

    fn marshal(sf: SwitchFeatures, bytes: &mut Vec<u8>) {
        bytes.write_u64::<BigEndian>(sf.datapath_id).unwrap();
        bytes.write_u32::<BigEndian>(sf.n_buffers).unwrap();
        bytes.write_u8(sf.n_tables).unwrap();
        bytes.write_u8(sf.auxiliary_id).unwrap();
        bytes.write_u16::<BigEndian>(0).unwrap();
        bytes
            .write_u32::<BigEndian>(Capabilities::to_int(&sf.capabilities))
            .unwrap();
        bytes.write_u32::<BigEndian>(0).unwrap(); // reserved
    }
}

/// Negotiated switch configuration, carried by SET_CONFIG and GET_CONFIG_REPLY.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchConfig {
    pub flags: u16,
    pub miss_send_len: u16,
}

impl Default for SwitchConfig {
    fn default() -> SwitchConfig {
        SwitchConfig {
            flags: 0,
            miss_send_len: PACKET_IN_MAX_BYTES as u16,
        }
    }
}

impl MessageType for SwitchConfig {
    fn size_of(_: &SwitchConfig) -> usize {
        4
    }

    fn parse(buf: &[u8]) -> Result<SwitchConfig, ProtocolError> {
        ensure(buf, 4)?;
        let mut bytes = Cursor::new(buf);
        Ok(SwitchConfig {
            flags: bytes.read_u16::<BigEndian>().unwrap(),
            miss_send_len: bytes.read_u16::<BigEndian>().unwrap(),
        })
    }

    fn marshal(sc: SwitchConfig, bytes: &mut Vec<u8>) {
        bytes.write_u16::<BigEndian>(sc.flags).unwrap();
        bytes.write_u16::<BigEndian>(sc.miss_send_len).unwrap();
    }
}

/// Type of modification to perform on the flow table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowModCmd {
    AddFlow,
    ModFlow,
    ModStrictFlow,
    DeleteFlow,
    DeleteStrictFlow,
}

impl FlowModCmd {
    fn of_int(d: u8) -> Result<FlowModCmd, ProtocolError> {
        match d {
            0 => Ok(FlowModCmd::AddFlow),
            1 => Ok(FlowModCmd::ModFlow),
            2 => Ok(FlowModCmd::ModStrictFlow),
            3 => Ok(FlowModCmd::DeleteFlow),
            4 => Ok(FlowModCmd::DeleteStrictFlow),
            d => Err(ProtocolError::UnknownCommand(d)),
        }
    }

    fn to_int(cmd: FlowModCmd) -> u8 {
        match cmd {
            FlowModCmd::AddFlow => 0,
            FlowModCmd::ModFlow => 1,
            FlowModCmd::ModStrictFlow => 2,
            FlowModCmd::DeleteFlow => 3,
            FlowModCmd::DeleteStrictFlow => 4,
        }
    }
}

/// Represents modifications to the flow table from the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowMod {
    pub cookie: u64,
    pub table_id: u8,
    pub command: FlowModCmd,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    pub priority: u16,
    pub apply_to_packet: Option<u32>,
    pub out_port: u32,
    pub out_group: u32,
    pub flags: u16,
    pub pattern: FlowMatch,
}

impl MessageType for FlowMod {
    fn size_of(_: &FlowMod) -> usize {
        40 + FlowMatch::SIZE
    }

    fn parse(buf: &[u8]) -> Result<FlowMod, ProtocolError> {
        ensure(buf, 40 + FlowMatch::SIZE)?;
        let mut bytes = Cursor::new(buf);
        let cookie = bytes.read_u64::<BigEndian>().unwrap();
        let _cookie_mask = bytes.read_u64::<BigEndian>().unwrap();
        let table_id = bytes.read_u8().unwrap();
        let command = FlowModCmd::of_int(bytes.read_u8().unwrap())?;
        let idle_timeout = bytes.read_u16::<BigEndian>().unwrap();
        let hard_timeout = bytes.read_u16::<BigEndian>().unwrap();
        let priority = bytes.read_u16::<BigEndian>().unwrap();
        let buffer_id = bytes.read_i32::<BigEndian>().unwrap();
        let out_port = bytes.read_u32::<BigEndian>().unwrap();
        let out_group = bytes.read_u32::<BigEndian>().unwrap();
        let flags = bytes.read_u16::<BigEndian>().unwrap();
        bytes.consume(2);
        let pattern = FlowMatch::parse(&buf[40..])?;
        Ok(FlowMod {
            cookie,
            table_id,
            command,
            idle_timeout,
            hard_timeout,
            priority,
            apply_to_packet: match buffer_id {
                -1 => None,
                n => Some(n as u32),
            },
            out_port,
            out_group,
            flags,
            pattern,
        })
    }

    fn marshal(fm: FlowMod, bytes: &mut Vec<u8>) {
        bytes.write_u64::<BigEndian>(fm.cookie).unwrap();
        bytes.write_u64::<BigEndian>(0).unwrap(); // cookie mask
        bytes.write_u8(fm.table_id).unwrap();
        bytes.write_u8(FlowModCmd::to_int(fm.command)).unwrap();
        bytes.write_u16::<BigEndian>(fm.idle_timeout).unwrap();
        bytes.write_u16::<BigEndian>(fm.hard_timeout).unwrap();
        bytes.write_u16::<BigEndian>(fm.priority).unwrap();
        bytes
            .write_i32::<BigEndian>(match fm.apply_to_packet {
                None => -1,
                Some(buf_id) => buf_id as i32,
            })
            .unwrap();
        bytes.write_u32::<BigEndian>(fm.out_port).unwrap();
        bytes.write_u32::<BigEndian>(fm.out_group).unwrap();
        bytes.write_u16::<BigEndian>(fm.flags).unwrap();
        bytes.write_u16::<BigEndian>(0).unwrap();
        FlowMatch::marshal(fm.pattern, bytes);
    }
}

/// The reason a packet arrives at the controller.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketInReason {
    NoMatch = 0,
    ExplicitSend = 1,
    InvalidTtl = 2,
}

impl PacketInReason {
    fn of_int(d: u8) -> Result<PacketInReason, ProtocolError> {
        match d {
            0 => Ok(PacketInReason::NoMatch),
            1 => Ok(PacketInReason::ExplicitSend),
            2 => Ok(PacketInReason::InvalidTtl),
            d => Err(ProtocolError::UnknownType(d)),
        }
    }
}

/// Represents packets punted from the datapath to the controller.
///
/// The match carried on the wire is the fixed empty OXM stub (type OXM,
/// length 4, padded to 8); the ingress port travels out of band of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketIn {
    pub buffer_id: Option<u32>,
    pub total_len: u16,
    pub reason: PacketInReason,
    pub table_id: u8,
    pub cookie: u64,
    pub payload: Vec<u8>,
}

impl PacketIn {
    /// Fixed bytes of a full PACKET_IN message before the payload: common
    /// header plus body fields plus the empty OXM match stub.
    pub const OVERHEAD: usize = 34;

    const BODY_FIXED: usize = Self::OVERHEAD - 8;
}

impl MessageType for PacketIn {
    fn size_of(pi: &PacketIn) -> usize {
        Self::BODY_FIXED + pi.payload.len()
    }

    fn parse(buf: &[u8]) -> Result<PacketIn, ProtocolError> {
        ensure(buf, Self::BODY_FIXED)?;
        let mut bytes = Cursor::new(buf);
        let buffer_id = match bytes.read_i32::<BigEndian>().unwrap() {
            -1 => None,
            n => Some(n as u32),
        };
        let total_len = bytes.read_u16::<BigEndian>().unwrap();
        let reason = PacketInReason::of_int(bytes.read_u8().unwrap())?;
        let table_id = bytes.read_u8().unwrap();
        let cookie = bytes.read_u64::<BigEndian>().unwrap();
        bytes.consume(8); // OXM match stub
        bytes.consume(2);
        let payload = buf[Self::BODY_FIXED..].to_vec();
        Ok(PacketIn {
            buffer_id,
            total_len,
            reason,
            table_id,
            cookie,
            payload,
        })
    }

    fn marshal(pi: PacketIn, bytes: &mut Vec<u8>) {
        bytes
            .write_i32::<BigEndian>(match pi.buffer_id {
                None => -1,
                Some(n) => n as i32,
            })
            .unwrap();
        bytes.write_u16::<BigEndian>(pi.total_len).unwrap();
        bytes.write_u8(pi.reason as u8).unwrap();
        bytes.write_u8(pi.table_id).unwrap();
        bytes.write_u64::<BigEndian>(pi.cookie).unwrap();
        bytes.write_u16::<BigEndian>(1).unwrap(); // OFPMT_OXM
        bytes.write_u16::<BigEndian>(4).unwrap(); // empty match length
        bytes.write_u32::<BigEndian>(0).unwrap(); // match pad to 8
        bytes.write_u16::<BigEndian>(0).unwrap();
        bytes.extend_from_slice(&pi.payload);
    }
}

/// A controller instruction to forward a frame out one or more ports.
///
/// Only a single OUTPUT action is decoded; the egress port is read from its
/// fixed offset inside the action list and anything else there is skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketOut {
    pub buffer_id: Option<u32>,
    pub in_port: u32,
    pub out_port: u32,
    pub payload: Vec<u8>,
}

impl PacketOut {
    const BODY_FIXED: usize = 16;
    const ACTION_OUTPUT_SIZE: usize = 16;
}

impl MessageType for PacketOut {
    fn size_of(po: &PacketOut) -> usize {
        Self::BODY_FIXED + Self::ACTION_OUTPUT_SIZE + po.payload.len()
    }

    fn parse(buf: &[u8]) -> Result<PacketOut, ProtocolError> {
        ensure(buf, Self::BODY_FIXED)?;
        let mut bytes = Cursor::new(buf);
        let buffer_id = match bytes.read_i32::<BigEndian>().unwrap() {
            -1 => None,
            n => Some(n as u32),
        };
        let in_port = bytes.read_u32::<BigEndian>().unwrap();
        let actions_len = bytes.read_u16::<BigEndian>().unwrap() as usize;
        if actions_len < Self::ACTION_OUTPUT_SIZE {
            return Err(ProtocolError::BadLength(actions_len as u16));
        }
        ensure(buf, Self::BODY_FIXED + actions_len)?;
        bytes.consume(6);
        let _typ = bytes.read_u16::<BigEndian>().unwrap();
        let _len = bytes.read_u16::<BigEndian>().unwrap();
        let out_port = bytes.read_u32::<BigEndian>().unwrap();
        let payload = buf[Self::BODY_FIXED + actions_len..].to_vec();
        Ok(PacketOut {
            buffer_id,
            in_port,
            out_port,
            payload,
        })
    }

    fn marshal(po: PacketOut, bytes: &mut Vec<u8>) {
        bytes
            .write_i32::<BigEndian>(match po.buffer_id {
                None => -1,
                Some(n) => n as i32,
            })
            .unwrap();
        bytes.write_u32::<BigEndian>(po.in_port).unwrap();
        bytes
            .write_u16::<BigEndian>(Self::ACTION_OUTPUT_SIZE as u16)
            .unwrap();
        bytes.extend_from_slice(&[0; 6]);
        // single OFPAT_OUTPUT action
        bytes.write_u16::<BigEndian>(0).unwrap();
        bytes
            .write_u16::<BigEndian>(Self::ACTION_OUTPUT_SIZE as u16)
            .unwrap();
        bytes.write_u32::<BigEndian>(po.out_port).unwrap();
        bytes.write_u16::<BigEndian>(0).unwrap(); // max_len
        bytes.extend_from_slice(&[0; 6]);
        bytes.extend_from_slice(&po.payload);
    }
}

/// Why a flow left the table.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowRemovedReason {
    IdleTimeout = 0,
    HardTimeout = 1,
    Delete = 2,
}

impl FlowRemovedReason {
    fn of_int(d: u8) -> Result<FlowRemovedReason, ProtocolError> {
        match d {
            0 => Ok(FlowRemovedReason::IdleTimeout),
            1 => Ok(FlowRemovedReason::HardTimeout),
            2 => Ok(FlowRemovedReason::Delete),
            d => Err(ProtocolError::UnknownType(d)),
        }
    }
}

/// Notification that a flow was removed from the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowRemoved {
    pub cookie: u64,
    pub priority: u16,
    pub reason: FlowRemovedReason,
    pub table_id: u8,
    pub duration_sec: u32,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    pub packet_count: u64,
    pub byte_count: u64,
}

impl MessageType for FlowRemoved {
    fn size_of(_: &FlowRemoved) -> usize {
        48
    }

    fn parse(buf: &[u8]) -> Result<FlowRemoved, ProtocolError> {
        ensure(buf, 48)?;
        let mut bytes = Cursor::new(buf);
        let cookie = bytes.read_u64::<BigEndian>().unwrap();
        let priority = bytes.read_u16::<BigEndian>().unwrap();
        let reason = FlowRemovedReason::of_int(bytes.read_u8().unwrap())?;
        let table_id = bytes.read_u8().unwrap();
        let duration_sec = bytes.read_u32::<BigEndian>().unwrap();
        let _duration_nsec = bytes.read_u32::<BigEndian>().unwrap();
        let idle_timeout = bytes.read_u16::<BigEndian>().unwrap();
        let hard_timeout = bytes.read_u16::<BigEndian>().unwrap();
        let packet_count = bytes.read_u64::<BigEndian>().unwrap();
        let byte_count = bytes.read_u64::<BigEndian>().unwrap();
        Ok(FlowRemoved {
            cookie,
            priority,
            reason,
            table_id,
            duration_sec,
            idle_timeout,
            hard_timeout,
            packet_count,
            byte_count,
        })
    }

    fn marshal(fr: FlowRemoved, bytes: &mut Vec<u8>) {
        bytes.write_u64::<BigEndian>(fr.cookie).unwrap();
        bytes.write_u16::<BigEndian>(fr.priority).unwrap();
        bytes.write_u8(fr.reason as u8).unwrap();
        bytes.write_u8(fr.table_id).unwrap();
        bytes.write_u32::<BigEndian>(fr.duration_sec).unwrap();
        bytes.write_u32::<BigEndian>(0).unwrap(); // duration_nsec
        bytes.write_u16::<BigEndian>(fr.idle_timeout).unwrap();
        bytes.write_u16::<BigEndian>(fr.hard_timeout).unwrap();
        bytes.write_u64::<BigEndian>(fr.packet_count).unwrap();
        bytes.write_u64::<BigEndian>(fr.byte_count).unwrap();
        bytes.write_u16::<BigEndian>(1).unwrap(); // OFPMT_OXM
        bytes.write_u16::<BigEndian>(4).unwrap();
        bytes.write_u32::<BigEndian>(0).unwrap();
    }
}

/// An ERROR message body: type, code, and a prefix of the offending message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMsg {
    pub typ: u16,
    pub code: u16,
    pub data: Vec<u8>,
}

impl MessageType for ErrorMsg {
    fn size_of(e: &ErrorMsg) -> usize {
        4 + e.data.len()
    }

    fn parse(buf: &[u8]) -> Result<ErrorMsg, ProtocolError> {
        ensure(buf, 4)?;
        let mut bytes = Cursor::new(buf);
        Ok(ErrorMsg {
            typ: bytes.read_u16::<BigEndian>().unwrap(),
            code: bytes.read_u16::<BigEndian>().unwrap(),
            data: buf[4..].to_vec(),
        })
    }

    fn marshal(e: ErrorMsg, bytes: &mut Vec<u8>) {
        bytes.write_u16::<BigEndian>(e.typ).unwrap();
        bytes.write_u16::<BigEndian>(e.code).unwrap();
        bytes.extend_from_slice(&e.data);
    }
}

/// A MULTIPART_REQUEST body: sub-type, flags, and the sub-type-specific rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartRequest {
    pub typ: u16,
    pub flags: u16,
    pub body: Vec<u8>,
}

impl MessageType for MultipartRequest {
    fn size_of(req: &MultipartRequest) -> usize {
        8 + req.body.len()
    }

    fn parse(buf: &[u8]) -> Result<MultipartRequest, ProtocolError> {
        ensure(buf, 8)?;
        let mut bytes = Cursor::new(buf);
        let typ = bytes.read_u16::<BigEndian>().unwrap();
        let flags = bytes.read_u16::<BigEndian>().unwrap();
        Ok(MultipartRequest {
            typ,
            flags,
            body: buf[8..].to_vec(),
        })
    }

    fn marshal(req: MultipartRequest, bytes: &mut Vec<u8>) {
        bytes.write_u16::<BigEndian>(req.typ).unwrap();
        bytes.write_u16::<BigEndian>(req.flags).unwrap();
        bytes.write_u32::<BigEndian>(0).unwrap();
        bytes.extend_from_slice(&req.body);
    }
}

/// The body of a PORT_STATS multipart request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortStatsRequest {
    pub port_no: u32,
}

impl MessageType for PortStatsRequest {
    fn size_of(_: &PortStatsRequest) -> usize {
        8
    }

    fn parse(buf: &[u8]) -> Result<PortStatsRequest, ProtocolError> {
        ensure(buf, 8)?;
        let mut bytes = Cursor::new(buf);
        Ok(PortStatsRequest {
            port_no: bytes.read_u32::<BigEndian>().unwrap(),
        })
    }

    fn marshal(req: PortStatsRequest, bytes: &mut Vec<u8>) {
        bytes.write_u32::<BigEndian>(req.port_no).unwrap();
        bytes.write_u32::<BigEndian>(0).unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn some_match() -> FlowMatch {
        FlowMatch {
            wildcards: FlowMatch::WC_ETH_TYPE,
            in_port: 2,
            eth_src: [1, 2, 3, 4, 5, 6],
            eth_dst: [6, 5, 4, 3, 2, 1],
            eth_type: 0,
        }
    }

    #[test]
    fn match_roundtrip() {
        let m = some_match();
        let mut bytes = vec![];
        FlowMatch::marshal(m, &mut bytes);
        assert_eq!(bytes.len(), FlowMatch::SIZE);
        assert_eq!(FlowMatch::parse(&bytes).unwrap(), m);
    }

    #[test]
    fn match_all_matches_anything() {
        let all = FlowMatch::match_all();
        assert!(field_match(&all, &some_match()));
        assert!(field_match(&all, &FlowMatch::default()));
    }

    #[test]
    fn wildcarded_fields_are_skipped() {
        let mut pattern = some_match();
        pattern.wildcards = FlowMatch::WC_ETH_SRC | FlowMatch::WC_ETH_TYPE;
        let mut entry = some_match();
        entry.eth_src = [9; 6];
        entry.eth_type = 0x0806;
        assert!(field_match(&pattern, &entry));
        entry.in_port = 3;
        assert!(!field_match(&pattern, &entry));
    }

    #[test]
    fn switch_features_roundtrip() {
        let sf = SwitchFeatures {
            datapath_id: 0x17c5_0102_03,
            n_buffers: 0,
            n_tables: 1,
            auxiliary_id: 0,
            capabilities: Capabilities {
                flow_stats: true,
                table_stats: true,
                port_stats: true,
            },
        };
        let mut bytes = vec![];
        SwitchFeatures::marshal(sf, &mut bytes);
        assert_eq!(bytes.len(), SwitchFeatures::size_of(&sf));
        assert_eq!(SwitchFeatures::parse(&bytes).unwrap(), sf);
    }

    #[test]
    fn flow_mod_roundtrip() {
        let fm = FlowMod {
            cookie: 7,
            table_id: 0,
            command: FlowModCmd::AddFlow,
            idle_timeout: 30,
            hard_timeout: 0,
            priority: 100,
            apply_to_packet: None,
            out_port: OFPP_ANY,
            out_group: 0,
            flags: OFPFF_SEND_FLOW_REM,
            pattern: some_match(),
        };
        let mut bytes = vec![];
        FlowMod::marshal(fm, &mut bytes);
        assert_eq!(bytes.len(), FlowMod::size_of(&fm));
        assert_eq!(FlowMod::parse(&bytes).unwrap(), fm);
    }

    #[test]
    fn flow_mod_unknown_command() {
        let fm = FlowMod {
            cookie: 0,
            table_id: 0,
            command: FlowModCmd::AddFlow,
            idle_timeout: 0,
            hard_timeout: 0,
            priority: 0,
            apply_to_packet: None,
            out_port: OFPP_ANY,
            out_group: 0,
            flags: 0,
            pattern: FlowMatch::match_all(),
        };
        let mut bytes = vec![];
        FlowMod::marshal(fm, &mut bytes);
        bytes[17] = 99; // command byte
        assert_eq!(
            FlowMod::parse(&bytes),
            Err(ProtocolError::UnknownCommand(99))
        );
    }

    #[test]
    fn packet_in_roundtrip() {
        let pi = PacketIn {
            buffer_id: None,
            total_len: 200,
            reason: PacketInReason::NoMatch,
            table_id: 0,
            cookie: 0,
            payload: vec![0xab; 128],
        };
        let mut bytes = vec![];
        PacketIn::marshal(pi.clone(), &mut bytes);
        // body + common header == payload + fixed overhead
        assert_eq!(bytes.len() + 8, pi.payload.len() + PacketIn::OVERHEAD);
        assert_eq!(PacketIn::parse(&bytes).unwrap(), pi);
    }

    #[test]
    fn packet_out_roundtrip() {
        let po = PacketOut {
            buffer_id: None,
            in_port: 1,
            out_port: OFPP_FLOOD,
            payload: vec![1, 2, 3, 4],
        };
        let mut bytes = vec![];
        PacketOut::marshal(po.clone(), &mut bytes);
        assert_eq!(bytes.len(), PacketOut::size_of(&po));
        assert_eq!(PacketOut::parse(&bytes).unwrap(), po);
    }

    #[test]
    fn packet_out_truncated_action_list() {
        let po = PacketOut {
            buffer_id: None,
            in_port: 1,
            out_port: 2,
            payload: vec![],
        };
        let mut bytes = vec![];
        PacketOut::marshal(po, &mut bytes);
        bytes.truncate(20);
        assert!(matches!(
            PacketOut::parse(&bytes),
            Err(ProtocolError::Truncated { .. })
        ));
    }

    #[test]
    fn error_msg_roundtrip() {
        let e = ErrorMsg {
            typ: OFPET_FLOW_MOD_FAILED,
            code: OFPFMFC_TABLE_FULL,
            data: vec![4, 14, 0, 72],
        };
        let mut bytes = vec![];
        ErrorMsg::marshal(e.clone(), &mut bytes);
        assert_eq!(bytes.len(), ErrorMsg::size_of(&e));
        assert_eq!(ErrorMsg::parse(&bytes).unwrap(), e);
    }

    #[test]
    fn flow_removed_roundtrip() {
        let fr = FlowRemoved {
            cookie: 9,
            priority: 10,
            reason: FlowRemovedReason::Delete,
            table_id: 0,
            duration_sec: 42,
            idle_timeout: 0,
            hard_timeout: 0,
            packet_count: 17,
            byte_count: 1700,
        };
        let mut bytes = vec![];
        FlowRemoved::marshal(fr, &mut bytes);
        assert_eq!(bytes.len(), FlowRemoved::size_of(&fr));
        assert_eq!(FlowRemoved::parse(&bytes).unwrap(), fr);
    }

    #[test]
    fn multipart_request_roundtrip() {
        let req = MultipartRequest {
            typ: OFPMP_PORT_STATS,
            flags: 0,
            body: {
                let mut b = vec![];
                PortStatsRequest::marshal(PortStatsRequest { port_no: OFPP_ANY }, &mut b);
                b
            },
        };
        let mut bytes = vec![];
        MultipartRequest::marshal(req.clone(), &mut bytes);
        let parsed = MultipartRequest::parse(&bytes).unwrap();
        assert_eq!(parsed, req);
        assert_eq!(
            PortStatsRequest::parse(&parsed.body).unwrap().port_no,
            OFPP_ANY
        );
    }
}
