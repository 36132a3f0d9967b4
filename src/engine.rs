//! The control-plane engine: framing, dispatch, and reply generation for one
//! controller connection.
//!
//! Inbound bytes go through a length-prefix framer; complete messages are
//! dispatched one at a time. Replies accumulate in the scratch buffer and are
//! flushed to the transport exactly once per reassembly-unit boundary (the
//! point where no partial message remains buffered). Barrier replies are
//! deferred to that boundary so every earlier message has been dispatched
//! first.

use tracing::{debug, warn};

use crate::bits::{flood_mask, mac_of_bytes, port_mask};
use crate::error::ProtocolError;
use crate::flow_table::{FlowEntry, FlowTable, RemovedFlow};
use crate::multipart;
use crate::ofp_header::{OfpHeader, OFP_VERSION};
use crate::openflow0x04::{
    Capabilities, ErrorMsg, FlowMod, FlowModCmd, FlowRemoved, FlowRemovedReason, MessageType,
    MsgCode, MultipartRequest, PacketIn, PacketInReason, PacketOut, PortStatsRequest,
    SwitchConfig, SwitchFeatures, ERROR_ECHO_MAX, OFPBRC_BAD_LEN, OFPBRC_BAD_MULTIPART,
    OFPBRC_BAD_PORT, OFPET_BAD_REQUEST, OFPET_FLOW_MOD_FAILED, OFPFMFC_BAD_COMMAND,
    OFPFMFC_TABLE_FULL, OFPMP_DESC, OFPMP_PORT_DESC, OFPMP_PORT_STATS, OFPMP_TABLE_FEATURES,
    OFPP_FLOOD, PACKET_IN_MAX_BYTES,
};

/// Physical ports on the device, OpenFlow-enabled or not.
pub const MAX_PORTS: usize = 4;

/// Outbound transport for complete control messages. Sends are
/// fire-and-forget; no status is observed by the engine.
pub trait Transport {
    fn send(&mut self, bytes: &[u8]);
    /// Bytes of send buffer currently available, queried before building a
    /// PACKET_IN.
    fn send_capacity(&self) -> usize;
}

/// The hardware forwarding layer that actually moves frames.
pub trait Datapath {
    /// Transmit `payload` out every data port set in `port_mask` (bit 0 is
    /// port 1).
    fn forward_frame(&mut self, payload: &[u8], port_mask: u32);
}

/// Monotonic time source backing flow duration and last-match bookkeeping.
pub trait Clock {
    fn uptime_secs(&self) -> u32;
}

/// Static device identity, loaded by the embedding layer.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub mac_address: [u8; 6],
    /// Which physical ports are OpenFlow-enabled.
    pub of_ports: [bool; MAX_PORTS],
    /// Number of data ports, parameterizing flood arithmetic.
    pub data_ports: u32,
}

impl Default for DeviceConfig {
    fn default() -> DeviceConfig {
        DeviceConfig {
            mac_address: [0x00, 0x17, 0xc5, 0x01, 0x02, 0x03],
            of_ports: [true, true, true, false],
            data_ports: 3,
        }
    }
}

/// Per physical-port counters, updated by the datapath layer and read-only
/// to the engine except for zeroing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PortStats {
    pub rx_packets: u64,
    pub tx_packets: u64,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_dropped: u64,
    pub tx_dropped: u64,
    pub rx_crc_err: u64,
}

impl PortStats {
    pub fn clear(&mut self) {
        *self = PortStats::default();
    }
}

/// Protocol engine for a single controller connection.
///
/// Single-threaded by construction: every entry point takes `&mut self` and
/// there is exactly one logical message in flight at a time.
pub struct OfEngine<T, D, C> {
    transport: T,
    datapath: D,
    clock: C,
    config: DeviceConfig,
    /// Per-port hardware addresses, derived once at init so PORT_DESC
    /// replies report a stable identity.
    port_macs: [[u8; 6]; MAX_PORTS],
    /// Externally-observed link status per physical port.
    pub port_status: [bool; MAX_PORTS],
    pub port_stats: [PortStats; MAX_PORTS],
    switch_config: SwitchConfig,
    table: FlowTable,
    rx: Vec<u8>,
    scratch: Vec<u8>,
    /// Barrier xids owed a reply at the next reassembly-unit boundary, in
    /// arrival order.
    pending_barriers: Vec<u32>,
}

fn derive_port_macs(base: [u8; 6]) -> [[u8; 6]; MAX_PORTS] {
    let mut macs = [base; MAX_PORTS];
    for (i, mac) in macs.iter_mut().enumerate() {
        mac[5] = mac[5].wrapping_add(i as u8 + 1);
    }
    macs
}

impl<T: Transport, D: Datapath, C: Clock> OfEngine<T, D, C> {
    pub fn new(mut config: DeviceConfig, transport: T, datapath: D, clock: C) -> OfEngine<T, D, C> {
        // a device cannot have more data ports than physical ports
        config.data_ports = config.data_ports.min(MAX_PORTS as u32);
        let port_macs = derive_port_macs(config.mac_address);
        OfEngine {
            transport,
            datapath,
            clock,
            config,
            port_macs,
            port_status: [true; MAX_PORTS],
            port_stats: [PortStats::default(); MAX_PORTS],
            switch_config: SwitchConfig::default(),
            table: FlowTable::new(),
            rx: vec![],
            scratch: vec![],
            pending_barriers: vec![],
        }
    }

    pub fn table(&self) -> &FlowTable {
        &self.table
    }

    pub fn table_mut(&mut self) -> &mut FlowTable {
        &mut self.table
    }

    pub fn switch_config(&self) -> &SwitchConfig {
        &self.switch_config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn datapath(&self) -> &D {
        &self.datapath
    }

    /// Feed bytes received from the control connection.
    ///
    /// Dispatches every complete message buffered so far. When the delivery
    /// leaves no partial message behind, any owed barrier reply is emitted
    /// and the accumulated replies are flushed as one unit.
    pub fn deliver(&mut self, data: &[u8]) {
        self.rx.extend_from_slice(data);
        while let Some(msg) = self.next_message() {
            self.dispatch(&msg);
        }
        if self.rx.is_empty() {
            for xid in std::mem::take(&mut self.pending_barriers) {
                self.barrier_reply(xid);
            }
            self.flush();
        }
    }

    /// Pop the next complete length-prefixed message off the rx buffer.
    fn next_message(&mut self) -> Option<Vec<u8>> {
        if self.rx.len() < OfpHeader::SIZE {
            return None;
        }
        let len = u16::from_be_bytes([self.rx[2], self.rx[3]]) as usize;
        if len < OfpHeader::SIZE {
            // framing is unrecoverable past this point; drop the buffer
            warn!(len, "declared length shorter than header, resetting stream");
            self.rx.clear();
            return None;
        }
        if self.rx.len() < len {
            return None;
        }
        Some(self.rx.drain(..len).collect())
    }

    fn dispatch(&mut self, msg: &[u8]) {
        let header = match OfpHeader::parse(msg) {
            Ok(header) => header,
            Err(e) => {
                warn!(error = %e, "dropping unparseable message");
                return;
            }
        };
        let code = match header.type_code() {
            Ok(code) => code,
            Err(e) => {
                debug!(error = %e, "ignoring unknown message type");
                return;
            }
        };
        if header.version() != OFP_VERSION && code != MsgCode::Hello {
            let e = ProtocolError::BadVersion(header.version());
            warn!(error = %e, "dropping message");
            return;
        }
        let xid = header.xid();
        let body = &msg[OfpHeader::SIZE..];
        match code {
            MsgCode::Hello => debug!(version = header.version(), "hello from controller"),
            MsgCode::EchoReq => self.echo_reply(xid, body),
            MsgCode::FeaturesReq => self.features_reply(xid),
            MsgCode::GetConfigReq => self.get_config_reply(xid),
            MsgCode::SetConfig => self.set_config(msg),
            MsgCode::FlowMod => self.flow_mod(msg),
            MsgCode::MultipartReq => self.multipart_request(xid, msg),
            MsgCode::PacketOut => self.packet_out(msg),
            MsgCode::BarrierReq => self.pending_barriers.push(xid),
            other => debug!(code = ?other, "ignoring unhandled message"),
        }
    }

    fn features_reply(&mut self, xid: u32) {
        let features = SwitchFeatures {
            datapath_id: mac_of_bytes(self.config.mac_address),
            n_buffers: 0,
            n_tables: 1,
            auxiliary_id: 0, // primary connection
            capabilities: Capabilities {
                flow_stats: true,
                table_stats: true,
                port_stats: true,
            },
        };
        let len = OfpHeader::SIZE + SwitchFeatures::size_of(&features);
        OfpHeader::marshal(
            &mut self.scratch,
            OfpHeader::new(OFP_VERSION, MsgCode::FeaturesResp as u8, len as u16, xid),
        );
        SwitchFeatures::marshal(features, &mut self.scratch);
    }

    fn set_config(&mut self, msg: &[u8]) {
        match SwitchConfig::parse(&msg[OfpHeader::SIZE..]) {
            Ok(config) => {
                debug!(flags = config.flags, miss_send_len = config.miss_send_len, "set config");
                self.switch_config = config;
            }
            Err(e) => warn!(error = %e, "dropping malformed set-config"),
        }
    }

    fn get_config_reply(&mut self, xid: u32) {
        let config = self.switch_config;
        let len = OfpHeader::SIZE + SwitchConfig::size_of(&config);
        OfpHeader::marshal(
            &mut self.scratch,
            OfpHeader::new(OFP_VERSION, MsgCode::GetConfigResp as u8, len as u16, xid),
        );
        SwitchConfig::marshal(config, &mut self.scratch);
    }

    fn echo_reply(&mut self, xid: u32, payload: &[u8]) {
        let len = OfpHeader::SIZE + payload.len();
        OfpHeader::marshal(
            &mut self.scratch,
            OfpHeader::new(OFP_VERSION, MsgCode::EchoResp as u8, len as u16, xid),
        );
        self.scratch.extend_from_slice(payload);
    }

    fn flow_mod(&mut self, msg: &[u8]) {
        let fm = match FlowMod::parse(&msg[OfpHeader::SIZE..]) {
            Ok(fm) => fm,
            Err(ProtocolError::UnknownCommand(cmd)) => {
                debug!(cmd, "unknown flow-mod command");
                self.of_error(msg, OFPET_FLOW_MOD_FAILED, OFPFMFC_BAD_COMMAND);
                return;
            }
            Err(e) => {
                warn!(error = %e, "dropping malformed flow-mod");
                self.of_error(msg, OFPET_BAD_REQUEST, OFPBRC_BAD_LEN);
                return;
            }
        };
        match fm.command {
            FlowModCmd::AddFlow => self.flow_add(msg, &fm),
            FlowModCmd::DeleteFlow => self.flow_delete(&fm),
            cmd => {
                // MODIFY and the strict variants are not implemented; answer
                // with an explicit error rather than silently ignoring them
                debug!(cmd = ?cmd, "unimplemented flow-mod command");
                self.of_error(msg, OFPET_FLOW_MOD_FAILED, OFPFMFC_BAD_COMMAND);
            }
        }
    }

    fn flow_add(&mut self, msg: &[u8], fm: &FlowMod) {
        let now = self.clock.uptime_secs();
        match self.table.add(FlowEntry::from_flow_mod(fm), now) {
            Ok(idx) => debug!(idx, priority = fm.priority, "flow added"),
            Err(e) => {
                warn!(error = %e, "rejecting flow add");
                self.of_error(msg, OFPET_FLOW_MOD_FAILED, OFPFMFC_TABLE_FULL);
            }
        }
    }

    fn flow_delete(&mut self, fm: &FlowMod) {
        let now = self.clock.uptime_secs();
        let (removed, notices) = self.table.delete(&fm.pattern);
        for flow in notices {
            self.flow_removed(&flow, FlowRemovedReason::Delete, now);
        }
        debug!(removed, "flow delete");
    }

    fn flow_removed(&mut self, flow: &RemovedFlow, reason: FlowRemovedReason, now: u32) {
        let fr = FlowRemoved {
            cookie: flow.entry.cookie,
            priority: flow.entry.priority,
            reason,
            table_id: flow.entry.table_id,
            duration_sec: now.saturating_sub(flow.counters.duration),
            idle_timeout: flow.entry.idle_timeout,
            hard_timeout: flow.entry.hard_timeout,
            packet_count: flow.counters.packet_count,
            byte_count: flow.counters.byte_count,
        };
        let len = OfpHeader::SIZE + FlowRemoved::size_of(&fr);
        OfpHeader::marshal(
            &mut self.scratch,
            OfpHeader::new(OFP_VERSION, MsgCode::FlowRemoved as u8, len as u16, 0),
        );
        FlowRemoved::marshal(fr, &mut self.scratch);
    }

    fn multipart_request(&mut self, xid: u32, msg: &[u8]) {
        let req = match MultipartRequest::parse(&msg[OfpHeader::SIZE..]) {
            Ok(req) => req,
            Err(e) => {
                warn!(error = %e, "dropping malformed multipart request");
                self.of_error(msg, OFPET_BAD_REQUEST, OFPBRC_BAD_LEN);
                return;
            }
        };
        match req.typ {
            OFPMP_DESC => {
                multipart::desc_reply(&mut self.scratch, xid);
            }
            OFPMP_PORT_DESC => {
                multipart::port_desc_reply(
                    &mut self.scratch,
                    xid,
                    &self.config.of_ports,
                    &self.port_macs,
                    &self.port_status,
                );
            }
            OFPMP_TABLE_FEATURES => {
                multipart::table_features_reply(&mut self.scratch, xid);
            }
            OFPMP_PORT_STATS => match PortStatsRequest::parse(&req.body) {
                Ok(psr) => {
                    if let Err(e) = multipart::port_stats_reply(
                        &mut self.scratch,
                        xid,
                        psr.port_no,
                        &self.port_stats,
                        self.config.data_ports,
                    ) {
                        warn!(error = %e, "rejecting port-stats request");
                        self.of_error(msg, OFPET_BAD_REQUEST, OFPBRC_BAD_PORT);
                    }
                }
                Err(e) => {
                    warn!(error = %e, "dropping malformed port-stats request");
                    self.of_error(msg, OFPET_BAD_REQUEST, OFPBRC_BAD_LEN);
                }
            },
            typ => {
                let e = ProtocolError::BadMultipart(typ);
                debug!(error = %e, "rejecting multipart request");
                self.of_error(msg, OFPET_BAD_REQUEST, OFPBRC_BAD_MULTIPART);
            }
        }
    }

    fn packet_out(&mut self, msg: &[u8]) {
        let po = match PacketOut::parse(&msg[OfpHeader::SIZE..]) {
            Ok(po) => po,
            Err(e) => {
                warn!(error = %e, "dropping malformed packet-out");
                return;
            }
        };
        let mask = if po.out_port == OFPP_FLOOD {
            flood_mask(po.in_port, self.config.data_ports)
        } else if po.out_port >= 1 && po.out_port <= self.config.data_ports {
            port_mask(po.out_port)
        } else {
            warn!(port = po.out_port, "packet-out to unsupported port");
            return;
        };
        self.datapath.forward_frame(&po.payload, mask);
    }

    /// Data-plane hook: called by the embedding layer for every frame
    /// arriving on an OpenFlow port. A miss against an empty table punts the
    /// frame to the controller.
    pub fn table_lookup(&mut self, frame: &[u8], port: u32) {
        if self.table.is_empty() {
            self.packet_in(frame, frame.len() as u16, port, PacketInReason::NoMatch);
        }
    }

    /// Encapsulate a punted frame into a PACKET_IN and send it.
    ///
    /// The copied payload is capped at 128 bytes while `total_len` keeps the
    /// true frame length. If the transport cannot take the message right
    /// now the frame is dropped silently: no queueing, no retry, no error
    /// to the controller.
    pub fn packet_in(&mut self, frame: &[u8], total_len: u16, port: u32, reason: PacketInReason) {
        let send_size = frame.len().min(PACKET_IN_MAX_BYTES);
        if self.transport.send_capacity() < send_size + PacketIn::OVERHEAD {
            debug!(port, "dropping packet-in, send buffer low");
            return;
        }
        let pi = PacketIn {
            buffer_id: None,
            total_len,
            reason,
            table_id: 0,
            cookie: 0,
            payload: frame[..send_size].to_vec(),
        };
        let _ = port; // ingress port would travel in a real OXM match
        let len = send_size + PacketIn::OVERHEAD;
        let mut bytes = Vec::with_capacity(len);
        OfpHeader::marshal(
            &mut bytes,
            OfpHeader::new(OFP_VERSION, MsgCode::PacketIn as u8, len as u16, 0),
        );
        PacketIn::marshal(pi, &mut bytes);
        self.transport.send(&bytes);
    }

    fn barrier_reply(&mut self, xid: u32) {
        OfpHeader::marshal(
            &mut self.scratch,
            OfpHeader::new(
                OFP_VERSION,
                MsgCode::BarrierResp as u8,
                OfpHeader::SIZE as u16,
                xid,
            ),
        );
    }

    fn of_error(&mut self, msg: &[u8], typ: u16, code: u16) {
        let xid = match OfpHeader::parse(msg) {
            Ok(header) => header.xid(),
            Err(_) => 0,
        };
        let echo = &msg[..msg.len().min(ERROR_ECHO_MAX)];
        let e = ErrorMsg {
            typ,
            code,
            data: echo.to_vec(),
        };
        let len = OfpHeader::SIZE + ErrorMsg::size_of(&e);
        OfpHeader::marshal(
            &mut self.scratch,
            OfpHeader::new(OFP_VERSION, MsgCode::Error as u8, len as u16, xid),
        );
        ErrorMsg::marshal(e, &mut self.scratch);
    }

    /// Hand the accumulated replies to the transport and reset the cursor.
    fn flush(&mut self) {
        if !self.scratch.is_empty() {
            self.transport.send(&self.scratch);
            self.scratch.clear();
        }
    }
}
