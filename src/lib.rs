//! Switch-side OpenFlow v1.3 (0x04) protocol engine.
//!
//! Parses control messages arriving over a single TCP connection, maintains
//! a fixed-capacity flow table, builds protocol replies (features, multipart
//! statistics and descriptions, barriers, errors), and bridges control-plane
//! decisions to the forwarding datapath: punted frames become PACKET_IN
//! messages, PACKET_OUT messages become port bitmasks for the hardware.
//!
//! The TCP stack, the MAC driver, persisted configuration, and the
//! management shell are external collaborators reached through the traits in
//! [`engine`].

pub mod bits;
pub mod engine;
pub mod error;
pub mod flow_table;
pub mod multipart;
pub mod ofp_header;
pub mod openflow0x04;
