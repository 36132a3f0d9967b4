use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::ProtocolError;
use crate::openflow0x04::MsgCode;

/// Wire version byte for OpenFlow v1.3.
pub const OFP_VERSION: u8 = 0x04;

/// OpenFlow Header
///
/// The first fields of every OpenFlow message, no matter the protocol version.
/// This is parsed to determine version and length of the remaining message, so that
/// it can be properly handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OfpHeader {
    version: u8,
    typ: u8,
    length: u16,
    xid: u32,
}

impl OfpHeader {
    /// Byte-size of an `OfpHeader` on the wire.
    pub const SIZE: usize = 8;

    /// Create an `OfpHeader` out of the arguments.
    pub fn new(version: u8, typ: u8, length: u16, xid: u32) -> OfpHeader {
        OfpHeader {
            version,
            typ,
            length,
            xid,
        }
    }

    /// Fills a message buffer with the header fields of an `OfpHeader`.
    pub fn marshal(bytes: &mut Vec<u8>, header: OfpHeader) {
        bytes.write_u8(header.version()).unwrap();
        bytes.write_u8(header.typ).unwrap();
        bytes.write_u16::<BigEndian>(header.length() as u16).unwrap();
        bytes.write_u32::<BigEndian>(header.xid()).unwrap();
    }

    /// Parse the leading bytes of `buf` into an `OfpHeader`.
    ///
    /// Fails if fewer than [`OfpHeader::SIZE`] bytes are available or the
    /// declared length could not cover the header itself.
    pub fn parse(buf: &[u8]) -> Result<OfpHeader, ProtocolError> {
        if buf.len() < Self::SIZE {
            return Err(ProtocolError::Truncated {
                need: Self::SIZE,
                have: buf.len(),
            });
        }
        let mut bytes = Cursor::new(buf);
        let version = bytes.read_u8().unwrap();
        let typ = bytes.read_u8().unwrap();
        let length = bytes.read_u16::<BigEndian>().unwrap();
        let xid = bytes.read_u32::<BigEndian>().unwrap();
        if (length as usize) < Self::SIZE {
            return Err(ProtocolError::BadLength(length));
        }
        Ok(OfpHeader {
            version,
            typ,
            length,
            xid,
        })
    }

    /// Return the `version` field of a header.
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Return the OpenFlow message type code of a header, or an error for a
    /// code point this engine does not know.
    pub fn type_code(&self) -> Result<MsgCode, ProtocolError> {
        MsgCode::from_u8(self.typ)
    }

    /// Return the `length` field of a header. Includes the length of the header itself.
    pub fn length(&self) -> usize {
        self.length as usize
    }

    /// Return the `xid` field of a header, the transaction id associated with this packet.
    /// Replies use the same id to facilitate pairing.
    pub fn xid(&self) -> u32 {
        self.xid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marshal_parse_roundtrip() {
        let hdr = OfpHeader::new(OFP_VERSION, MsgCode::BarrierReq as u8, 8, 0xdeadbeef);
        let mut bytes = vec![];
        OfpHeader::marshal(&mut bytes, hdr);
        assert_eq!(bytes.len(), OfpHeader::SIZE);
        let parsed = OfpHeader::parse(&bytes).unwrap();
        assert_eq!(parsed, hdr);
        assert_eq!(parsed.type_code().unwrap(), MsgCode::BarrierReq);
    }

    #[test]
    fn short_buffer_is_rejected() {
        assert_eq!(
            OfpHeader::parse(&[4, 0, 0]),
            Err(ProtocolError::Truncated { need: 8, have: 3 })
        );
    }

    #[test]
    fn undersized_declared_length_is_rejected() {
        let bytes = [4, 0, 0, 4, 0, 0, 0, 1];
        assert_eq!(OfpHeader::parse(&bytes), Err(ProtocolError::BadLength(4)));
    }
}
