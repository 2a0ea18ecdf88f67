//! Outbound packet construction.
//!
//! Frame layout: `[0xD5] [LEN] [CMD] [args...] [CRC]`. LEN counts the
//! command byte plus arguments; the CRC covers the same span. All
//! multi-byte arguments are little-endian.

use crate::crc::crc8;
use printkit_core::{ProtocolError, Result};

/// Frame start byte.
pub const START_BYTE: u8 = 0xd5;

/// Largest payload (command byte plus arguments) a frame can carry.
/// 255 is reserved.
pub const MAX_PAYLOAD: usize = 254;

/// Builds one outbound frame.
///
/// The builder writes arguments after the command byte; [`finish`]
/// backfills the length field and appends the CRC. The returned frame
/// is immutable, so a retry re-sends exactly the bytes built here.
///
/// [`finish`]: PacketBuilder::finish
#[derive(Debug, Clone)]
pub struct PacketBuilder {
    buf: Vec<u8>,
}

impl PacketBuilder {
    pub fn new(command: u8) -> Self {
        // Start byte and a length placeholder, then the command.
        PacketBuilder {
            buf: vec![START_BYTE, 0, command],
        }
    }

    pub fn add_u8(&mut self, value: u8) -> &mut Self {
        self.buf.push(value);
        self
    }

    pub fn add_u16(&mut self, value: u16) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn add_u32(&mut self, value: u32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn add_i32(&mut self, value: i32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn add_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Finalize the frame: set the length field, append the CRC.
    pub fn finish(mut self) -> Result<Vec<u8>> {
        let payload_len = self.buf.len() - 2;
        if payload_len > MAX_PAYLOAD {
            return Err(ProtocolError::PayloadTooLarge { len: payload_len }.into());
        }
        self.buf[1] = payload_len as u8;
        let crc = crc8(&self.buf[2..]);
        self.buf.push(crc);
        Ok(self.buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_frame() {
        // Version query with no arguments.
        let frame = PacketBuilder::new(0).finish().unwrap();
        assert_eq!(frame[0], START_BYTE);
        assert_eq!(frame[1], 1);
        assert_eq!(frame[2], 0);
        assert_eq!(frame.len(), 4);
        assert_eq!(frame[3], crc8(&[0]));
    }

    #[test]
    fn little_endian_arguments() {
        let mut pb = PacketBuilder::new(0x81);
        pb.add_u16(0x1234).add_u32(0xdeadbeef).add_i32(-2);
        let frame = pb.finish().unwrap();
        assert_eq!(frame[1], 11);
        assert_eq!(&frame[3..5], &[0x34, 0x12]);
        assert_eq!(&frame[5..9], &[0xef, 0xbe, 0xad, 0xde]);
        assert_eq!(&frame[9..13], &[0xfe, 0xff, 0xff, 0xff]);
    }

    #[test]
    fn oversized_payload_rejected() {
        let mut pb = PacketBuilder::new(1);
        pb.add_bytes(&[0u8; 254]);
        assert!(pb.finish().is_err());
    }

    #[test]
    fn payload_at_limit_accepted() {
        let mut pb = PacketBuilder::new(1);
        pb.add_bytes(&[0u8; 253]);
        let frame = pb.finish().unwrap();
        assert_eq!(frame[1], 254);
    }
}
