//! Reply classification and payload readers.

use std::fmt;

/// Sentinel code used for locally synthesized timeout responses.
/// Never sent by real firmware.
pub const TIMEOUT_CODE: u8 = 127;

/// Firmware response classification.
///
/// Firmware revisions differ on whether the high bit is set on response
/// codes, so both raw forms map to the same variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    /// Command failed for an unspecified reason.
    GenericError,
    Ok,
    /// Command buffer full. Backpressure, not a data fault; the sender
    /// should re-send the identical frame after a short delay.
    BufferOverflow,
    /// Firmware saw a corrupt frame.
    CrcMismatch,
    /// Too many queries in flight.
    QueryOverflow,
    /// Firmware does not implement the command.
    Unsupported,
    /// Command accepted, further replies pending.
    OkMorePending,
    /// No reply arrived; synthesized locally.
    Timeout,
}

impl ResponseCode {
    /// Classify a raw wire code.
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0x00 | 0x80 => ResponseCode::GenericError,
            0x01 | 0x81 => ResponseCode::Ok,
            0x02 | 0x82 => ResponseCode::BufferOverflow,
            0x03 | 0x83 => ResponseCode::CrcMismatch,
            0x04 | 0x84 => ResponseCode::QueryOverflow,
            0x05 | 0x85 => ResponseCode::Unsupported,
            0x06 | 0x86 => ResponseCode::OkMorePending,
            TIMEOUT_CODE => ResponseCode::Timeout,
            other => {
                tracing::debug!(code = other, "unrecognized response code");
                ResponseCode::GenericError
            }
        }
    }

    /// Whether the command was accepted.
    pub fn is_ok(self) -> bool {
        matches!(self, ResponseCode::Ok | ResponseCode::OkMorePending)
    }

    /// Whether the sender should retry the same frame.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ResponseCode::BufferOverflow | ResponseCode::CrcMismatch | ResponseCode::Timeout
        )
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResponseCode::GenericError => "generic error",
            ResponseCode::Ok => "ok",
            ResponseCode::BufferOverflow => "buffer overflow",
            ResponseCode::CrcMismatch => "crc mismatch",
            ResponseCode::QueryOverflow => "query overflow",
            ResponseCode::Unsupported => "unsupported command",
            ResponseCode::OkMorePending => "ok, more pending",
            ResponseCode::Timeout => "timeout",
        };
        write!(f, "{}", s)
    }
}

/// A decoded reply payload with sequential little-endian readers.
///
/// Byte zero is the response code; the read cursor starts just past it.
/// Reads past the end return zero and log, so a short reply degrades to
/// zeros rather than tearing down the exchange. Callers that need a
/// guaranteed length check [`len`](PacketResponse::len) first.
#[derive(Debug, Clone)]
pub struct PacketResponse {
    payload: Vec<u8>,
    cursor: usize,
}

impl PacketResponse {
    pub fn new(payload: Vec<u8>) -> Self {
        PacketResponse { payload, cursor: 1 }
    }

    /// A synthetic all-is-well response.
    pub fn ok() -> Self {
        PacketResponse::new(vec![0x01])
    }

    /// A synthetic response representing a timed-out exchange.
    pub fn timeout() -> Self {
        PacketResponse::new(vec![TIMEOUT_CODE])
    }

    pub fn code(&self) -> ResponseCode {
        match self.payload.first() {
            Some(&raw) => ResponseCode::from_raw(raw),
            None => ResponseCode::GenericError,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code().is_ok()
    }

    /// Payload bytes after the response code.
    pub fn len(&self) -> usize {
        self.payload.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn take(&mut self, n: usize) -> Option<&[u8]> {
        if self.cursor + n <= self.payload.len() {
            let slice = &self.payload[self.cursor..self.cursor + n];
            self.cursor += n;
            Some(slice)
        } else {
            tracing::debug!(
                wanted = n,
                available = self.payload.len().saturating_sub(self.cursor),
                "read past end of reply payload"
            );
            self.cursor = self.payload.len();
            None
        }
    }

    pub fn read_u8(&mut self) -> u8 {
        match self.take(1) {
            Some(b) => b[0],
            None => 0,
        }
    }

    pub fn read_u16(&mut self) -> u16 {
        match self.take(2) {
            Some(b) => u16::from_le_bytes([b[0], b[1]]),
            None => 0,
        }
    }

    pub fn read_i16(&mut self) -> i16 {
        self.read_u16() as i16
    }

    pub fn read_u32(&mut self) -> u32 {
        match self.take(4) {
            Some(b) => u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            None => 0,
        }
    }

    pub fn read_i32(&mut self) -> i32 {
        self.read_u32() as i32
    }

    /// Remaining unread payload bytes.
    pub fn remaining(&self) -> &[u8] {
        &self.payload[self.cursor.min(self.payload.len())..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dual_raw_forms_map_together() {
        for (plain, high) in [(0u8, 0x80u8), (1, 0x81), (2, 0x82), (3, 0x83), (6, 0x86)] {
            assert_eq!(ResponseCode::from_raw(plain), ResponseCode::from_raw(high));
        }
        assert_eq!(ResponseCode::from_raw(0x81), ResponseCode::Ok);
        assert_eq!(ResponseCode::from_raw(0x82), ResponseCode::BufferOverflow);
    }

    #[test]
    fn timeout_sentinel_is_local_only() {
        assert_eq!(ResponseCode::from_raw(TIMEOUT_CODE), ResponseCode::Timeout);
        assert!(PacketResponse::timeout().code() == ResponseCode::Timeout);
        assert!(!PacketResponse::timeout().is_ok());
    }

    #[test]
    fn sequential_le_reads() {
        let mut r = PacketResponse::new(vec![0x81, 0x2c, 0x01, 0xfe, 0xff, 0xff, 0xff]);
        assert!(r.is_ok());
        assert_eq!(r.read_u16(), 0x012c);
        assert_eq!(r.read_i32(), -2);
    }

    #[test]
    fn short_reply_reads_zero() {
        let mut r = PacketResponse::new(vec![0x81, 0xaa]);
        assert_eq!(r.read_u32(), 0);
        assert_eq!(r.read_u8(), 0);
    }

    #[test]
    fn more_pending_counts_as_ok() {
        let r = PacketResponse::new(vec![0x86]);
        assert!(r.is_ok());
        assert_eq!(r.code(), ResponseCode::OkMorePending);
    }
}
