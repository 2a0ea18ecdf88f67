//! Inbound packet decoding.
//!
//! A byte-at-a-time state machine mirroring the frame layout. Noise
//! before the start byte is discarded; a frame whose CRC fails is
//! rejected as a whole and the decoder returns to hunting for a start
//! byte.

use crate::crc::Crc8;
use crate::packet::START_BYTE;
use printkit_core::{ProtocolError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecoderState {
    AwaitStart,
    ReadLength,
    ReadPayload,
    ReadCrc,
}

/// Streaming decoder for one reply frame at a time.
#[derive(Debug)]
pub struct PacketDecoder {
    state: DecoderState,
    expected: usize,
    payload: Vec<u8>,
    crc: Crc8,
}

impl PacketDecoder {
    pub fn new() -> Self {
        PacketDecoder {
            state: DecoderState::AwaitStart,
            expected: 0,
            payload: Vec::new(),
            crc: Crc8::new(),
        }
    }

    /// Discard any partial frame and hunt for a start byte again.
    pub fn reset(&mut self) {
        self.state = DecoderState::AwaitStart;
        self.expected = 0;
        self.payload.clear();
        self.crc = Crc8::new();
    }

    /// Whether the decoder is mid-frame.
    pub fn in_progress(&self) -> bool {
        self.state != DecoderState::AwaitStart
    }

    /// Feed one received byte.
    ///
    /// Returns `Ok(Some(payload))` when a complete frame has been
    /// verified, `Ok(None)` while more bytes are needed, and an error
    /// if the frame fails its checksum. After either completion or an
    /// error the decoder is ready for the next frame.
    pub fn feed(&mut self, byte: u8) -> Result<Option<Vec<u8>>> {
        match self.state {
            DecoderState::AwaitStart => {
                if byte == START_BYTE {
                    self.state = DecoderState::ReadLength;
                } else {
                    // Line noise between frames.
                    tracing::trace!(byte, "discarding byte outside frame");
                }
                Ok(None)
            }
            DecoderState::ReadLength => {
                self.expected = byte as usize;
                self.payload = Vec::with_capacity(self.expected);
                self.crc = Crc8::new();
                self.state = if self.expected == 0 {
                    DecoderState::ReadCrc
                } else {
                    DecoderState::ReadPayload
                };
                Ok(None)
            }
            DecoderState::ReadPayload => {
                self.payload.push(byte);
                self.crc.update(byte);
                if self.payload.len() == self.expected {
                    self.state = DecoderState::ReadCrc;
                }
                Ok(None)
            }
            DecoderState::ReadCrc => {
                let expected = self.crc.value();
                let payload = std::mem::take(&mut self.payload);
                self.reset();
                if byte == expected {
                    Ok(Some(payload))
                } else {
                    Err(ProtocolError::ResponseCrcMismatch {
                        expected,
                        actual: byte,
                    }
                    .into())
                }
            }
        }
    }
}

impl Default for PacketDecoder {
    fn default() -> Self {
        Self::new()
    }
}
