//! Byte-level transport abstraction.
//!
//! The executor talks to firmware through this trait so tests can run
//! against an in-memory firmware double and production runs against a
//! serial port.

use printkit_core::Result;
use std::time::Duration;

/// A half-duplex byte link to the printer.
pub trait Transport: Send {
    /// Write one complete frame.
    fn send(&mut self, frame: &[u8]) -> Result<()>;

    /// Read one byte, waiting up to the configured timeout.
    /// `Ok(None)` means the timeout elapsed with nothing received.
    fn recv_byte(&mut self) -> Result<Option<u8>>;

    /// Adjust the per-byte receive timeout.
    fn set_timeout(&mut self, timeout: Duration) -> Result<()>;

    /// Human-readable link name for logging.
    fn name(&self) -> String;
}
