//! # PrintKit Protocol
//!
//! The binary packet protocol spoken to printer motherboards: framing
//! and checksums, reply classification, the serial transport, and the
//! retrying command executor that everything above builds on.

pub mod crc;
pub mod decoder;
pub mod executor;
pub mod packet;
pub mod response;
pub mod serial;
pub mod transport;

pub use crc::{crc8, Crc8};
pub use decoder::PacketDecoder;
pub use executor::{CommandExecutor, ExecutorConfig, ExecutorStats};
pub use packet::{PacketBuilder, MAX_PAYLOAD, START_BYTE};
pub use response::{PacketResponse, ResponseCode, TIMEOUT_CODE};
pub use serial::{list_ports, SerialPortInfo, SerialTransport};
pub use transport::Transport;
