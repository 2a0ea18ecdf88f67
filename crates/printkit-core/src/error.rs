//! Error handling for PrintKit
//!
//! Provides error types for all layers of the stack:
//! - Protocol errors (framing, transport, serial)
//! - Driver errors (firmware commands, capabilities)
//! - G-Code errors (parsing/interpretation)
//! - Machine errors (build state machine)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Protocol error type
///
/// Represents errors in the binary packet layer and the serial
/// transport beneath it. Response-level conditions that the firmware
/// reports in-band (buffer overflow, CRC mismatch, unsupported command)
/// are *not* errors; they are carried by response codes and handled by
/// the command executor.
#[derive(Error, Debug, Clone)]
pub enum ProtocolError {
    /// Serial port not found
    #[error("Port not found: {port}")]
    PortNotFound {
        /// The name of the port that was not found.
        port: String,
    },

    /// Failed to open the serial port
    #[error("Failed to open port {port}: {reason}")]
    FailedToOpen {
        /// The name of the port that failed to open.
        port: String,
        /// The reason the port failed to open.
        reason: String,
    },

    /// Serial port I/O error
    #[error("Serial port error: {reason}")]
    SerialError {
        /// The reason for the serial port error.
        reason: String,
    },

    /// Packet payload exceeds the one-byte length field
    #[error("Packet payload too large: {len} bytes (max 254)")]
    PayloadTooLarge {
        /// The offending payload length.
        len: usize,
    },

    /// Received bytes that do not form a valid packet
    #[error("Malformed packet: {reason}")]
    MalformedPacket {
        /// Why the packet was rejected.
        reason: String,
    },

    /// A response arrived with a bad checksum
    #[error("Response CRC mismatch: expected {expected:#04x}, got {actual:#04x}")]
    ResponseCrcMismatch {
        /// The CRC computed over the received payload.
        expected: u8,
        /// The CRC byte that arrived on the wire.
        actual: u8,
    },

    /// No response within the configured timeout
    #[error("Protocol timeout after {timeout_ms}ms")]
    Timeout {
        /// The timeout duration in milliseconds.
        timeout_ms: u64,
    },

    /// Generic protocol error
    #[error("Protocol error: {message}")]
    Other {
        /// The error message.
        message: String,
    },
}

/// Driver error type
///
/// Represents errors raised by the firmware driver layer: capability
/// gates, malformed firmware replies, and operations attempted in the
/// wrong driver state.
#[derive(Error, Debug, Clone)]
pub enum DriverError {
    /// Driver used before initialize() succeeded
    #[error("Driver not initialized")]
    NotInitialized,

    /// Firmware is older than the hard minimum for this driver
    #[error("Firmware version {actual} below minimum {required}")]
    BadFirmwareVersion {
        /// The version reported by the firmware.
        actual: String,
        /// The minimum version this driver supports.
        required: String,
    },

    /// Operation requires a firmware capability that is not present
    #[error("Firmware {actual} lacks capability for {operation} (requires {required})")]
    CapabilityMismatch {
        /// The operation that was gated off.
        operation: String,
        /// The minimum version carrying the capability.
        required: String,
        /// The version reported by the firmware.
        actual: String,
    },

    /// Firmware reported the command code as unknown
    #[error("Command not supported by firmware: {command}")]
    UnsupportedCommand {
        /// The rejected command name.
        command: String,
    },

    /// Firmware returned a generic failure for the command
    #[error("Firmware rejected {command}: {code}")]
    CommandFailed {
        /// The command that failed.
        command: String,
        /// The response code classification.
        code: String,
    },

    /// A reply payload was shorter than the command requires
    #[error("Short reply to {command}: expected {expected} bytes, got {actual}")]
    ShortReply {
        /// The command whose reply was truncated.
        command: String,
        /// The number of payload bytes required.
        expected: usize,
        /// The number of payload bytes received.
        actual: usize,
    },

    /// Tool index outside the machine model
    #[error("Tool {tool} not defined for this machine")]
    ToolNotFound {
        /// The tool index that was not found.
        tool: u8,
    },

    /// EEPROM contents failed a typed decode
    #[error("Invalid EEPROM data for {field}: {reason}")]
    InvalidEepromData {
        /// The typed field being decoded.
        field: String,
        /// Why the decode failed.
        reason: String,
    },

    /// Generic driver error
    #[error("Driver error: {message}")]
    Other {
        /// The error message.
        message: String,
    },
}

/// G-Code error type
///
/// Represents errors in parsing or interpreting a G-code line. All
/// variants are recoverable at the build level: the offending line is
/// logged and skipped, and the build continues.
#[derive(Error, Debug, Clone)]
pub enum GcodeError {
    /// A word's numeric value could not be parsed
    #[error("Invalid value for '{letter}' at line {line_number}: {text}")]
    InvalidValue {
        /// The source line number.
        line_number: usize,
        /// The code letter whose value was malformed.
        letter: char,
        /// The text that failed to parse.
        text: String,
    },

    /// G or M code not in the supported dialect
    #[error("Unknown code at line {line_number}: {code}")]
    UnknownCode {
        /// The source line number.
        line_number: usize,
        /// The unrecognized code, e.g. "G99" or "M42".
        code: String,
    },

    /// A code was given without a parameter it requires
    #[error("Missing parameter '{param}' for {code} at line {line_number}")]
    MissingParameter {
        /// The source line number.
        line_number: usize,
        /// The code requiring the parameter.
        code: String,
        /// The missing parameter letter.
        param: char,
    },

    /// Radius-form arc (G2/G3 with R) is deliberately not supported
    #[error("Radius-form arc at line {line_number}: use I/J center form")]
    UnsupportedArcForm {
        /// The source line number.
        line_number: usize,
    },

    /// Canned cycles only operate in the XY plane
    #[error("Drilling cycle outside XY plane at line {line_number}")]
    CycleOutsideXyPlane {
        /// The source line number.
        line_number: usize,
    },

    /// Generic G-code error
    #[error("G-code error at line {line_number}: {message}")]
    Other {
        /// The source line number.
        line_number: usize,
        /// The error message.
        message: String,
    },
}

/// Machine error type
///
/// Represents errors in the build state machine and machine
/// configuration.
#[derive(Error, Debug, Clone)]
pub enum MachineError {
    /// No printer attached
    #[error("Machine not attached")]
    NotAttached,

    /// Requested transition is not legal from the current state
    #[error("Invalid state transition from {current} to {requested}")]
    InvalidStateTransition {
        /// The current state name.
        current: String,
        /// The requested state name.
        requested: String,
    },

    /// A build is already running
    #[error("Build already in progress")]
    BuildInProgress,

    /// Auto-scan found no responding printer
    #[error("No printer found on any candidate port")]
    NoPrinterFound,

    /// The build worker thread is gone
    #[error("Build worker unavailable: {reason}")]
    WorkerUnavailable {
        /// Why the worker cannot be reached.
        reason: String,
    },

    /// Machine profile could not be loaded or is inconsistent
    #[error("Machine configuration error: {reason}")]
    Configuration {
        /// The reason for the configuration error.
        reason: String,
    },

    /// Generic machine error
    #[error("Machine error: {message}")]
    Other {
        /// The error message.
        message: String,
    },
}

/// Main error type for PrintKit
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Protocol error
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Driver error
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// G-Code error
    #[error(transparent)]
    Gcode(#[from] GcodeError),

    /// Machine error
    #[error(transparent)]
    Machine(#[from] MachineError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Protocol(ProtocolError::Timeout { .. }))
    }

    /// Check if this is a capability gate failure
    pub fn is_capability_mismatch(&self) -> bool {
        matches!(
            self,
            Error::Driver(DriverError::CapabilityMismatch { .. })
        )
    }

    /// Check if this is a G-code error (recoverable at build level)
    pub fn is_gcode_error(&self) -> bool {
        matches!(self, Error::Gcode(_))
    }

    /// Check if this is a protocol error
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Error::Protocol(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
