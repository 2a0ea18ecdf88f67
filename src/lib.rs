//! # PrintKit
//!
//! A host-side controller for FDM 3D printers driven by Gen3/Gen4
//! motion boards:
//! - Modal G-code interpretation with arc and drilling-cycle expansion
//! - The binary packet protocol: framing, checksums, retrying executor
//! - Asynchronous builds with pause, resume, stop, and progress
//!
//! ## Architecture
//!
//! PrintKit is organized as a workspace with multiple crates:
//!
//! 1. **printkit-core** - Machine model, geometry, errors, profiles, listeners
//! 2. **printkit-protocol** - Packet framing, CRC, serial transport, executor
//! 3. **printkit-driver** - Firmware drivers: stepper, simulation, estimation
//! 4. **printkit-gcode** - Modal interpreter and program-stop handling
//! 5. **printkit-machine** - The build state machine and machine supervision
//! 6. **printkit** - This facade crate and the command-line sender

pub use printkit_core::{
    Axis, AxisSet, BoardVariant, BuildProgress, DriverError, Error, GCodeFileSource, GCodeSource,
    GcodeError, ListenerHandle, MachineConfig, MachineError, MachineListener, MachineModel,
    MachineState, Point5d, ProtocolError, Result, SerialConfig, StringVecSource, ToolModel,
    ToolState, ToolStatus, UnitSystem,
};

pub use printkit_protocol::{
    crc8, list_ports, CommandExecutor, ExecutorConfig, PacketBuilder, PacketDecoder,
    PacketResponse, ResponseCode, SerialPortInfo, SerialTransport, Transport,
};

pub use printkit_driver::{
    Capability, Driver, EstimationDriver, FirmwareVersion, HomingDirection, SimulatedOp,
    SimulationDriver, StepperDriver,
};

pub use printkit_gcode::{GCodeLine, Interpreter, InterpreterState, ProgramStop};

pub use printkit_machine::{auto_scan, open_port, Machine};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging with the default configuration
///
/// Sets up structured logging with:
/// - Console output on stderr
/// - RUST_LOG environment variable support
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    // Progress output owns stdout; logs go to stderr.
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    Ok(())
}
