//! Firmware drivers for PrintKit
//!
//! The [`Driver`] trait is the contract between the G-code interpreter
//! and a machine. [`StepperDriver`] speaks the binary packet protocol
//! to Gen3/Gen4 motion boards; [`SimulationDriver`] and
//! [`EstimationDriver`] implement the same contract without hardware.

pub mod commands;
pub mod driver;
pub mod eeprom;
pub mod simulation;
pub mod stepper;
pub mod version;

pub use commands::{MotherboardCommand, ToolCommand};
pub use driver::{Driver, HomingDirection};
pub use eeprom::{EepromField, EepromSlot};
pub use simulation::{EstimationDriver, OpLog, SimulatedOp, SimulationDriver};
pub use stepper::StepperDriver;
pub use version::{require_capability, Capability, FirmwareVersion};

// The board variant lives in the core model; re-export it beside the
// drivers that dispatch on it.
pub use printkit_core::BoardVariant;
