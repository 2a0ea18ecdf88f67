//! # PrintKit Core
//!
//! Core types, traits, and utilities for PrintKit.
//! Provides the machine model, geometry, unit handling, error types,
//! G-code sources, and the listener plumbing shared by every layer.

pub mod config;
pub mod error;
pub mod geometry;
pub mod model;
pub mod source;
pub mod state;
pub mod units;

pub use config::{MachineConfig, SerialConfig};
pub use error::{DriverError, Error, GcodeError, MachineError, ProtocolError, Result};
pub use geometry::{Axis, AxisSet, Point5d};
pub use model::{BoardVariant, MachineModel, ToolModel, ToolState};
pub use source::{GCodeFileSource, GCodeSource, StringVecSource};
pub use state::{BuildProgress, ListenerHandle, MachineListener, MachineState, ToolStatus};
pub use units::{UnitSystem, MM_PER_INCH};
