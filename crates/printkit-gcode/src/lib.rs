//! # PrintKit G-code
//!
//! The modal G-code interpreter: line parsing into a word table,
//! modal state, arc and drilling-cycle expansion into driver calls,
//! and program-stop classification.

pub mod interpreter;
pub mod line;
pub mod state;
pub mod stops;

pub use interpreter::Interpreter;
pub use line::GCodeLine;
pub use state::{DrillState, InterpreterState, Plane};
pub use stops::{check_stops, drain_motion_queue, ProgramStop};
