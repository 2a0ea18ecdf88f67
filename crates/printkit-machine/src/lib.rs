//! # PrintKit Machine
//!
//! The asynchronous build layer: a [`Machine`] facade over a driver,
//! the worker thread that streams G-code through the interpreter, port
//! auto-scan, and the background temperature poller.

pub mod machine;
pub mod poller;
pub mod scan;
pub mod worker;

pub use machine::Machine;
pub use scan::{auto_scan, open_port};
