//! Port attachment and auto-scan.
//!
//! A named port gets the full handshake with retries. Auto-scan walks
//! the candidate ports with a single silent probe each, so a port that
//! is not a printer costs one response timeout.

use printkit_core::{MachineConfig, MachineError, Result, SerialConfig};
use printkit_protocol::{list_ports, CommandExecutor, ExecutorConfig, SerialTransport};
use printkit_driver::{Driver, StepperDriver};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Executor parameters derived from the profile's serial section.
pub fn executor_config(serial: &SerialConfig) -> ExecutorConfig {
    ExecutorConfig {
        response_timeout: Duration::from_millis(serial.timeout_ms),
        ..ExecutorConfig::default()
    }
}

/// Open a named port and run the firmware handshake.
pub fn open_port(port: &str, config: &MachineConfig) -> Result<StepperDriver> {
    let transport = SerialTransport::open(port, &config.serial)?;
    let executor = Arc::new(CommandExecutor::new(
        Box::new(transport),
        executor_config(&config.serial),
    ));
    let mut driver = StepperDriver::new(executor, config.build_model());
    driver.initialize()?;
    Ok(driver)
}

/// Probe every candidate port and attach to the first responding
/// printer.
pub fn auto_scan(config: &MachineConfig) -> Result<StepperDriver> {
    for port in list_ports()? {
        debug!(port = %port.port_name, description = %port.description, "probing");
        match probe_port(&port.port_name, config) {
            Ok(Some(driver)) => {
                info!(port = %port.port_name, "printer found");
                return Ok(driver);
            }
            Ok(None) => {}
            Err(e) => {
                // A port that opens but misbehaves is just not ours.
                debug!(port = %port.port_name, error = %e, "skipping port");
            }
        }
    }
    Err(MachineError::NoPrinterFound.into())
}

fn probe_port(port: &str, config: &MachineConfig) -> Result<Option<StepperDriver>> {
    let transport = match SerialTransport::open(port, &config.serial) {
        Ok(t) => t,
        // In use or gone between enumeration and open; move on.
        Err(_) => return Ok(None),
    };
    let executor = Arc::new(CommandExecutor::new(
        Box::new(transport),
        executor_config(&config.serial),
    ));
    match StepperDriver::probe(&executor)? {
        None => Ok(None),
        Some(version) => {
            debug!(port, %version, "firmware answered");
            let mut driver = StepperDriver::new(executor, config.build_model());
            driver.initialize()?;
            Ok(Some(driver))
        }
    }
}
